//! Error types for ledger rules.

use crate::ids::IdError;
use crate::ledger::Counter;

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Errors raised by ledger rules before any state is written.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// The counter cannot cover the requested debit.
    #[error("insufficient {counter} balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// The counter that was debited.
        counter: Counter,
        /// Current balance of the counter.
        balance: i64,
        /// Amount the debit needed.
        required: i64,
    },

    /// Amount is zero, negative, or would overflow a counter.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Emission pack identifier is not in the catalog.
    #[error("unknown emission pack: {pack_id}")]
    UnknownPack {
        /// The identifier that was requested.
        pack_id: String,
    },

    /// Top-up amount is below the minimum.
    #[error("top-up amount {amount_cents} is below the minimum of {minimum_cents} cents")]
    BelowMinimum {
        /// Requested amount in cents.
        amount_cents: i64,
        /// Minimum accepted amount in cents.
        minimum_cents: i64,
    },

    /// No active or paused subscription exists for the account.
    #[error("no active subscription for {email}")]
    NoActiveSubscription {
        /// The account email that was looked up.
        email: String,
    },

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
