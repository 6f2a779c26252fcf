//! The per-subscription ledger record.
//!
//! A `Ledger` holds the emission and credit counters of one subscription
//! together with an optimistic-concurrency `version`. All debit and credit
//! rules live here so they run before anything is written; storage backends
//! only persist the result.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::{CustomerId, SubscriptionId};

// ============================================================================
// Constants
// ============================================================================

/// Minimum credit top-up in cents ($50).
pub const MIN_TOP_UP_CENTS: i64 = 5000;

/// Subscription metadata key for available emissions.
pub const METADATA_EMISSIONS_AVAILABLE: &str = "emissionsAvailable";

/// Subscription metadata key for consumed emissions.
pub const METADATA_EMISSIONS_USED: &str = "emissionsUsed";

/// Subscription metadata key for the credit balance.
pub const METADATA_CREDIT_BALANCE: &str = "creditBalance";

/// Subscription metadata key for consumed credits.
pub const METADATA_CREDITS_USED: &str = "creditsUsed";

/// Which of the two counters an operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Counter {
    /// Emission units.
    Emissions,
    /// Credit balance.
    Credits,
}

impl Counter {
    /// Get the counter name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Emissions => "emissions",
            Self::Credits => "credits",
        }
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Usage counters for one subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    /// The subscription this ledger belongs to.
    pub subscription_id: SubscriptionId,

    /// The customer owning the subscription.
    pub customer_id: CustomerId,

    /// Emissions that can still be used.
    pub emissions_available: i64,

    /// Lifetime emissions used.
    pub emissions_used: i64,

    /// Credits that can still be spent.
    pub credit_balance: i64,

    /// Lifetime credits spent.
    pub credits_used: i64,

    /// Optimistic-concurrency token. Incremented by the store on every commit.
    pub version: i64,

    /// When the ledger was created.
    pub created_at: DateTime<Utc>,

    /// When the ledger was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Outcome of a successful emission debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmissionDebit {
    /// Emissions available before the debit.
    pub previous_available: i64,
    /// Emissions available after the debit.
    pub available: i64,
    /// Lifetime emissions used after the debit.
    pub used: i64,
}

/// Outcome of a successful credit debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditDebit {
    /// Balance before the debit.
    pub previous_balance: i64,
    /// Balance after the debit.
    pub balance: i64,
    /// Amount deducted.
    pub amount: i64,
    /// Lifetime credits used after the debit.
    pub used: i64,
}

impl Ledger {
    /// Create an empty ledger with every counter at zero.
    #[must_use]
    pub fn new(subscription_id: SubscriptionId, customer_id: CustomerId) -> Self {
        let now = Utc::now();
        Self {
            subscription_id,
            customer_id,
            emissions_available: 0,
            emissions_used: 0,
            credit_balance: 0,
            credits_used: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a ledger seeded from a subscription's metadata bag.
    ///
    /// Counters are read from their metadata keys. Missing or unparsable
    /// values count as zero and negative values are clamped to zero.
    #[must_use]
    pub fn from_metadata(
        subscription_id: SubscriptionId,
        customer_id: CustomerId,
        metadata: &HashMap<String, String>,
    ) -> Self {
        let read = |key: &str| {
            metadata
                .get(key)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0)
                .max(0)
        };

        Self {
            emissions_available: read(METADATA_EMISSIONS_AVAILABLE),
            emissions_used: read(METADATA_EMISSIONS_USED),
            credit_balance: read(METADATA_CREDIT_BALANCE),
            credits_used: read(METADATA_CREDITS_USED),
            ..Self::new(subscription_id, customer_id)
        }
    }

    /// Consume one emission.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InsufficientBalance` if no emission is available.
    /// The ledger is unchanged on error.
    pub fn use_emission(&mut self) -> Result<EmissionDebit> {
        if self.emissions_available <= 0 {
            return Err(LedgerError::InsufficientBalance {
                counter: Counter::Emissions,
                balance: self.emissions_available,
                required: 1,
            });
        }

        let previous_available = self.emissions_available;
        let used = checked(self.emissions_used.checked_add(1))?;

        self.emissions_available = previous_available - 1;
        self.emissions_used = used;
        self.touch();

        Ok(EmissionDebit {
            previous_available,
            available: self.emissions_available,
            used,
        })
    }

    /// Spend `amount` credits.
    ///
    /// # Errors
    ///
    /// - `LedgerError::InvalidAmount` if `amount <= 0`.
    /// - `LedgerError::InsufficientBalance` if the balance is below `amount`.
    ///
    /// The ledger is unchanged on error.
    pub fn use_credits(&mut self, amount: i64) -> Result<CreditDebit> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        if self.credit_balance < amount {
            return Err(LedgerError::InsufficientBalance {
                counter: Counter::Credits,
                balance: self.credit_balance,
                required: amount,
            });
        }

        let previous_balance = self.credit_balance;
        let used = checked(self.credits_used.checked_add(amount))?;

        self.credit_balance = previous_balance - amount;
        self.credits_used = used;
        self.touch();

        Ok(CreditDebit {
            previous_balance,
            balance: self.credit_balance,
            amount,
            used,
        })
    }

    /// Add purchased emissions. Returns the new available count.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `count <= 0` or the counter would overflow.
    pub fn add_emissions(&mut self, count: i64) -> Result<i64> {
        self.emissions_available = credit(self.emissions_available, count)?;
        self.touch();
        Ok(self.emissions_available)
    }

    /// Add topped-up credits. Returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::InvalidAmount` if `amount <= 0` or the counter would overflow.
    pub fn add_credits(&mut self, amount: i64) -> Result<i64> {
        self.credit_balance = credit(self.credit_balance, amount)?;
        self.touch();
        Ok(self.credit_balance)
    }

    /// Current balance of a counter.
    #[must_use]
    pub const fn balance(&self, counter: Counter) -> i64 {
        match counter {
            Counter::Emissions => self.emissions_available,
            Counter::Credits => self.credit_balance,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

fn credit(balance: i64, amount: i64) -> Result<i64> {
    if amount <= 0 {
        return Err(LedgerError::InvalidAmount(
            "amount must be greater than zero".into(),
        ));
    }
    checked(balance.checked_add(amount))
}

fn checked(value: Option<i64>) -> Result<i64> {
    value.ok_or_else(|| LedgerError::InvalidAmount("counter overflow".into()))
}
