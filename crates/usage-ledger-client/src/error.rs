//! Client error types.

use usage_ledger_core::Counter;

/// Errors that can occur when using the usage ledger client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The counter cannot cover the debit.
    #[error("insufficient {counter}: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Counter that was short.
        counter: Counter,
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// Request was rejected as invalid.
    #[error("bad request: {message}")]
    BadRequest {
        /// Server message.
        message: String,
    },

    /// Customer, subscription or ledger not found.
    #[error("not found: {message}")]
    NotFound {
        /// Server message.
        message: String,
    },

    /// API key missing or wrong.
    #[error("unauthorized")]
    Unauthorized,

    /// The ledger stayed contended or the change was already applied.
    #[error("conflict: {message}")]
    Conflict {
        /// Server message.
        message: String,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
