//! Error types for ledger storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// The ledger changed since it was read.
    #[error("version conflict on {subscription_id}: expected={expected}, actual={actual}")]
    VersionConflict {
        /// The contended ledger.
        subscription_id: String,
        /// Version the caller read.
        expected: i64,
        /// Version currently stored.
        actual: i64,
    },

    /// An entry with the same external reference was already committed.
    #[error("duplicate reference: {reference}")]
    DuplicateReference {
        /// The reference that was duplicated.
        reference: String,
    },
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}
