//! Storage layer for the usage ledger.
//!
//! This crate persists ledger records and their journal behind the `Store`
//! trait. Every change goes through [`Store::commit`], a conditional write
//! keyed on the ledger's `version`, so concurrent writers cannot overwrite
//! each other's updates.
//!
//! # Backends
//!
//! - [`MemoryStore`]: process-local maps, for tests and single-node development.
//! - [`PgStore`]: PostgreSQL through `sqlx`, with embedded migrations.
//! - `RocksStore`: `RocksDB` column families (feature `rocksdb-backend`).
//!
//! # Example
//!
//! ```no_run
//! use usage_ledger_core::{Ledger, LedgerEntry};
//! use usage_ledger_store::{MemoryStore, Store};
//!
//! # async fn example() -> usage_ledger_store::Result<()> {
//! let store = MemoryStore::new();
//!
//! let ledger = Ledger::new("sub_123".parse().unwrap(), "cus_123".parse().unwrap());
//! let mut ledger = store.create_ledger(&ledger).await?;
//!
//! let balance = ledger.add_credits(5000).unwrap();
//! let entry = LedgerEntry::credits_topped_up(
//!     ledger.subscription_id.clone(),
//!     5000,
//!     balance,
//!     "cs_123".into(),
//! );
//! let committed = store.commit(&ledger, &entry).await?;
//! assert_eq!(committed.version, 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod postgres;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use usage_ledger_core::{Ledger, LedgerEntry, SubscriptionId};

/// The storage trait defining all ledger persistence operations.
///
/// Implementations must make [`Store::commit`] atomic: the counter update,
/// the version bump and the journal append either all happen or none do.
#[async_trait]
pub trait Store: Send + Sync {
    /// Get the ledger of a subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_ledger(&self, subscription_id: &SubscriptionId) -> Result<Option<Ledger>>;

    /// Insert a ledger if none exists for its subscription.
    ///
    /// Returns the stored ledger: the given one when it was inserted, or the
    /// existing record when another writer created it first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn create_ledger(&self, ledger: &Ledger) -> Result<Ledger>;

    /// Conditionally write a ledger and append a journal entry.
    ///
    /// `ledger.version` must be the version that was read. On success the
    /// stored record carries `version + 1` and is returned.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the ledger doesn't exist.
    /// - `StoreError::VersionConflict` if the stored version differs.
    /// - `StoreError::DuplicateReference` if the entry's reference was already committed.
    async fn commit(&self, ledger: &Ledger, entry: &LedgerEntry) -> Result<Ledger>;

    /// List journal entries for a subscription, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>>;

    /// Check if an entry with this external reference was committed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn has_reference(&self, reference: &str) -> Result<bool>;
}

/// Stamp a ledger as committed: next version, fresh `updated_at`.
pub(crate) fn next_version(ledger: &Ledger) -> Ledger {
    let mut next = ledger.clone();
    next.version = ledger.version + 1;
    next.updated_at = chrono::Utc::now();
    next
}
