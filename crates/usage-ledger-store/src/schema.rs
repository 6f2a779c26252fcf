//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Ledger records, keyed by `subscription_id`.
    pub const LEDGERS: &str = "ledgers";

    /// Journal entries, keyed by `subscription_id || '/' || entry_id`.
    pub const ENTRIES: &str = "entries";

    /// Index: committed external references, keyed by reference.
    /// Value is the entry id bytes.
    pub const REFERENCES: &str = "references";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::LEDGERS, cf::ENTRIES, cf::REFERENCES]
}
