//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Commits are serialized by a process-wide lock around read-check-write and
//! written with a single `WriteBatch`.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use usage_ledger_core::{Ledger, LedgerEntry, SubscriptionId};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::{next_version, Store};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    write_lock: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn read_ledger(&self, subscription_id: &SubscriptionId) -> Result<Option<Ledger>> {
        let cf = self.cf(cf::LEDGERS)?;

        self.db
            .get_cf(&cf, keys::ledger_key(subscription_id))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn reference_exists(&self, reference: &str) -> Result<bool> {
        let cf = self.cf(cf::REFERENCES)?;

        Ok(self
            .db
            .get_cf(&cf, keys::reference_key(reference))
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Database("write lock poisoned".into()))
    }
}

#[async_trait]
impl Store for RocksStore {
    async fn get_ledger(&self, subscription_id: &SubscriptionId) -> Result<Option<Ledger>> {
        self.read_ledger(subscription_id)
    }

    async fn create_ledger(&self, ledger: &Ledger) -> Result<Ledger> {
        let _guard = self.lock()?;

        if let Some(existing) = self.read_ledger(&ledger.subscription_id)? {
            return Ok(existing);
        }

        let cf = self.cf(cf::LEDGERS)?;
        self.db
            .put_cf(
                &cf,
                keys::ledger_key(&ledger.subscription_id),
                Self::serialize(ledger)?,
            )
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(ledger.clone())
    }

    async fn commit(&self, ledger: &Ledger, entry: &LedgerEntry) -> Result<Ledger> {
        let _guard = self.lock()?;

        let stored = self
            .read_ledger(&ledger.subscription_id)?
            .ok_or_else(|| StoreError::NotFound {
                entity: "ledger",
                id: ledger.subscription_id.to_string(),
            })?;

        if stored.version != ledger.version {
            return Err(StoreError::VersionConflict {
                subscription_id: ledger.subscription_id.to_string(),
                expected: ledger.version,
                actual: stored.version,
            });
        }

        let cf_ledgers = self.cf(cf::LEDGERS)?;
        let cf_entries = self.cf(cf::ENTRIES)?;
        let cf_references = self.cf(cf::REFERENCES)?;

        let committed = next_version(ledger);
        let mut batch = WriteBatch::default();

        if let Some(reference) = &entry.reference {
            if self.reference_exists(reference)? {
                return Err(StoreError::DuplicateReference {
                    reference: reference.clone(),
                });
            }
            batch.put_cf(
                &cf_references,
                keys::reference_key(reference),
                entry.id.to_bytes(),
            );
        }

        batch.put_cf(
            &cf_ledgers,
            keys::ledger_key(&committed.subscription_id),
            Self::serialize(&committed)?,
        );
        batch.put_cf(
            &cf_entries,
            keys::entry_key(&entry.subscription_id, &entry.id),
            Self::serialize(entry)?,
        );

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(committed)
    }

    async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let cf = self.cf(cf::ENTRIES)?;
        let prefix = keys::entries_prefix(subscription_id);

        // Collect the prefix range, then walk it backwards for newest first.
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            values.push(value);
        }

        values
            .iter()
            .rev()
            .skip(offset)
            .take(limit)
            .map(|data| Self::deserialize(data))
            .collect()
    }

    async fn has_reference(&self, reference: &str) -> Result<bool> {
        self.reference_exists(reference)
    }
}
