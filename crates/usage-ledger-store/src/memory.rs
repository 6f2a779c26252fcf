//! In-memory storage implementation.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use usage_ledger_core::{Ledger, LedgerEntry, SubscriptionId};

use crate::error::{Result, StoreError};
use crate::{next_version, Store};

/// Process-local store. All state is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    ledgers: HashMap<SubscriptionId, Ledger>,
    /// Journal per subscription, in commit order.
    entries: HashMap<SubscriptionId, Vec<LedgerEntry>>,
    references: HashSet<String>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Database("memory store lock poisoned".into()))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_ledger(&self, subscription_id: &SubscriptionId) -> Result<Option<Ledger>> {
        Ok(self.lock()?.ledgers.get(subscription_id).cloned())
    }

    async fn create_ledger(&self, ledger: &Ledger) -> Result<Ledger> {
        let mut inner = self.lock()?;
        let stored = inner
            .ledgers
            .entry(ledger.subscription_id.clone())
            .or_insert_with(|| ledger.clone());
        Ok(stored.clone())
    }

    async fn commit(&self, ledger: &Ledger, entry: &LedgerEntry) -> Result<Ledger> {
        let mut inner = self.lock()?;

        let stored = inner
            .ledgers
            .get(&ledger.subscription_id)
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

        if let Some(reference) = &entry.reference {
            if inner.references.contains(reference) {
                return Err(StoreError::DuplicateReference {
                    reference: reference.clone(),
                });
            }
            inner.references.insert(reference.clone());
        }

        let committed = next_version(ledger);
        inner
            .ledgers
            .insert(committed.subscription_id.clone(), committed.clone());
        inner
            .entries
            .entry(committed.subscription_id.clone())
            .or_default()
            .push(entry.clone());

        Ok(committed)
    }

    async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<LedgerEntry>> {
        let inner = self.lock()?;
        Ok(inner
            .entries
            .get(subscription_id)
            .map(|entries| {
                entries
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn has_reference(&self, reference: &str) -> Result<bool> {
        Ok(self.lock()?.references.contains(reference))
    }
}
