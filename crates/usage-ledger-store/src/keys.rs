//! Key encoding utilities for `RocksDB`.

use usage_ledger_core::{EntryId, SubscriptionId};

/// Separator between subscription id and entry id. Never part of an id.
const SEPARATOR: u8 = b'/';

/// Create a ledger key from a subscription ID.
#[must_use]
pub fn ledger_key(subscription_id: &SubscriptionId) -> Vec<u8> {
    subscription_id.as_str().as_bytes().to_vec()
}

/// Create a journal key.
///
/// Format: `subscription_id || '/' || entry_id (16 bytes)`
///
/// Since ULIDs are time-ordered, entries for a subscription sort by time.
#[must_use]
pub fn entry_key(subscription_id: &SubscriptionId, entry_id: &EntryId) -> Vec<u8> {
    let mut key = entries_prefix(subscription_id);
    key.extend_from_slice(&entry_id.to_bytes());
    key
}

/// Create a prefix for iterating all entries of a subscription.
#[must_use]
pub fn entries_prefix(subscription_id: &SubscriptionId) -> Vec<u8> {
    let id = subscription_id.as_str().as_bytes();
    let mut prefix = Vec::with_capacity(id.len() + 17);
    prefix.extend_from_slice(id);
    prefix.push(SEPARATOR);
    prefix
}

/// Create a reference index key.
#[must_use]
pub fn reference_key(reference: &str) -> Vec<u8> {
    reference.as_bytes().to_vec()
}
