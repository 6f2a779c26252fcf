//! Journal entries for the usage ledger.
//!
//! Every committed change to a ledger appends exactly one entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::Counter;
use crate::{EntryId, SubscriptionId};

/// A journal entry recording one counter change.
///
/// Entries use ULIDs for time-ordered IDs. An entry with a `reference`
/// (invoice id, checkout session id) can be committed only once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID (ULID for time-ordering).
    pub id: EntryId,

    /// The subscription whose ledger changed.
    pub subscription_id: SubscriptionId,

    /// What happened.
    pub kind: EntryKind,

    /// Signed delta applied to the counter. Negative = debit.
    pub amount: i64,

    /// Counter balance after this entry.
    pub balance_after: i64,

    /// Human-readable reason.
    pub reason: String,

    /// External reference that makes the entry idempotent.
    pub reference: Option<String>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    fn new(
        subscription_id: SubscriptionId,
        kind: EntryKind,
        amount: i64,
        balance_after: i64,
        reason: String,
        reference: Option<String>,
    ) -> Self {
        Self {
            id: EntryId::generate(),
            subscription_id,
            kind,
            amount,
            balance_after,
            reason,
            reference,
            created_at: Utc::now(),
        }
    }

    /// One emission consumed.
    #[must_use]
    pub fn emission_used(subscription_id: SubscriptionId, balance_after: i64) -> Self {
        Self::new(
            subscription_id,
            EntryKind::EmissionUsed,
            -1,
            balance_after,
            "Emission used".to_string(),
            None,
        )
    }

    /// Emissions bought through a paid invoice.
    #[must_use]
    pub fn emissions_purchased(
        subscription_id: SubscriptionId,
        count: i64,
        balance_after: i64,
        pack_id: &str,
        invoice_id: String,
    ) -> Self {
        Self::new(
            subscription_id,
            EntryKind::EmissionsPurchased,
            count,
            balance_after,
            format!("Purchased {pack_id}"),
            Some(invoice_id),
        )
    }

    /// Credits spent by the caller.
    #[must_use]
    pub fn credits_used(
        subscription_id: SubscriptionId,
        amount: i64,
        balance_after: i64,
        reason: String,
    ) -> Self {
        Self::new(
            subscription_id,
            EntryKind::CreditsUsed,
            -amount.abs(),
            balance_after,
            reason,
            None,
        )
    }

    /// Credits added by a completed checkout session.
    #[must_use]
    pub fn credits_topped_up(
        subscription_id: SubscriptionId,
        amount: i64,
        balance_after: i64,
        session_id: String,
    ) -> Self {
        Self::new(
            subscription_id,
            EntryKind::CreditsToppedUp,
            amount,
            balance_after,
            "Credit top-up".to_string(),
            Some(session_id),
        )
    }
}

/// Type of journal entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// One emission consumed.
    EmissionUsed,
    /// Emission pack paid for.
    EmissionsPurchased,
    /// Credits spent.
    CreditsUsed,
    /// Credits added through checkout.
    CreditsToppedUp,
}

impl EntryKind {
    /// The counter this kind of entry changes.
    #[must_use]
    pub const fn counter(&self) -> Counter {
        match self {
            Self::EmissionUsed | Self::EmissionsPurchased => Counter::Emissions,
            Self::CreditsUsed | Self::CreditsToppedUp => Counter::Credits,
        }
    }

    /// Get the kind name as a string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EmissionUsed => "emission_used",
            Self::EmissionsPurchased => "emissions_purchased",
            Self::CreditsUsed => "credits_used",
            Self::CreditsToppedUp => "credits_topped_up",
        }
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "emission_used" => Ok(Self::EmissionUsed),
            "emissions_purchased" => Ok(Self::EmissionsPurchased),
            "credits_used" => Ok(Self::CreditsUsed),
            "credits_topped_up" => Ok(Self::CreditsToppedUp),
            other => Err(format!("unknown entry kind: {other}")),
        }
    }
}
