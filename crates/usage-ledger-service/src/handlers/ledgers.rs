//! Ledger read handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use usage_ledger_core::{CustomerId, EntryKind, Ledger, LedgerEntry, SubscriptionId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::extract::ApiQuery;
use crate::ledger;
use crate::state::AppState;

/// Ledger response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerResponse {
    /// Subscription ID.
    pub subscription_id: SubscriptionId,
    /// Owning customer.
    pub customer_id: CustomerId,
    /// Emissions that can still be used.
    pub emissions_available: i64,
    /// Lifetime emissions used.
    pub emissions_used: i64,
    /// Credits that can still be spent.
    pub credit_balance: i64,
    /// Lifetime credits spent.
    pub credits_used: i64,
    /// Commit counter.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update.
    pub updated_at: DateTime<Utc>,
}

impl From<Ledger> for LedgerResponse {
    fn from(ledger: Ledger) -> Self {
        Self {
            subscription_id: ledger.subscription_id,
            customer_id: ledger.customer_id,
            emissions_available: ledger.emissions_available,
            emissions_used: ledger.emissions_used,
            credit_balance: ledger.credit_balance,
            credits_used: ledger.credits_used,
            version: ledger.version,
            created_at: ledger.created_at,
            updated_at: ledger.updated_at,
        }
    }
}

/// Get the current counters of a subscription.
///
/// A subscription without a ledger is seeded from its Stripe metadata.
pub async fn get_ledger(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(subscription_id): Path<String>,
) -> Result<Json<LedgerResponse>, ApiError> {
    let subscription_id = parse_subscription_id(&subscription_id)?;
    let ledger = ledger::load_or_seed(
        state.store.as_ref(),
        state.stripe.as_deref(),
        &subscription_id,
    )
    .await?;

    Ok(Json(ledger.into()))
}

/// Entry list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListEntriesQuery {
    /// Maximum number of entries to return (default: 50, max: 100).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Journal entry response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryResponse {
    /// Entry ID.
    pub id: String,
    /// Entry kind.
    pub kind: EntryKind,
    /// Signed change to the affected counter.
    pub amount: i64,
    /// Counter value after this entry.
    pub balance_after: i64,
    /// Reason.
    pub reason: String,
    /// External reference (invoice or checkout session).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

impl From<LedgerEntry> for EntryResponse {
    fn from(entry: LedgerEntry) -> Self {
        Self {
            id: entry.id.to_string(),
            kind: entry.kind,
            amount: entry.amount,
            balance_after: entry.balance_after,
            reason: entry.reason,
            reference: entry.reference,
            created_at: entry.created_at,
        }
    }
}

/// List entries response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesResponse {
    /// Entries (newest first).
    pub entries: Vec<EntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// List the journal of a subscription.
pub async fn list_entries(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(subscription_id): Path<String>,
    ApiQuery(query): ApiQuery<ListEntriesQuery>,
) -> Result<Json<ListEntriesResponse>, ApiError> {
    let subscription_id = parse_subscription_id(&subscription_id)?;

    state
        .store
        .get_ledger(&subscription_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Ledger not found: {subscription_id}")))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.clamp(1, 100);
    let mut entries = state
        .store
        .list_entries(&subscription_id, limit + 1, query.offset)
        .await?;

    let has_more = entries.len() > limit;
    entries.truncate(limit);

    Ok(Json(ListEntriesResponse {
        entries: entries.into_iter().map(EntryResponse::from).collect(),
        has_more,
    }))
}

fn parse_subscription_id(raw: &str) -> Result<SubscriptionId, ApiError> {
    raw.parse::<SubscriptionId>()
        .map_err(|e| ApiError::BadRequest(format!("Invalid subscription ID {raw}: {e}")))
}
