//! Request and response types for the usage ledger client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use usage_ledger_core::{Counter, CustomerId, EntryKind, SubscriptionId};

// ============================================================================
// Emissions
// ============================================================================

/// Use emission request.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct UseEmissionRequest<'a> {
    pub email: &'a str,
}

/// Use emission response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseEmissionResponse {
    /// Subscription whose ledger was debited.
    pub subscription_id: SubscriptionId,
    /// Emissions available before the debit.
    pub previous_emissions_available: i64,
    /// Emissions available after the debit.
    pub emissions_available: i64,
    /// Lifetime emissions used.
    pub emissions_used: i64,
}

/// Purchase emissions request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEmissionsRequest {
    /// Paying customer.
    pub customer_id: CustomerId,
    /// Subscription receiving the emissions.
    pub subscription_id: SubscriptionId,
    /// Emission pack ID (e.g., `emissionPack5`).
    pub emission_pack_id: String,
}

/// The paid invoice returned by a purchase.
#[derive(Debug, Clone, Deserialize)]
pub struct Invoice {
    /// Invoice ID.
    pub id: String,
    /// Invoice status.
    #[serde(default)]
    pub status: Option<String>,
    /// Amount paid in cents.
    #[serde(default)]
    pub amount_paid: i64,
    /// Currency.
    #[serde(default)]
    pub currency: Option<String>,
    /// Hosted invoice page.
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
}

/// Purchase emissions response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEmissionsResponse {
    /// The paid invoice.
    pub invoice: Invoice,
    /// Emissions added by the pack.
    pub emissions_added: i64,
    /// Emissions available after the purchase.
    pub total_emissions: i64,
}

// ============================================================================
// Credits
// ============================================================================

/// Use credits request.
#[derive(Debug, Clone, Serialize)]
pub struct UseCreditsRequest {
    /// Email of the account spending the credits.
    pub email: String,
    /// Credits to deduct (must be positive).
    pub amount: i64,
    /// Why the credits were spent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Use credits response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditsResponse {
    /// Subscription whose ledger was debited.
    pub subscription_id: SubscriptionId,
    /// Balance before the debit.
    pub previous_balance: i64,
    /// Balance after the debit.
    pub new_balance: i64,
    /// Credits deducted.
    pub amount_deducted: i64,
    /// Lifetime credits used.
    pub credits_used: i64,
}

/// Credit top-up request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    /// Paying customer.
    pub customer_id: CustomerId,
    /// Subscription whose ledger receives the credits.
    pub subscription_id: SubscriptionId,
    /// Amount in cents, at least `MIN_TOP_UP_CENTS`.
    pub amount: i64,
    /// Email recorded with the checkout session.
    pub user_email: String,
}

/// Credit top-up response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    /// Checkout URL to redirect the user to.
    pub url: String,
    /// Checkout session ID.
    pub session_id: String,
    /// Amount in cents.
    pub amount: i64,
}

// ============================================================================
// Ledger
// ============================================================================

/// Current counters of a subscription.
#[derive(Debug, Clone, Deserialize)]
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

/// Journal entry.
#[derive(Debug, Clone, Deserialize)]
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
    #[serde(default)]
    pub reference: Option<String>,
    /// Timestamp.
    pub created_at: DateTime<Utc>,
}

/// Page of journal entries, newest first.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntriesResponse {
    /// Entries.
    pub entries: Vec<EntryResponse>,
    /// Whether there are more entries.
    pub has_more: bool,
}

/// Health check response.
#[derive(Debug, Clone, Deserialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Service name.
    pub service: String,
    /// Service version.
    pub version: String,
}

// ============================================================================
// Errors
// ============================================================================

/// API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    pub details: Option<serde_json::Value>,
}

/// Details attached to an `insufficient_balance` error.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct InsufficientBalanceDetails {
    pub counter: Counter,
    pub balance: i64,
    pub required: i64,
}
