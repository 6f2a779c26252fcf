//! Stripe API types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use usage_ledger_core::{CustomerId, SubscriptionId};

/// Subscription statuses that may spend ledger balances.
pub const USABLE_SUBSCRIPTION_STATUSES: [&str; 2] = ["active", "paused"];

/// Checkout metadata `kind` marking a credit top-up session.
pub const CREDIT_TOP_UP_KIND: &str = "credit_top_up";

/// Stripe customer object.
#[derive(Debug, Clone, Deserialize)]
pub struct Customer {
    /// Stripe customer ID.
    pub id: CustomerId,
    /// Customer email.
    #[serde(default)]
    pub email: Option<String>,
    /// Customer name.
    #[serde(default)]
    pub name: Option<String>,
}

/// Stripe subscription object.
#[derive(Debug, Clone, Deserialize)]
pub struct Subscription {
    /// Subscription ID.
    pub id: SubscriptionId,
    /// Owning customer ID.
    pub customer: CustomerId,
    /// Subscription status (active, paused, canceled, ...).
    pub status: String,
    /// Metadata; holds the legacy ledger counters.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Subscription {
    /// Whether this subscription may spend emissions and credits.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        USABLE_SUBSCRIPTION_STATUSES.contains(&self.status.as_str())
    }
}

/// Stripe invoice object.
///
/// Returned verbatim to callers of the purchase endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID.
    pub id: String,
    /// Invoice status (draft, open, paid, ...).
    #[serde(default)]
    pub status: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription ID.
    #[serde(default)]
    pub subscription: Option<String>,
    /// Amount due in cents.
    #[serde(default)]
    pub amount_due: i64,
    /// Amount paid in cents.
    #[serde(default)]
    pub amount_paid: i64,
    /// Currency (e.g., "usd").
    #[serde(default)]
    pub currency: Option<String>,
    /// Hosted invoice page.
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Invoice {
    /// Whether the invoice has been paid in full.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.status.as_deref() == Some("paid")
    }

    /// Emission pack this invoice was created for, if any.
    #[must_use]
    pub fn emission_pack_id(&self) -> Option<&str> {
        self.metadata.get("emissionPackId").map(String::as_str)
    }

    /// Subscription the invoice belongs to, preferring our own metadata.
    #[must_use]
    pub fn subscription_id(&self) -> Option<&str> {
        self.metadata
            .get("subscriptionId")
            .or(self.subscription.as_ref())
            .map(String::as_str)
    }
}

/// Stripe invoice item object.
#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceItem {
    /// Invoice item ID.
    pub id: String,
    /// Invoice the item is attached to.
    #[serde(default)]
    pub invoice: Option<String>,
    /// Amount in cents.
    #[serde(default)]
    pub amount: i64,
}

/// Stripe Checkout session object.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    /// Session ID.
    pub id: String,
    /// Checkout URL to redirect the user to.
    #[serde(default)]
    pub url: Option<String>,
    /// Payment status (paid, unpaid, `no_payment_required`).
    #[serde(default)]
    pub payment_status: Option<String>,
    /// Customer ID.
    #[serde(default)]
    pub customer: Option<String>,
    /// Total amount in cents.
    #[serde(default)]
    pub amount_total: Option<i64>,
    /// Session status.
    #[serde(default)]
    pub status: Option<String>,
    /// Metadata.
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    /// Whether payment for this session has been collected.
    #[must_use]
    pub fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Whether this session was created for a credit top-up.
    #[must_use]
    pub fn is_credit_top_up(&self) -> bool {
        self.metadata.get("kind").map(String::as_str) == Some(CREDIT_TOP_UP_KIND)
    }
}

/// Parameters for a credit top-up Checkout session.
#[derive(Debug, Clone)]
pub struct TopUpCheckout<'a> {
    /// Paying customer.
    pub customer_id: &'a CustomerId,
    /// Subscription whose ledger receives the credits.
    pub subscription_id: &'a SubscriptionId,
    /// Amount in cents; equal to the credits granted.
    pub amount_cents: i64,
    /// Email recorded with the session.
    pub user_email: &'a str,
    /// Redirect after payment.
    pub success_url: &'a str,
    /// Redirect after cancellation.
    pub cancel_url: &'a str,
}

/// Stripe list response wrapper.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeList<T> {
    /// Object type (always "list").
    #[serde(default)]
    pub object: String,
    /// Data items.
    pub data: Vec<T>,
    /// Whether there are more items.
    #[serde(default)]
    pub has_more: bool,
}

/// Stripe webhook event.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    /// Event ID.
    pub id: String,
    /// Event type (e.g., "checkout.session.completed").
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event data.
    pub data: WebhookEventData,
    /// Created timestamp (Unix).
    #[serde(default)]
    pub created: i64,
}

/// Webhook event data container.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    /// The event object.
    pub object: serde_json::Value,
}

/// Stripe API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorResponse {
    /// Error details.
    pub error: StripeErrorDetail,
}

/// Stripe error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeErrorDetail {
    /// Error type.
    #[serde(rename = "type")]
    pub error_type: String,
    /// Error message.
    #[serde(default)]
    pub message: String,
    /// Error code.
    #[serde(default)]
    pub code: Option<String>,
}
