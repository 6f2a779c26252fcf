//! Stripe API client implementation.

use reqwest::Client;
use std::time::Duration;

use usage_ledger_core::{CustomerId, SubscriptionId};

use super::types::{
    CheckoutSession, Customer, Invoice, InvoiceItem, StripeErrorResponse, StripeList,
    Subscription, TopUpCheckout, CREDIT_TOP_UP_KIND,
};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Maximum age, in seconds, of a signed webhook timestamp.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Error type for Stripe operations.
#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stripe API returned an error.
    #[error("Stripe API error: {error_type} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error type.
        error_type: String,
        /// Error message.
        message: String,
        /// Error code.
        code: Option<String>,
    },

    /// Invalid webhook signature.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Webhook timestamp outside the tolerance window.
    #[error("Webhook timestamp outside tolerance")]
    StaleSignature,

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Stripe API client.
#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_key: String,
    webhook_secret: Option<String>,
    base_url: String,
}

impl StripeClient {
    /// Stripe API base URL.
    pub const DEFAULT_BASE_URL: &'static str = "https://api.stripe.com/v1";

    /// Create a new Stripe client.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `webhook_secret` - Optional webhook signing secret (whsec_...)
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: Option<String>,
    ) -> Result<Self, StripeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            webhook_secret,
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API base URL (used for mocks).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Whether a webhook signing secret is configured.
    #[must_use]
    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Find the customer registered with an email address (exact match).
    pub async fn find_customers_by_email(&self, email: &str) -> Result<Vec<Customer>, StripeError> {
        let response = self
            .client
            .get(self.url("customers"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await?;

        let list: StripeList<Customer> = self.handle_response(response).await?;
        Ok(list.data)
    }

    /// List all subscriptions of a customer, in any status.
    pub async fn list_subscriptions(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Vec<Subscription>, StripeError> {
        let response = self
            .client
            .get(self.url("subscriptions"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .query(&[
                ("customer", customer_id.as_str()),
                ("status", "all"),
                ("limit", "100"),
            ])
            .send()
            .await?;

        let list: StripeList<Subscription> = self.handle_response(response).await?;
        Ok(list.data)
    }

    /// First active or paused subscription of a customer.
    pub async fn find_usable_subscription(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Subscription>, StripeError> {
        let subscriptions = self.list_subscriptions(customer_id).await?;
        Ok(subscriptions.into_iter().find(Subscription::is_usable))
    }

    /// Get a subscription by ID.
    pub async fn get_subscription(
        &self,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>, StripeError> {
        let response = self
            .client
            .get(self.url(&format!("subscriptions/{subscription_id}")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        self.handle_response(response).await.map(Some)
    }

    /// Create a draft invoice that is not advanced automatically.
    pub async fn create_invoice(
        &self,
        customer_id: &CustomerId,
        subscription_id: &SubscriptionId,
        pack_id: &str,
    ) -> Result<Invoice, StripeError> {
        let params = [
            ("customer", customer_id.as_str()),
            ("subscription", subscription_id.as_str()),
            ("auto_advance", "false"),
            ("collection_method", "charge_automatically"),
            ("metadata[emissionPackId]", pack_id),
            ("metadata[subscriptionId]", subscription_id.as_str()),
        ];

        let response = self
            .client
            .post(self.url("invoices"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Attach one unit of a price to a draft invoice.
    pub async fn create_invoice_item(
        &self,
        customer_id: &CustomerId,
        invoice_id: &str,
        price_id: &str,
    ) -> Result<InvoiceItem, StripeError> {
        let params = [
            ("customer", customer_id.as_str()),
            ("invoice", invoice_id),
            ("price", price_id),
            ("quantity", "1"),
        ];

        let response = self
            .client
            .post(self.url("invoiceitems"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Finalize a draft invoice.
    pub async fn finalize_invoice(&self, invoice_id: &str) -> Result<Invoice, StripeError> {
        let response = self
            .client
            .post(self.url(&format!("invoices/{invoice_id}/finalize")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Attempt payment of a finalized invoice.
    pub async fn pay_invoice(&self, invoice_id: &str) -> Result<Invoice, StripeError> {
        let response = self
            .client
            .post(self.url(&format!("invoices/{invoice_id}/pay")))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Create a payment-mode Checkout session for a credit top-up.
    pub async fn create_checkout_session(
        &self,
        checkout: &TopUpCheckout<'_>,
    ) -> Result<CheckoutSession, StripeError> {
        let amount = checkout.amount_cents.to_string();
        let params = [
            ("mode", "payment"),
            ("customer", checkout.customer_id.as_str()),
            ("success_url", checkout.success_url),
            ("cancel_url", checkout.cancel_url),
            ("line_items[0][price_data][currency]", "usd"),
            ("line_items[0][price_data][product_data][name]", "Credits"),
            ("line_items[0][price_data][unit_amount]", amount.as_str()),
            ("line_items[0][quantity]", "1"),
            ("metadata[kind]", CREDIT_TOP_UP_KIND),
            ("metadata[subscriptionId]", checkout.subscription_id.as_str()),
            ("metadata[creditAmount]", amount.as_str()),
            ("metadata[userEmail]", checkout.user_email),
        ];

        tracing::debug!(
            customer_id = %checkout.customer_id,
            subscription_id = %checkout.subscription_id,
            amount_cents = checkout.amount_cents,
            "Creating Stripe checkout session"
        );

        let response = self
            .client
            .post(self.url("checkout/sessions"))
            .basic_auth(&self.api_key, Option::<&str>::None)
            .form(&params)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Verify a webhook signature against the configured signing secret.
    ///
    /// # Arguments
    ///
    /// * `payload` - Raw request body
    /// * `signature` - Value of the `Stripe-Signature` header
    pub fn verify_webhook_signature(
        &self,
        payload: &str,
        signature: &str,
    ) -> Result<(), StripeError> {
        let secret = self
            .webhook_secret
            .as_ref()
            .ok_or_else(|| StripeError::Configuration("Webhook secret not configured".into()))?;

        verify_signature(secret, payload, signature, chrono::Utc::now().timestamp())
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, StripeError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        // Try to parse error response
        let error_body: Result<StripeErrorResponse, _> = response.json().await;

        match error_body {
            Ok(stripe_error) => Err(StripeError::Api {
                status: status.as_u16(),
                error_type: stripe_error.error.error_type,
                message: stripe_error.error.message,
                code: stripe_error.error.code,
            }),
            Err(_) => Err(StripeError::Api {
                status: status.as_u16(),
                error_type: "unknown".to_string(),
                message: format!("HTTP {status}"),
                code: None,
            }),
        }
    }
}

/// Verify a `Stripe-Signature` header (`t=timestamp,v1=signature,...`).
///
/// The signed payload is `"{t}.{payload}"`. Any `v1` entry may match, and the
/// timestamp must be within [`SIGNATURE_TOLERANCE_SECS`] of `now`.
pub fn verify_signature(
    secret: &str,
    payload: &str,
    header: &str,
    now: i64,
) -> Result<(), StripeError> {
    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
    let issued_at: i64 = timestamp
        .parse()
        .map_err(|_| StripeError::InvalidSignature)?;

    if signatures.is_empty() {
        return Err(StripeError::InvalidSignature);
    }

    if (now - issued_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(StripeError::StaleSignature);
    }

    let signed_payload = format!("{timestamp}.{payload}");
    let expected = hmac_sha256_hex(secret, signed_payload.as_bytes())
        .map_err(|e| StripeError::Configuration(e.to_string()))?;

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(StripeError::InvalidSignature)
    }
}
