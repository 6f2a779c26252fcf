//! Common test utilities for usage ledger integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum_test::{TestRequest, TestServer};
use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use usage_ledger_core::{Ledger, LedgerEntry, SubscriptionId};
use usage_ledger_service::crypto::hmac_sha256_hex;
use usage_ledger_service::{create_router, AppState, ServiceConfig};
use usage_ledger_store::{MemoryStore, Store};

/// Service API key accepted by the test server.
pub const SERVICE_API_KEY: &str = "test-service-key";

/// Webhook signing secret configured on the test server.
pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Test harness with an in-memory store and a mocked Stripe API.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Mock Stripe API.
    pub stripe: MockServer,
    /// The store behind the server, for direct inspection.
    pub store: Arc<dyn Store>,
}

impl TestHarness {
    /// Create a harness with Stripe and webhook verification configured.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a harness, adjusting the configuration before the server starts.
    pub async fn with_config(customize: impl FnOnce(&mut ServiceConfig)) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), customize).await
    }

    /// Create a harness over the given store.
    pub async fn with_store(
        store: Arc<dyn Store>,
        customize: impl FnOnce(&mut ServiceConfig),
    ) -> Self {
        let stripe = MockServer::start().await;

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            service_api_key: Some(SERVICE_API_KEY.into()),
            stripe_api_key: Some("sk_test_mock".into()),
            stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
            stripe_api_base: stripe.uri(),
            frontend_url: "http://localhost:3000".into(),
            ..ServiceConfig::default()
        };
        customize(&mut config);

        let state = AppState::new(store.clone(), config);
        let server = TestServer::new(create_router(state)).expect("Failed to create test server");

        Self {
            server,
            stripe,
            store,
        }
    }

    /// Register a customer and their subscriptions on the mock Stripe API.
    pub async fn mock_account(&self, email: &str, customer_id: &str, subscriptions: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("email", email))
            .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list(vec![json!({
                "id": customer_id,
                "object": "customer",
                "email": email
            })])))
            .mount(&self.stripe)
            .await;

        Mock::given(method("GET"))
            .and(path("/subscriptions"))
            .and(query_param("customer", customer_id))
            .and(query_param("status", "all"))
            .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list(subscriptions)))
            .mount(&self.stripe)
            .await;
    }

    /// Register an email without any customer.
    pub async fn mock_unknown_email(&self, email: &str) {
        Mock::given(method("GET"))
            .and(path("/customers"))
            .and(query_param("email", email))
            .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list(vec![])))
            .mount(&self.stripe)
            .await;
    }

    /// Register a subscription for retrieval by ID.
    pub async fn mock_subscription(&self, subscription: Value) {
        let id = subscription["id"].as_str().expect("subscription id").to_string();
        Mock::given(method("GET"))
            .and(path(format!("/subscriptions/{id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(subscription))
            .mount(&self.stripe)
            .await;
    }

    /// Stored ledger of a subscription.
    pub async fn ledger(&self, subscription_id: &str) -> Option<Ledger> {
        let id: SubscriptionId = subscription_id.parse().expect("valid subscription id");
        self.store.get_ledger(&id).await.expect("store read")
    }

    /// Stored journal of a subscription, newest first.
    pub async fn entries(&self, subscription_id: &str) -> Vec<LedgerEntry> {
        let id: SubscriptionId = subscription_id.parse().expect("valid subscription id");
        self.store
            .list_entries(&id, 100, 0)
            .await
            .expect("store read")
    }
}

/// Request helpers.
pub trait RequestExt {
    /// Attach the service API key.
    fn with_api_key(self) -> Self;
}

impl RequestExt for TestRequest {
    fn with_api_key(self) -> Self {
        self.add_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static(SERVICE_API_KEY),
        )
    }
}

/// A Stripe subscription object.
pub fn subscription(id: &str, customer: &str, status: &str, metadata: Value) -> Value {
    json!({
        "id": id,
        "object": "subscription",
        "customer": customer,
        "status": status,
        "metadata": metadata
    })
}

/// A Stripe list object.
pub fn stripe_list(data: Vec<Value>) -> Value {
    json!({
        "object": "list",
        "data": data,
        "has_more": false,
        "url": "/v1/mock"
    })
}

/// A `Stripe-Signature` header value for `payload`, signed now.
pub fn sign(payload: &str) -> HeaderValue {
    sign_at(payload, chrono::Utc::now().timestamp())
}

/// A `Stripe-Signature` header value for `payload`, signed at `timestamp`.
pub fn sign_at(payload: &str, timestamp: i64) -> HeaderValue {
    let signature = hmac_sha256_hex(WEBHOOK_SECRET, format!("{timestamp}.{payload}").as_bytes())
        .expect("hmac accepts any key");
    HeaderValue::from_str(&format!("t={timestamp},v1={signature}")).expect("valid header")
}

/// Header name for webhook signatures.
pub fn signature_header() -> HeaderName {
    HeaderName::from_static("stripe-signature")
}
