//! Emission debit and pack purchase integration tests.

mod common;

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use common::{sign, signature_header, subscription, RequestExt, TestHarness};
use serde_json::{json, Value};
use usage_ledger_core::{EntryKind, Ledger, LedgerEntry, SubscriptionId};
use usage_ledger_store::{MemoryStore, Store, StoreError};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

const EMAIL: &str = "lp@example.com";
const CUSTOMER: &str = "cus_lp";
const SUBSCRIPTION: &str = "sub_lp";

async fn account_with(harness: &TestHarness, status: &str, metadata: Value) {
    harness
        .mock_account(
            EMAIL,
            CUSTOMER,
            vec![subscription(SUBSCRIPTION, CUSTOMER, status, metadata)],
        )
        .await;
}

async fn use_emission(harness: &TestHarness) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/emissions/use")
        .with_api_key()
        .json(&json!({ "email": EMAIL }))
        .await
}

// ============================================================================
// Use Emission
// ============================================================================

#[tokio::test]
async fn use_emission_decrements_available() {
    let harness = TestHarness::new().await;
    account_with(
        &harness,
        "active",
        json!({ "emissionsAvailable": "3", "emissionsUsed": "7" }),
    )
    .await;

    let response = use_emission(&harness).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["subscriptionId"], SUBSCRIPTION);
    assert_eq!(body["previousEmissionsAvailable"], 3);
    assert_eq!(body["emissionsAvailable"], 2);
    assert_eq!(body["emissionsUsed"], 8);

    let ledger = harness.ledger(SUBSCRIPTION).await.unwrap();
    assert_eq!(ledger.emissions_available, 2);
    assert_eq!(ledger.emissions_used, 8);
    assert_eq!(ledger.version, 1);
}

#[tokio::test]
async fn use_emission_continues_from_stored_ledger() {
    let harness = TestHarness::new().await;
    account_with(&harness, "active", json!({ "emissionsAvailable": "2" })).await;

    use_emission(&harness).await.assert_status_ok();
    let response = use_emission(&harness).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["previousEmissionsAvailable"], 1);
    assert_eq!(body["emissionsAvailable"], 0);
    assert_eq!(body["emissionsUsed"], 2);
    assert_eq!(harness.entries(SUBSCRIPTION).await.len(), 2);
}

#[tokio::test]
async fn use_emission_works_for_paused_subscription() {
    let harness = TestHarness::new().await;
    harness
        .mock_account(
            EMAIL,
            CUSTOMER,
            vec![
                subscription("sub_old", CUSTOMER, "canceled", json!({ "emissionsAvailable": "9" })),
                subscription(SUBSCRIPTION, CUSTOMER, "paused", json!({ "emissionsAvailable": "1" })),
            ],
        )
        .await;

    let response = use_emission(&harness).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["subscriptionId"], SUBSCRIPTION);
    assert_eq!(body["emissionsAvailable"], 0);
}

#[tokio::test]
async fn use_emission_with_none_available_fails() {
    let harness = TestHarness::new().await;
    account_with(
        &harness,
        "active",
        json!({ "emissionsAvailable": "0", "emissionsUsed": "4" }),
    )
    .await;

    let response = use_emission(&harness).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["counter"], "emissions");
    assert_eq!(body["error"]["details"]["balance"], 0);
    assert_eq!(body["error"]["details"]["required"], 1);

    let ledger = harness.ledger(SUBSCRIPTION).await.unwrap();
    assert_eq!(ledger.emissions_available, 0);
    assert_eq!(ledger.emissions_used, 4);
    assert!(harness.entries(SUBSCRIPTION).await.is_empty());
}

#[tokio::test]
async fn use_emission_treats_garbage_metadata_as_zero() {
    let harness = TestHarness::new().await;
    account_with(&harness, "active", json!({ "emissionsAvailable": "lots" })).await;

    let response = use_emission(&harness).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
}

#[tokio::test]
async fn use_emission_unknown_email_is_not_found() {
    let harness = TestHarness::new().await;
    harness.mock_unknown_email(EMAIL).await;

    let response = use_emission(&harness).await;

    response.assert_status_not_found();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_found");
}

#[tokio::test]
async fn use_emission_without_usable_subscription_is_not_found() {
    let harness = TestHarness::new().await;
    account_with(&harness, "canceled", json!({ "emissionsAvailable": "5" })).await;

    let response = use_emission(&harness).await;

    response.assert_status_not_found();
    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

#[tokio::test]
async fn use_emission_requires_email() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/use")
        .with_api_key()
        .json(&json!({ "email": "  " }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn use_emission_rejects_malformed_json() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/use")
        .with_api_key()
        .content_type("application/json")
        .text(&"{\"email\":")
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn use_emission_requires_api_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/use")
        .json(&json!({ "email": EMAIL }))
        .await;

    response.assert_status_unauthorized();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn use_emission_rejects_wrong_api_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/use")
        .add_header(
            axum::http::HeaderName::from_static("x-api-key"),
            axum::http::HeaderValue::from_static("not-the-key"),
        )
        .json(&json!({ "email": EMAIL }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn use_emission_without_stripe_is_upstream_failure() {
    let harness = TestHarness::with_config(|config| config.stripe_api_key = None).await;

    let response = use_emission(&harness).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "upstream_failure");
}

#[tokio::test]
async fn concurrent_debits_never_overdraw() {
    let harness = TestHarness::new().await;
    account_with(&harness, "active", json!({ "emissionsAvailable": "3" })).await;

    let request = || {
        harness
            .server
            .post("/v1/emissions/use")
            .with_api_key()
            .json(&json!({ "email": EMAIL }))
            .into_future()
    };

    let (a, b, c, d, e) = tokio::join!(request(), request(), request(), request(), request());
    let statuses: Vec<StatusCode> = [a, b, c, d, e].iter().map(|r| r.status_code()).collect();

    let succeeded = statuses.iter().filter(|s| **s == StatusCode::OK).count();
    let rejected = statuses
        .iter()
        .filter(|s| **s == StatusCode::BAD_REQUEST)
        .count();
    assert_eq!(succeeded, 3);
    assert_eq!(rejected, 2);

    let ledger = harness.ledger(SUBSCRIPTION).await.unwrap();
    assert_eq!(ledger.emissions_available, 0);
    assert_eq!(ledger.emissions_used, 3);
    assert_eq!(harness.entries(SUBSCRIPTION).await.len(), 3);
}

// ============================================================================
// Purchase Emissions
// ============================================================================

async fn mock_invoice_flow(harness: &TestHarness, price_id: &str, pay: ResponseTemplate) {
    Mock::given(method("POST"))
        .and(path("/invoices"))
        .and(body_string_contains("auto_advance=false"))
        .and(body_string_contains(format!("subscription={SUBSCRIPTION}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "in_test_1",
            "object": "invoice",
            "status": "draft",
            "customer": CUSTOMER,
            "subscription": SUBSCRIPTION
        })))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoiceitems"))
        .and(body_string_contains(format!("price={price_id}")))
        .and(body_string_contains("invoice=in_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "ii_test_1",
            "object": "invoiceitem",
            "invoice": "in_test_1",
            "amount": 2500
        })))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices/in_test_1/finalize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "in_test_1",
            "object": "invoice",
            "status": "open",
            "amount_due": 2500
        })))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices/in_test_1/pay"))
        .respond_with(pay)
        .expect(1)
        .mount(&harness.stripe)
        .await;
}

fn paid_invoice() -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "id": "in_test_1",
        "object": "invoice",
        "status": "paid",
        "customer": CUSTOMER,
        "subscription": SUBSCRIPTION,
        "amount_due": 2500,
        "amount_paid": 2500,
        "currency": "usd"
    }))
}

fn purchase_body(pack: &str) -> Value {
    json!({
        "customerId": CUSTOMER,
        "subscriptionId": SUBSCRIPTION,
        "emissionPackId": pack
    })
}

#[tokio::test]
async fn purchase_pack_adds_emissions() {
    let harness = TestHarness::new().await;
    harness
        .mock_subscription(subscription(
            SUBSCRIPTION,
            CUSTOMER,
            "active",
            json!({ "emissionsAvailable": "2" }),
        ))
        .await;
    mock_invoice_flow(&harness, "price_emission_pack_5", paid_invoice()).await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack5"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["emissionsAdded"], 5);
    assert_eq!(body["totalEmissions"], 7);
    assert_eq!(body["invoice"]["id"], "in_test_1");
    assert_eq!(body["invoice"]["status"], "paid");

    let entries = harness.entries(SUBSCRIPTION).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].amount, 5);
    assert_eq!(entries[0].reference.as_deref(), Some("in_test_1"));
}

#[tokio::test]
async fn purchase_uses_configured_price() {
    let harness = TestHarness::with_config(|config| {
        config.emission_packs.set_price("emissionPack10", "price_live_ten");
    })
    .await;
    harness
        .mock_subscription(subscription(SUBSCRIPTION, CUSTOMER, "active", json!({})))
        .await;
    mock_invoice_flow(&harness, "price_live_ten", paid_invoice()).await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack10"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["emissionsAdded"], 10);
    assert_eq!(body["totalEmissions"], 10);
}

#[tokio::test]
async fn purchase_unknown_pack_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack7"))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn purchase_for_missing_subscription_is_not_found() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack1"))
        .await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn purchase_for_other_customers_subscription_is_rejected() {
    let harness = TestHarness::new().await;
    harness
        .mock_subscription(subscription(SUBSCRIPTION, "cus_someone_else", "active", json!({})))
        .await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack1"))
        .await;

    response.assert_status_bad_request();
    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

#[tokio::test]
async fn purchase_payment_failure_leaves_ledger_untouched() {
    let harness = TestHarness::new().await;
    harness
        .mock_subscription(subscription(
            SUBSCRIPTION,
            CUSTOMER,
            "active",
            json!({ "emissionsAvailable": "2" }),
        ))
        .await;
    mock_invoice_flow(
        &harness,
        "price_emission_pack_5",
        ResponseTemplate::new(402).set_body_json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "message": "Your card was declined."
            }
        })),
    )
    .await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack5"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "upstream_failure");
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("declined"));
    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

#[tokio::test]
async fn purchase_unpaid_invoice_is_not_credited() {
    let harness = TestHarness::new().await;
    harness
        .mock_subscription(subscription(SUBSCRIPTION, CUSTOMER, "active", json!({})))
        .await;
    mock_invoice_flow(
        &harness,
        "price_emission_pack_1",
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "in_test_1",
            "object": "invoice",
            "status": "open"
        })),
    )
    .await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack1"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

/// Memory store whose commits can be switched off.
struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FlakyStore {
    fn failing() -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(true),
        }
    }

    fn recover(&self) {
        self.failing.store(false, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn get_ledger(
        &self,
        subscription_id: &SubscriptionId,
    ) -> usage_ledger_store::Result<Option<Ledger>> {
        self.inner.get_ledger(subscription_id).await
    }

    async fn create_ledger(&self, ledger: &Ledger) -> usage_ledger_store::Result<Ledger> {
        self.inner.create_ledger(ledger).await
    }

    async fn commit(
        &self,
        ledger: &Ledger,
        entry: &LedgerEntry,
    ) -> usage_ledger_store::Result<Ledger> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database("connection reset".into()));
        }
        self.inner.commit(ledger, entry).await
    }

    async fn list_entries(
        &self,
        subscription_id: &SubscriptionId,
        limit: usize,
        offset: usize,
    ) -> usage_ledger_store::Result<Vec<LedgerEntry>> {
        self.inner.list_entries(subscription_id, limit, offset).await
    }

    async fn has_reference(&self, reference: &str) -> usage_ledger_store::Result<bool> {
        self.inner.has_reference(reference).await
    }
}

fn invoice_paid_event(invoice_id: &str, pack: &str) -> String {
    json!({
        "id": format!("evt_{invoice_id}"),
        "object": "event",
        "type": "invoice.paid",
        "data": {
            "object": {
                "id": invoice_id,
                "object": "invoice",
                "status": "paid",
                "customer": CUSTOMER,
                "subscription": SUBSCRIPTION,
                "amount_paid": 2500,
                "metadata": {
                    "emissionPackId": pack,
                    "subscriptionId": SUBSCRIPTION
                }
            }
        }
    })
    .to_string()
}

#[tokio::test]
async fn paid_purchase_lost_by_store_is_credited_by_webhook() {
    let store = Arc::new(FlakyStore::failing());
    let harness = TestHarness::with_store(store.clone(), |_| {}).await;
    harness
        .mock_subscription(subscription(
            SUBSCRIPTION,
            CUSTOMER,
            "active",
            json!({ "emissionsAvailable": "2" }),
        ))
        .await;
    mock_invoice_flow(&harness, "price_emission_pack_5", paid_invoice()).await;

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack5"))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    assert!(harness.entries(SUBSCRIPTION).await.is_empty());

    store.recover();
    let payload = invoice_paid_event("in_test_1", "emissionPack5");
    for _ in 0..2 {
        harness
            .server
            .post("/webhooks/stripe")
            .add_header(signature_header(), sign(&payload))
            .text(&payload)
            .await
            .assert_status_ok();
    }

    let ledger = harness.ledger(SUBSCRIPTION).await.unwrap();
    assert_eq!(ledger.emissions_available, 7);
    assert_eq!(ledger.version, 1);

    let entries = harness.entries(SUBSCRIPTION).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::EmissionsPurchased);
    assert_eq!(entries[0].reference.as_deref(), Some("in_test_1"));
}

#[tokio::test]
async fn purchase_after_webhook_credit_is_not_credited_twice() {
    let harness = TestHarness::new().await;
    harness
        .mock_subscription(subscription(SUBSCRIPTION, CUSTOMER, "active", json!({})))
        .await;
    mock_invoice_flow(&harness, "price_emission_pack_1", paid_invoice()).await;

    let payload = invoice_paid_event("in_test_1", "emissionPack1");
    harness
        .server
        .post("/webhooks/stripe")
        .add_header(signature_header(), sign(&payload))
        .text(&payload)
        .await
        .assert_status_ok();

    let response = harness
        .server
        .post("/v1/emissions/purchase")
        .with_api_key()
        .json(&purchase_body("emissionPack1"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["emissionsAdded"], 1);
    assert_eq!(body["totalEmissions"], 1);
    assert_eq!(harness.entries(SUBSCRIPTION).await.len(), 1);
}
