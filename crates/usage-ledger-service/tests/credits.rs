//! Credit debit and top-up integration tests.

mod common;

use axum::http::StatusCode;
use common::{subscription, RequestExt, TestHarness};
use serde_json::{json, Value};
use usage_ledger_core::EntryKind;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, ResponseTemplate};

const EMAIL: &str = "fund@example.com";
const CUSTOMER: &str = "cus_fund";
const SUBSCRIPTION: &str = "sub_fund";

async fn account_with_credits(harness: &TestHarness, balance: &str) {
    harness
        .mock_account(
            EMAIL,
            CUSTOMER,
            vec![subscription(
                SUBSCRIPTION,
                CUSTOMER,
                "active",
                json!({ "creditBalance": balance, "creditsUsed": "100" }),
            )],
        )
        .await;
}

async fn use_credits(harness: &TestHarness, body: Value) -> axum_test::TestResponse {
    harness
        .server
        .post("/v1/credits/use")
        .with_api_key()
        .json(&body)
        .await
}

// ============================================================================
// Use Credits
// ============================================================================

#[tokio::test]
async fn use_credits_deducts_balance() {
    let harness = TestHarness::new().await;
    account_with_credits(&harness, "1000").await;

    let response = use_credits(
        &harness,
        json!({ "email": EMAIL, "amount": 250, "reason": "report generation" }),
    )
    .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["subscriptionId"], SUBSCRIPTION);
    assert_eq!(body["previousBalance"], 1000);
    assert_eq!(body["newBalance"], 750);
    assert_eq!(body["amountDeducted"], 250);
    assert_eq!(body["creditsUsed"], 350);

    let entries = harness.entries(SUBSCRIPTION).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].kind, EntryKind::CreditsUsed);
    assert_eq!(entries[0].amount, -250);
    assert_eq!(entries[0].balance_after, 750);
    assert_eq!(entries[0].reason, "report generation");
}

#[tokio::test]
async fn use_credits_can_spend_entire_balance() {
    let harness = TestHarness::new().await;
    account_with_credits(&harness, "300").await;

    let response = use_credits(&harness, json!({ "email": EMAIL, "amount": 300 })).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["newBalance"], 0);

    let entries = harness.entries(SUBSCRIPTION).await;
    assert_eq!(entries[0].reason, "Credits used");
}

#[tokio::test]
async fn use_credits_over_balance_fails() {
    let harness = TestHarness::new().await;
    account_with_credits(&harness, "100").await;

    let response = use_credits(&harness, json!({ "email": EMAIL, "amount": 101 })).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_balance");
    assert_eq!(body["error"]["details"]["counter"], "credits");
    assert_eq!(body["error"]["details"]["balance"], 100);
    assert_eq!(body["error"]["details"]["required"], 101);

    let ledger = harness.ledger(SUBSCRIPTION).await.unwrap();
    assert_eq!(ledger.credit_balance, 100);
    assert_eq!(ledger.credits_used, 100);
    assert_eq!(ledger.version, 0);
}

#[tokio::test]
async fn use_credits_rejects_non_positive_amounts() {
    let harness = TestHarness::new().await;
    account_with_credits(&harness, "100").await;

    for amount in [0, -5] {
        let response = use_credits(&harness, json!({ "email": EMAIL, "amount": amount })).await;

        response.assert_status_bad_request();
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "bad_request", "amount {amount}");
    }

    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

#[tokio::test]
async fn use_credits_requires_amount() {
    let harness = TestHarness::new().await;

    let response = use_credits(&harness, json!({ "email": EMAIL })).await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn use_credits_without_usable_subscription_is_not_found() {
    let harness = TestHarness::new().await;
    harness
        .mock_account(
            EMAIL,
            CUSTOMER,
            vec![subscription(
                SUBSCRIPTION,
                CUSTOMER,
                "incomplete_expired",
                json!({ "creditBalance": "1000" }),
            )],
        )
        .await;

    let response = use_credits(&harness, json!({ "email": EMAIL, "amount": 10 })).await;

    response.assert_status_not_found();
}

#[tokio::test]
async fn use_credits_requires_api_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/credits/use")
        .json(&json!({ "email": EMAIL, "amount": 10 }))
        .await;

    response.assert_status_unauthorized();
}

#[tokio::test]
async fn unconfigured_api_key_rejects_everything() {
    let harness = TestHarness::with_config(|config| config.service_api_key = None).await;

    let response = use_credits(&harness, json!({ "email": EMAIL, "amount": 10 })).await;

    response.assert_status_unauthorized();
}

// ============================================================================
// Top Up
// ============================================================================

fn top_up_body(amount: i64) -> Value {
    json!({
        "customerId": CUSTOMER,
        "subscriptionId": SUBSCRIPTION,
        "amount": amount,
        "userEmail": EMAIL
    })
}

#[tokio::test]
async fn top_up_below_minimum_is_rejected() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/credits/top-up")
        .with_api_key()
        .json(&top_up_body(4999))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn top_up_at_minimum_returns_checkout_url() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .and(body_string_contains("mode=payment"))
        .and(body_string_contains("credit_top_up"))
        .and(body_string_contains(SUBSCRIPTION))
        .and(body_string_contains("5000"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_test_topup",
            "object": "checkout.session",
            "url": "https://checkout.stripe.com/c/pay/cs_test_topup",
            "payment_status": "unpaid",
            "status": "open"
        })))
        .expect(1)
        .mount(&harness.stripe)
        .await;

    let response = harness
        .server
        .post("/v1/credits/top-up")
        .with_api_key()
        .json(&top_up_body(5000))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["url"], "https://checkout.stripe.com/c/pay/cs_test_topup");
    assert_eq!(body["sessionId"], "cs_test_topup");
    assert_eq!(body["amount"], 5000);

    // Crediting waits for the webhook
    assert!(harness.ledger(SUBSCRIPTION).await.is_none());
}

#[tokio::test]
async fn top_up_rejects_malformed_subscription_id() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .post("/v1/credits/top-up")
        .with_api_key()
        .json(&json!({
            "customerId": CUSTOMER,
            "subscriptionId": "not-a-subscription",
            "amount": 5000,
            "userEmail": EMAIL
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn top_up_requires_user_email() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&harness.stripe)
        .await;

    let response = harness
        .server
        .post("/v1/credits/top-up")
        .with_api_key()
        .json(&json!({
            "customerId": CUSTOMER,
            "subscriptionId": SUBSCRIPTION,
            "amount": 5000,
            "userEmail": "   "
        }))
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn top_up_provider_failure_is_upstream_failure() {
    let harness = TestHarness::new().await;
    Mock::given(method("POST"))
        .and(path("/checkout/sessions"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {
                "type": "invalid_request_error",
                "message": "No such customer: 'cus_fund'"
            }
        })))
        .mount(&harness.stripe)
        .await;

    let response = harness
        .server
        .post("/v1/credits/top-up")
        .with_api_key()
        .json(&top_up_body(10_000))
        .await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "upstream_failure");
}
