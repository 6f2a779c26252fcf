//! Stripe webhook handler.
//!
//! Completed credit top-up checkouts and paid emission pack invoices are
//! credited here. The checkout session or invoice ID is the journal
//! reference, so a redelivered event is acknowledged without crediting twice.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use usage_ledger_core::{LedgerEntry, SubscriptionId};
use usage_ledger_store::Store;

use crate::error::ApiError;
use crate::ledger::{self, Applied};
use crate::state::AppState;
use crate::stripe::{CheckoutSession, Invoice, WebhookEvent};

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
}

/// Handle Stripe webhooks.
///
/// Events are only accepted with a valid signature. Without a configured
/// webhook secret every event is rejected.
pub async fn stripe_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    let stripe = state
        .stripe
        .as_deref()
        .filter(|stripe| stripe.has_webhook_secret())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook secret not configured, rejecting webhook");
            ApiError::BadRequest("Webhook verification not configured".into())
        })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            tracing::warn!("Stripe webhook without signature");
            ApiError::BadRequest("Missing Stripe signature".into())
        })?;

    stripe.verify_webhook_signature(&body, signature).map_err(|e| {
        tracing::warn!(error = %e, "Invalid Stripe webhook signature");
        ApiError::BadRequest("Invalid webhook signature".into())
    })?;

    let event: WebhookEvent =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %event.event_type,
        event_id = %event.id,
        "Received Stripe webhook"
    );

    match event.event_type.as_str() {
        "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
            let session: CheckoutSession = serde_json::from_value(event.data.object)
                .map_err(|e| ApiError::BadRequest(format!("Invalid checkout session: {e}")))?;
            handle_checkout_paid(&state, &session).await?;
        }
        "invoice.paid" => {
            let invoice: Invoice = serde_json::from_value(event.data.object)
                .map_err(|e| ApiError::BadRequest(format!("Invalid invoice: {e}")))?;
            handle_invoice_paid(&state, &invoice).await?;
        }
        _ => {
            tracing::debug!(event_type = %event.event_type, "Unhandled Stripe event");
        }
    }

    Ok(Json(WebhookResponse { received: true }))
}

async fn handle_checkout_paid(state: &AppState, session: &CheckoutSession) -> Result<(), ApiError> {
    if !session.is_credit_top_up() {
        tracing::debug!(session_id = %session.id, "Checkout session is not a credit top-up, skipping");
        return Ok(());
    }

    if !session.is_paid() {
        tracing::info!(
            session_id = %session.id,
            payment_status = ?session.payment_status,
            "Checkout session not paid yet, skipping"
        );
        return Ok(());
    }

    let subscription_id = parse_subscription_id(session.metadata.get("subscriptionId").map(String::as_str))?;

    let credit_amount = session
        .metadata
        .get("creditAmount")
        .and_then(|v| v.parse::<i64>().ok())
        .filter(|amount| *amount > 0)
        .ok_or_else(|| ApiError::BadRequest("Missing or invalid creditAmount metadata".into()))?;

    let store: &dyn Store = state.store.as_ref();
    if store.has_reference(&session.id).await? {
        tracing::info!(session_id = %session.id, "Checkout session already credited");
        return Ok(());
    }

    let seed = ledger::load_or_seed(store, state.stripe.as_deref(), &subscription_id).await?;

    let applied = ledger::apply_once(store, &seed, &session.id, |ledger| {
        let balance = ledger.add_credits(credit_amount)?;
        let entry = LedgerEntry::credits_topped_up(
            ledger.subscription_id.clone(),
            credit_amount,
            balance,
            session.id.clone(),
        );
        Ok((balance, entry))
    })
    .await?;

    match applied {
        Applied::Committed(_, balance) => tracing::info!(
            subscription_id = %subscription_id,
            session_id = %session.id,
            credits_added = credit_amount,
            new_balance = balance,
            "Credits added from Stripe checkout"
        ),
        Applied::AlreadyApplied(_) => {
            tracing::info!(session_id = %session.id, "Checkout session already credited");
        }
    }
    Ok(())
}

async fn handle_invoice_paid(state: &AppState, invoice: &Invoice) -> Result<(), ApiError> {
    let Some(pack_id) = invoice.emission_pack_id() else {
        tracing::debug!(invoice_id = %invoice.id, "Invoice is not an emission pack, skipping");
        return Ok(());
    };

    if !invoice.is_paid() {
        tracing::info!(invoice_id = %invoice.id, status = ?invoice.status, "Invoice not paid, skipping");
        return Ok(());
    }

    let pack = state.config.emission_packs.get(pack_id)?;
    let subscription_id = parse_subscription_id(invoice.subscription_id())?;

    let store: &dyn Store = state.store.as_ref();
    if store.has_reference(&invoice.id).await? {
        tracing::debug!(invoice_id = %invoice.id, "Emission pack invoice already credited");
        return Ok(());
    }

    let seed = ledger::load_or_seed(store, state.stripe.as_deref(), &subscription_id).await?;

    let applied = ledger::apply_once(store, &seed, &invoice.id, |ledger| {
        let total = ledger.add_emissions(pack.emissions)?;
        let entry = LedgerEntry::emissions_purchased(
            ledger.subscription_id.clone(),
            pack.emissions,
            total,
            &pack.id,
            invoice.id.clone(),
        );
        Ok((total, entry))
    })
    .await?;

    if let Applied::Committed(_, total) = applied {
        tracing::info!(
            subscription_id = %subscription_id,
            invoice_id = %invoice.id,
            pack_id = %pack.id,
            emissions_added = pack.emissions,
            total_emissions = total,
            "Emissions added from paid invoice"
        );
    }
    Ok(())
}

fn parse_subscription_id(raw: Option<&str>) -> Result<SubscriptionId, ApiError> {
    raw.ok_or_else(|| ApiError::BadRequest("Missing subscriptionId metadata".into()))?
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid subscriptionId metadata: {e}")))
}
