//! Credit handlers: debits and top-up checkouts.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use usage_ledger_core::{CustomerId, LedgerEntry, LedgerError, SubscriptionId, MIN_TOP_UP_CENTS};

use super::emissions::required_email;
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::ledger;
use crate::state::AppState;
use crate::stripe::TopUpCheckout;

/// Reason recorded when the caller does not give one.
const DEFAULT_REASON: &str = "Credits used";

/// Use credits request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseCreditsRequest {
    /// Email of the account spending the credits.
    pub email: String,
    /// Credits to deduct.
    pub amount: i64,
    /// Why the credits were spent.
    #[serde(default)]
    pub reason: Option<String>,
}

/// Use credits response.
#[derive(Debug, Serialize)]
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

/// Spend credits from the account's ledger.
pub async fn use_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    ApiJson(req): ApiJson<UseCreditsRequest>,
) -> Result<Json<UseCreditsResponse>, ApiError> {
    let email = required_email(&req.email)?;
    if req.amount <= 0 {
        return Err(LedgerError::InvalidAmount("amount must be greater than zero".into()).into());
    }
    let reason = req
        .reason
        .as_deref()
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REASON)
        .to_string();

    let stripe = state.stripe()?;
    let subscription = ledger::resolve_subscription(stripe, email).await?;
    let seed = ledger::seed_from(&subscription);

    let (committed, debit) = ledger::apply(state.store.as_ref(), &seed, |ledger| {
        let debit = ledger.use_credits(req.amount)?;
        let entry = LedgerEntry::credits_used(
            ledger.subscription_id.clone(),
            debit.amount,
            debit.balance,
            reason.clone(),
        );
        Ok((debit, entry))
    })
    .await?;

    tracing::info!(
        service = %auth.service_name,
        subscription_id = %committed.subscription_id,
        amount = debit.amount,
        new_balance = debit.balance,
        reason = %reason,
        "Credits used"
    );

    Ok(Json(UseCreditsResponse {
        subscription_id: committed.subscription_id,
        previous_balance: debit.previous_balance,
        new_balance: debit.balance,
        amount_deducted: debit.amount,
        credits_used: debit.used,
    }))
}

/// Top-up request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    /// Paying customer.
    pub customer_id: CustomerId,
    /// Subscription whose ledger receives the credits.
    pub subscription_id: SubscriptionId,
    /// Amount in cents (one credit per cent).
    pub amount: i64,
    /// Email recorded with the checkout session.
    pub user_email: String,
}

/// Top-up response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpResponse {
    /// Checkout URL to redirect the user to.
    pub url: String,
    /// Checkout session ID.
    pub session_id: String,
    /// Amount in cents.
    pub amount: i64,
}

/// Start a credit top-up through Stripe Checkout.
///
/// The ledger is credited later, when the completed session arrives on the
/// Stripe webhook.
pub async fn top_up_credits(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    ApiJson(req): ApiJson<TopUpRequest>,
) -> Result<Json<TopUpResponse>, ApiError> {
    if req.amount < MIN_TOP_UP_CENTS {
        return Err(LedgerError::BelowMinimum {
            amount_cents: req.amount,
            minimum_cents: MIN_TOP_UP_CENTS,
        }
        .into());
    }
    let user_email = required_email(&req.user_email)?;

    let stripe = state.stripe()?;
    let frontend_url = state.config.frontend_url.trim_end_matches('/');
    let success_url = format!("{frontend_url}/billing/success?session_id={{CHECKOUT_SESSION_ID}}");
    let cancel_url = format!("{frontend_url}/billing/cancel");

    let session = stripe
        .create_checkout_session(&TopUpCheckout {
            customer_id: &req.customer_id,
            subscription_id: &req.subscription_id,
            amount_cents: req.amount,
            user_email,
            success_url: &success_url,
            cancel_url: &cancel_url,
        })
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create Stripe checkout session");
            ApiError::from(e)
        })?;

    let url = session
        .url
        .ok_or_else(|| ApiError::Upstream("Checkout session has no URL".into()))?;

    tracing::info!(
        service = %auth.service_name,
        subscription_id = %req.subscription_id,
        session_id = %session.id,
        amount = req.amount,
        "Created credit top-up checkout session"
    );

    Ok(Json(TopUpResponse {
        url,
        session_id: session.id,
        amount: req.amount,
    }))
}
