//! Emission handlers: per-use debits and pack purchases.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use usage_ledger_core::{CustomerId, LedgerEntry, SubscriptionId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::ledger::{self, Applied};
use crate::state::AppState;
use crate::stripe::Invoice;

/// Use emission request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseEmissionRequest {
    /// Email of the account spending the emission.
    pub email: String,
}

/// Use emission response.
#[derive(Debug, Serialize)]
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

/// Consume one emission from the account's ledger.
pub async fn use_emission(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    ApiJson(req): ApiJson<UseEmissionRequest>,
) -> Result<Json<UseEmissionResponse>, ApiError> {
    let email = required_email(&req.email)?;
    let stripe = state.stripe()?;

    let subscription = ledger::resolve_subscription(stripe, email).await?;
    let seed = ledger::seed_from(&subscription);

    let (committed, debit) = ledger::apply(state.store.as_ref(), &seed, |ledger| {
        let debit = ledger.use_emission()?;
        let entry = LedgerEntry::emission_used(ledger.subscription_id.clone(), debit.available);
        Ok((debit, entry))
    })
    .await?;

    tracing::info!(
        service = %auth.service_name,
        subscription_id = %committed.subscription_id,
        emissions_available = debit.available,
        emissions_used = debit.used,
        "Emission used"
    );

    Ok(Json(UseEmissionResponse {
        subscription_id: committed.subscription_id,
        previous_emissions_available: debit.previous_available,
        emissions_available: debit.available,
        emissions_used: debit.used,
    }))
}

/// Purchase emissions request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEmissionsRequest {
    /// Paying customer.
    pub customer_id: CustomerId,
    /// Subscription receiving the emissions.
    pub subscription_id: SubscriptionId,
    /// Emission pack ID (e.g., `emissionPack5`).
    pub emission_pack_id: String,
}

/// Purchase emissions response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseEmissionsResponse {
    /// The paid Stripe invoice.
    pub invoice: Invoice,
    /// Emissions added by the pack.
    pub emissions_added: i64,
    /// Emissions available after the purchase.
    pub total_emissions: i64,
}

/// Charge an emission pack and credit its emissions.
///
/// The invoice is created, finalized and paid in one request. Payment
/// failures are returned to the caller and the ledger is left untouched.
/// A paid invoice that cannot be credited here is credited when its
/// `invoice.paid` webhook arrives; the invoice ID keeps it to one credit.
pub async fn purchase_emissions(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    ApiJson(req): ApiJson<PurchaseEmissionsRequest>,
) -> Result<Json<PurchaseEmissionsResponse>, ApiError> {
    let pack = state.config.emission_packs.get(&req.emission_pack_id)?.clone();
    let stripe = state.stripe()?;

    let subscription = stripe
        .get_subscription(&req.subscription_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to fetch Stripe subscription");
            ApiError::from(e)
        })?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Subscription not found: {}", req.subscription_id))
        })?;

    if subscription.customer != req.customer_id {
        return Err(ApiError::BadRequest(format!(
            "Subscription {} does not belong to customer {}",
            req.subscription_id, req.customer_id
        )));
    }

    let draft = stripe
        .create_invoice(&req.customer_id, &req.subscription_id, &pack.id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to create Stripe invoice");
            ApiError::from(e)
        })?;

    stripe
        .create_invoice_item(&req.customer_id, &draft.id, &pack.price_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, invoice_id = %draft.id, "Failed to add invoice item");
            ApiError::from(e)
        })?;

    stripe.finalize_invoice(&draft.id).await.map_err(|e| {
        tracing::error!(error = %e, invoice_id = %draft.id, "Failed to finalize invoice");
        ApiError::from(e)
    })?;

    let invoice = stripe.pay_invoice(&draft.id).await.map_err(|e| {
        tracing::warn!(error = %e, invoice_id = %draft.id, "Emission pack payment failed");
        ApiError::from(e)
    })?;

    if !invoice.is_paid() {
        tracing::warn!(
            invoice_id = %invoice.id,
            status = ?invoice.status,
            "Emission pack invoice not paid"
        );
        return Err(ApiError::Upstream(format!(
            "invoice {} was not paid (status: {})",
            invoice.id,
            invoice.status.as_deref().unwrap_or("unknown")
        )));
    }

    let seed = ledger::seed_from(&subscription);
    let applied = ledger::apply_once(state.store.as_ref(), &seed, &invoice.id, |ledger| {
        let total = ledger.add_emissions(pack.emissions)?;
        let entry = LedgerEntry::emissions_purchased(
            ledger.subscription_id.clone(),
            pack.emissions,
            total,
            &pack.id,
            invoice.id.clone(),
        );
        Ok((pack.emissions, entry))
    })
    .await
    .map_err(|e| {
        tracing::error!(
            error = %e,
            subscription_id = %req.subscription_id,
            pack_id = %pack.id,
            invoice_id = %invoice.id,
            "Paid invoice not credited, awaiting invoice.paid webhook"
        );
        e
    })?;

    let committed = match applied {
        Applied::Committed(committed, _) => committed,
        Applied::AlreadyApplied(current) => {
            tracing::info!(invoice_id = %invoice.id, "Invoice already credited by webhook");
            current
        }
    };
    let emissions_added = pack.emissions;

    tracing::info!(
        service = %auth.service_name,
        subscription_id = %committed.subscription_id,
        pack_id = %pack.id,
        invoice_id = %invoice.id,
        emissions_added,
        total_emissions = committed.emissions_available,
        "Emission pack purchased"
    );

    Ok(Json(PurchaseEmissionsResponse {
        emissions_added,
        total_emissions: committed.emissions_available,
        invoice,
    }))
}

/// Trimmed, non-empty email from a request body.
pub(crate) fn required_email(email: &str) -> Result<&str, ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::BadRequest("email is required".into()));
    }
    Ok(email)
}
