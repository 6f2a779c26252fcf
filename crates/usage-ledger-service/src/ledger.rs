//! Ledger orchestration: account resolution, seeding, and versioned commits.
//!
//! Every mutation follows the same cycle: read the ledger (seeding it from
//! subscription metadata on first use), apply the change to a copy, and
//! commit the copy conditioned on the version that was read. A version
//! conflict means another request committed in between, so the cycle starts
//! over from a fresh read and the change is validated again.

use usage_ledger_core::{Ledger, LedgerEntry, LedgerError, SubscriptionId};
use usage_ledger_store::{Store, StoreError};

use crate::error::ApiError;
use crate::stripe::{StripeClient, Subscription};

/// Commit attempts before a mutation gives up with `409 conflict`.
pub const MAX_COMMIT_ATTEMPTS: u32 = 5;

/// Resolve an email address to the customer's usable subscription.
///
/// The first active or paused subscription of the matching customer wins.
pub async fn resolve_subscription(
    stripe: &StripeClient,
    email: &str,
) -> Result<Subscription, ApiError> {
    let customers = stripe.find_customers_by_email(email).await.map_err(|e| {
        tracing::error!(error = %e, "Failed to look up Stripe customer");
        ApiError::from(e)
    })?;

    if customers.is_empty() {
        return Err(ApiError::NotFound(format!("No customer found for {email}")));
    }

    for customer in &customers {
        let subscription = stripe
            .find_usable_subscription(&customer.id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, customer_id = %customer.id, "Failed to list subscriptions");
                ApiError::from(e)
            })?;

        if let Some(subscription) = subscription {
            return Ok(subscription);
        }
    }

    Err(LedgerError::NoActiveSubscription {
        email: email.to_string(),
    }
    .into())
}

/// Initial ledger state for a subscription, taken from its metadata.
#[must_use]
pub fn seed_from(subscription: &Subscription) -> Ledger {
    Ledger::from_metadata(
        subscription.id.clone(),
        subscription.customer.clone(),
        &subscription.metadata,
    )
}

/// Load a ledger, creating it from `seed` if it does not exist yet.
///
/// When two requests seed concurrently, both receive the record of
/// whichever insert landed first.
pub async fn load_or_create(store: &dyn Store, seed: &Ledger) -> Result<Ledger, ApiError> {
    if let Some(ledger) = store.get_ledger(&seed.subscription_id).await? {
        return Ok(ledger);
    }

    let ledger = store.create_ledger(seed).await?;
    tracing::info!(
        subscription_id = %ledger.subscription_id,
        emissions_available = ledger.emissions_available,
        credit_balance = ledger.credit_balance,
        "Seeded ledger from subscription metadata"
    );
    Ok(ledger)
}

/// Load a ledger by subscription ID, seeding it from Stripe if needed.
pub async fn load_or_seed(
    store: &dyn Store,
    stripe: Option<&StripeClient>,
    subscription_id: &SubscriptionId,
) -> Result<Ledger, ApiError> {
    if let Some(ledger) = store.get_ledger(subscription_id).await? {
        return Ok(ledger);
    }

    let stripe = stripe.ok_or_else(|| ApiError::Upstream("Stripe not configured".into()))?;
    let subscription = stripe
        .get_subscription(subscription_id)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, subscription_id = %subscription_id, "Failed to fetch subscription");
            ApiError::from(e)
        })?
        .ok_or_else(|| ApiError::NotFound(format!("Subscription not found: {subscription_id}")))?;

    load_or_create(store, &seed_from(&subscription)).await
}

/// Apply `change` to the ledger identified by `seed` and commit it.
///
/// `change` receives a copy of the current ledger, mutates it, and returns
/// an outcome with the journal entry to append. It may run several times
/// and must derive everything from the ledger it is given. Validation
/// errors from `change` abort immediately without retrying.
///
/// Returns the committed ledger and the outcome of the successful attempt.
pub async fn apply<T, F>(store: &dyn Store, seed: &Ledger, mut change: F) -> Result<(Ledger, T), ApiError>
where
    T: Send,
    F: FnMut(&mut Ledger) -> Result<(T, LedgerEntry), LedgerError> + Send,
{
    let mut current = load_or_create(store, seed).await?;

    for attempt in 1..=MAX_COMMIT_ATTEMPTS {
        let mut next = current.clone();
        let (outcome, entry) = change(&mut next)?;

        match store.commit(&next, &entry).await {
            Ok(committed) => return Ok((committed, outcome)),
            Err(StoreError::VersionConflict {
                expected, actual, ..
            }) => {
                tracing::debug!(
                    subscription_id = %seed.subscription_id,
                    attempt,
                    expected,
                    actual,
                    "Ledger version conflict, retrying"
                );
                current = store
                    .get_ledger(&seed.subscription_id)
                    .await?
                    .ok_or_else(|| {
                        ApiError::NotFound(format!("Ledger not found: {}", seed.subscription_id))
                    })?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    tracing::warn!(
        subscription_id = %seed.subscription_id,
        attempts = MAX_COMMIT_ATTEMPTS,
        "Giving up after repeated ledger version conflicts"
    );
    Err(ApiError::Conflict(format!(
        "ledger for {} is being modified concurrently, retry the request",
        seed.subscription_id
    )))
}

/// Result of [`apply_once`].
#[derive(Debug)]
pub enum Applied<T> {
    /// This call committed the change.
    Committed(Ledger, T),
    /// An entry with the same reference was committed earlier.
    AlreadyApplied(Ledger),
}

/// Like [`apply`], but for changes identified by an external `reference`.
///
/// A reference that is already in the journal is not applied again. Losing
/// a commit race to another writer of the same reference counts as already
/// applied rather than a conflict.
pub async fn apply_once<T, F>(
    store: &dyn Store,
    seed: &Ledger,
    reference: &str,
    change: F,
) -> Result<Applied<T>, ApiError>
where
    T: Send,
    F: FnMut(&mut Ledger) -> Result<(T, LedgerEntry), LedgerError> + Send,
{
    if store.has_reference(reference).await? {
        let current = load_or_create(store, seed).await?;
        return Ok(Applied::AlreadyApplied(current));
    }

    match apply(store, seed, change).await {
        Ok((committed, outcome)) => Ok(Applied::Committed(committed, outcome)),
        Err(ApiError::Conflict(message)) => {
            if store.has_reference(reference).await? {
                let current = load_or_create(store, seed).await?;
                Ok(Applied::AlreadyApplied(current))
            } else {
                Err(ApiError::Conflict(message))
            }
        }
        Err(e) => Err(e),
    }
}
