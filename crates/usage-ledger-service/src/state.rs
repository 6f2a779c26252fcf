//! Application state.

use std::sync::Arc;

use usage_ledger_store::Store;

use crate::config::ServiceConfig;
use crate::error::ApiError;
use crate::stripe::StripeClient;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Stripe client for customer lookups and payments (optional).
    pub stripe: Option<Arc<StripeClient>>,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        // Create Stripe client if configured
        let stripe = config.stripe_api_key.as_ref().and_then(|key| {
            match StripeClient::new(key, config.stripe_webhook_secret.clone()) {
                Ok(client) => {
                    tracing::info!(base_url = %config.stripe_api_base, "Stripe integration enabled");
                    Some(Arc::new(client.with_base_url(&config.stripe_api_base)))
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to create Stripe client");
                    None
                }
            }
        });

        if stripe.is_none() {
            tracing::warn!("Stripe not configured - ledger operations will not be available");
        }

        Self {
            store,
            config,
            stripe,
        }
    }

    /// Get the Stripe client, or an upstream error when it is not configured.
    pub fn stripe(&self) -> Result<&StripeClient, ApiError> {
        self.stripe
            .as_deref()
            .ok_or_else(|| ApiError::Upstream("Stripe not configured".into()))
    }
}
