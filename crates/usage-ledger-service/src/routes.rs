//! Router configuration.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{credits, emissions, health, ledgers, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for ledger API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Ledger (Service API Key auth, concurrency-limited)
/// - `POST /v1/emissions/use` - Consume one emission
/// - `POST /v1/emissions/purchase` - Buy an emission pack
/// - `POST /v1/credits/use` - Spend credits
/// - `POST /v1/credits/top-up` - Start a credit top-up checkout
/// - `GET /v1/ledger/:subscription_id` - Current counters
/// - `GET /v1/ledger/:subscription_id/entries` - Journal
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/stripe` - Stripe webhooks
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = Duration::from_secs(state.config.request_timeout_seconds);

    let state = Arc::new(state);

    let api_routes = Router::new()
        // Emissions
        .route("/emissions/use", post(emissions::use_emission))
        .route("/emissions/purchase", post(emissions::purchase_emissions))
        // Credits
        .route("/credits/use", post(credits::use_credits))
        .route("/credits/top-up", post(credits::top_up_credits))
        // Reads
        .route("/ledger/:subscription_id", get(ledgers::get_ledger))
        .route("/ledger/:subscription_id/entries", get(ledgers::list_entries))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        .route("/health", get(health::health))
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by Stripe)
        .route("/webhooks/stripe", post(webhooks::stripe_webhook))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.iter().any(|o| o == "*") {
        cors.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        cors.allow_origin(origins)
    }
}
