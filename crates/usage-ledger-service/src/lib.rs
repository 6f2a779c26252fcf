//! Usage Ledger HTTP API Service.
//!
//! This crate provides the HTTP API for the usage ledger, including:
//!
//! - Emission debits and emission pack purchases (paid invoices)
//! - Credit debits and credit top-ups (checkout sessions)
//! - Ledger and journal reads
//! - Stripe webhooks that credit completed top-ups
//!
//! # Authentication
//!
//! Ledger routes are called by the application back-end and require the
//! service API key in the `x-api-key` header. Webhooks are verified with the
//! Stripe signing secret instead.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Health handler needs async for routing

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ledger;
pub mod routes;
pub mod state;
pub mod stripe;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
pub use stripe::{StripeClient, StripeError};
