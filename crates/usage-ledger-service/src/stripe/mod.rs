//! Stripe integration.
//!
//! Stripe is the system of record for customers and subscriptions. The
//! ledger uses it to:
//! - Resolve an email address to its active subscription
//! - Seed new ledgers from subscription metadata
//! - Charge emission packs through invoices
//! - Collect credit top-ups through Checkout

pub mod client;
pub mod types;

pub use client::{verify_signature, StripeClient, StripeError, SIGNATURE_TOLERANCE_SECS};
pub use types::*;
