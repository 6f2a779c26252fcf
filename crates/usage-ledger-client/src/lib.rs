//! Usage Ledger Client SDK.
//!
//! This crate provides a client library for back-ends that spend or sell
//! emissions and credits through the usage ledger API.
//!
//! # Example
//!
//! ```no_run
//! use usage_ledger_client::{LedgerClient, UseCreditsRequest};
//!
//! # async fn example() -> Result<(), usage_ledger_client::ClientError> {
//! let client = LedgerClient::new(
//!     "http://usage-ledger.billing.svc:8080",
//!     "your-service-api-key",
//! )?;
//!
//! // Spend one emission
//! let emission = client.use_emission("user@example.com").await?;
//! println!("{} emissions left", emission.emissions_available);
//!
//! // Spend credits
//! let credits = client.use_credits(UseCreditsRequest {
//!     email: "user@example.com".to_string(),
//!     amount: 250,
//!     reason: Some("report generation".to_string()),
//! }).await?;
//!
//! println!("New balance: {} credits", credits.new_balance);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, LedgerClient};
pub use error::ClientError;
pub use types::*;
