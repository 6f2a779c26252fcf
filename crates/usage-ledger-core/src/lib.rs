//! Core types and rules for the usage ledger.
//!
//! This crate provides the foundational types shared by the ledger service,
//! its storage backends and the client SDK:
//!
//! - **Identifiers**: `SubscriptionId`, `CustomerId`, `EntryId`
//! - **Ledger**: `Ledger`, `Counter`, `EmissionDebit`, `CreditDebit`
//! - **Journal**: `LedgerEntry`, `EntryKind`
//! - **Packs**: `EmissionPack`, `EmissionPackCatalog`
//!
//! # Counters
//!
//! Every subscription owns two independent counters:
//!
//! - **Emissions**: discrete units, one consumed per use, bought in packs.
//! - **Credits**: an integer balance debited by arbitrary amounts.
//!   **1 credit = $0.01 (1 cent)** when topped up through checkout.
//!
//! Both balances are `i64` and never go below zero.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod entry;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod packs;

pub use entry::{EntryKind, LedgerEntry};
pub use error::{LedgerError, Result};
pub use ids::{CustomerId, EntryId, IdError, SubscriptionId};
pub use ledger::{
    Counter, CreditDebit, EmissionDebit, Ledger, METADATA_CREDITS_USED, METADATA_CREDIT_BALANCE,
    METADATA_EMISSIONS_AVAILABLE, METADATA_EMISSIONS_USED, MIN_TOP_UP_CENTS,
};
pub use packs::{EmissionPack, EmissionPackCatalog};
