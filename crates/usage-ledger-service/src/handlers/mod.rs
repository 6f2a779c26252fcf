//! API handlers.

pub mod credits;
pub mod emissions;
pub mod health;
pub mod ledgers;
pub mod webhooks;
