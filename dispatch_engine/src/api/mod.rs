//! The public engine APIs.
//!
//! Each API is a thin struct over the ledger store (and whichever external collaborators it needs). They hold no state
//! of their own, are cheap to clone, and can be called concurrently from request handlers and sweep workers alike.
pub mod activity_api;
pub mod checkout_api;
pub mod delivery_api;
pub mod engine_config;
pub mod errors;
pub mod messenger;
pub mod payment_flow_api;
pub mod reconciliation_api;
pub mod settlement_api;
pub mod stock_api;
pub mod webhook_objects;
pub mod withdrawal_api;
