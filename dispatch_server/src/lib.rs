//! # Dispatch server
//! This crate hosts the HTTP front end of the dispatch marketplace. It is responsible for:
//! * Receiving payment webhooks from Paystack and handing them, byte for byte, to the payment confirmation pipeline.
//! * Rider and customer actions: going online, location updates, delivery progress and confirmation of receipt.
//! * Admin tools: reassigning and cancelling deliveries, releasing escrow by hand, the activity log, and live feeds.
//! * Running the reconciliation sweeps in the background.
//!
//! ## Configuration
//! The server is configured via `DSP_*` environment variables. See [config](config/index.html) for more information.
//!
//! ## Routes
//! The server exposes the following routes:
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/webhook/paystack`: The payment gateway webhook. Optionally restricted to an IP whitelist.
//! * `/api/riders/{id}/status`, `/api/riders/{id}/location`: Rider availability and position.
//! * `/api/deliveries/{id}/status`, `/api/deliveries/{id}/confirm`: Delivery progress and customer confirmation.
//! * `/api/admin/...`: Admin routes. They require the `X-Admin-Key` header.
pub mod alerts;
pub mod cli;
pub mod config;
pub mod connections;
pub mod data_objects;
pub mod errors;
pub mod helpers;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod sweep_worker;

#[cfg(test)]
mod endpoint_tests;
