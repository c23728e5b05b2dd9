//! HTTP clients for the services the dispatch engine talks to.
//!
//! * [`PaystackClient`] is the [`PaymentGateway`](dispatch_engine::PaymentGateway): charges, refunds, bank account
//!   lookups and transfers.
//! * [`WhatsAppClient`] is the [`Notifier`](dispatch_engine::Notifier), using the WhatsApp Cloud API.
//! * [`InvoiceRendererClient`] is the [`InvoiceService`](dispatch_engine::InvoiceService).
//!
//! Every client reads its own configuration from the environment with `new_from_env_or_default`.
mod config;
mod http;
mod invoices;
mod paystack;
mod whatsapp;

pub use config::{InvoiceRendererConfig, PaystackConfig, WhatsAppConfig};
pub use invoices::InvoiceRendererClient;
pub use paystack::PaystackClient;
pub use whatsapp::WhatsAppClient;
