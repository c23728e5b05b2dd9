//! Dispatch Engine
//!
//! The dispatch engine holds the settlement and fulfilment core of the marketplace: everything that happens between
//! the payment gateway confirming a charge and the money being split between the merchant, the rider and the platform.
//!
//! The library is divided into the following sections:
//! 1. Storage ([`mod@traits`] and [`mod@sqlite`]). The traits define what a ledger store must provide; the SQLite
//!    backend is the only implementation. You should never need to access the database directly. Instead, use the
//!    public APIs. The exception is the data types used in the database. These are defined in the `db_types` module
//!    and are public.
//! 2. The engine APIs ([`mod@api`]). The payment confirmation pipeline, settlement engine, delivery orchestrator,
//!    reconciliation sweeps, stock validator, checkout and withdrawals. They are generic over the store and over the
//!    external collaborators (payment gateway, messaging channel, invoice renderer), which are defined as traits in
//!    [`mod@traits`] and implemented elsewhere.
//!
//! The engine also emits events when money or deliveries move (see [`mod@events`]), so that the transport layer can
//! fan out live alerts without the core knowing about sockets or HTTP.
pub mod api;
pub mod cache;
pub mod db_types;
pub mod events;
pub mod helpers;
#[cfg(feature = "sqlite")]
pub mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use api::{
    activity_api::ActivityApi,
    checkout_api::CheckoutApi,
    delivery_api::DeliveryApi,
    engine_config::EngineConfig,
    errors::{CheckoutError, DeliveryError, PaymentFlowError, SettlementError, WithdrawalError},
    payment_flow_api::PaymentFlowApi,
    reconciliation_api::{ReconciliationApi, SweepReport},
    settlement_api::SettlementApi,
    stock_api::StockValidator,
    withdrawal_api::WithdrawalApi,
};
pub use cache::MemoryIdempotencyCache;
#[cfg(feature = "sqlite")]
pub use cache::{IdempotencyBackend, SqliteIdempotencyCache};
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDatabase;
pub use traits::{
    ActivityManagement,
    DeliveryManagement,
    IdempotencyCache,
    InvoiceService,
    LeaseManagement,
    LedgerError,
    LedgerStore,
    Notifier,
    OrderManagement,
    PaymentGateway,
    SettlementManagement,
};
