//! # Ledger store and collaborator contracts
//!
//! This module defines the interface contracts that the engine APIs are written against.
//!
//! ## Storage
//! The ledger store is split by concern:
//!
//! * [`OrderManagement`] covers orders, their captured line items, stock and the payment-confirmation commit.
//! * [`SettlementManagement`] covers escrow, wallets and their append-only ledgers, payouts and withdrawals.
//! * [`DeliveryManagement`] covers deliveries, their audit trail and the rider fleet.
//! * [`ActivityManagement`] is the operational activity log.
//! * [`LedgerStore`] ties them together; it is what the APIs are generic over.
//!
//! Two small coordination primitives are defined separately, since they need not live in the same store:
//! [`IdempotencyCache`] (atomic set-if-absent with expiry) and [`LeaseManagement`] (leader leases for the sweeps).
//!
//! Every state-changing store method re-reads the current status inside its own transaction, so callers never need
//! to lock anything.
//!
//! ## External collaborators
//! [`PaymentGateway`], [`Notifier`] and [`InvoiceService`] are implemented by HTTP clients outside this crate.
mod activity_management;
mod coordination;
mod data_objects;
mod delivery_management;
mod gateways;
mod ledger_store;
mod order_management;
mod settlement_management;

pub use activity_management::ActivityManagement;
pub use coordination::{IdempotencyCache, LeaseManagement};
pub use data_objects::{
    ConfirmedPayment,
    DeliveryCreated,
    DeliveryTransition,
    OrderSummary,
    Reassignment,
    SettlementBreakdown,
    SettlementRecord,
    StockRelease,
};
pub use delivery_management::DeliveryManagement;
pub use gateways::{
    BankAccount,
    ChargeAuthorization,
    ChargeRequest,
    GatewayError,
    InvoiceDocument,
    InvoiceLine,
    InvoiceRequest,
    InvoiceService,
    Notifier,
    PaymentGateway,
    PromptButton,
    RefundAck,
    TransferAck,
    TransferRequest,
};
pub use ledger_store::{LedgerError, LedgerStore};
pub use order_management::OrderManagement;
pub use settlement_management::SettlementManagement;
