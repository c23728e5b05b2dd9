use dispatch_common::Kobo;
use thiserror::Error;

use crate::{
    db_types::{DeliveryStatus, PayoutStatus},
    traits::{ActivityManagement, DeliveryManagement, OrderManagement, SettlementManagement},
};

/// The full ledger store. This is the bound that the engine APIs use.
pub trait LedgerStore: OrderManagement + SettlementManagement + DeliveryManagement + ActivityManagement {
    /// The URL of the database
    fn url(&self) -> &str;
}

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("We have an internal database engine (configuration/uptime etc.) error: {0}")]
    DatabaseError(String),
    #[error("A record with this reference already exists. {0}")]
    DuplicateReference(String),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} is not awaiting payment")]
    OrderNotPending(i64),
    #[error("Product {product_id} has {available} units in stock, but {required} are required")]
    InsufficientStock { product_id: i64, required: i64, available: i64 },
    #[error("Product {0} does not exist or is not available for sale")]
    ProductUnavailable(i64),
    #[error("There is no escrow for order {0}")]
    EscrowNotFound(i64),
    #[error("The escrow for order {0} has already been released")]
    AlreadyReleased(i64),
    #[error("Delivery {0} does not exist")]
    DeliveryNotFound(i64),
    #[error("Order {0} already has a delivery")]
    DeliveryExists(i64),
    #[error("A delivery cannot move from {from} to {to}")]
    IllegalTransition { from: DeliveryStatus, to: DeliveryStatus },
    #[error("Rider {0} does not exist")]
    RiderNotFound(i64),
    #[error("Rider {0} has an active delivery and cannot change status")]
    RiderBusy(i64),
    #[error("Rider {0} has not been approved")]
    RiderNotApproved(i64),
    #[error("Rider {rider_id} is not the assigned rider for delivery {delivery_id}")]
    NotAssignedRider { delivery_id: i64, rider_id: i64 },
    #[error("There is no wallet for {0}")]
    WalletNotFound(String),
    #[error("Insufficient funds. The balance is {balance}, but {requested} was requested")]
    InsufficientFunds { balance: Kobo, requested: Kobo },
    #[error("Payout {0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout {id} cannot move from {from} to {to}")]
    IllegalPayoutTransition { id: i64, from: PayoutStatus, to: PayoutStatus },
    #[error("There is no pending withdrawal with reference {0}")]
    WithdrawalNotFound(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => LedgerError::DuplicateReference(db.to_string()),
            e => LedgerError::DatabaseError(e.to_string()),
        }
    }
}
