use dispatch_common::Kobo;
use thiserror::Error;

use crate::{
    db_types::DeliveryStatus,
    traits::{GatewayError, LedgerError},
};

#[derive(Debug, Clone, Error)]
pub enum PaymentFlowError {
    #[error("The webhook signature is invalid")]
    InvalidSignature,
    #[error("The webhook payload could not be read. {0}")]
    MalformedPayload(String),
    #[error("Could not claim the idempotency key. {0}")]
    IdempotencyError(String),
    #[error("{0}")]
    Ledger(#[from] LedgerError),
}

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("There is no escrow for order {0}")]
    NotFound(i64),
    #[error("The escrow for order {0} has already been released")]
    AlreadyReleased(i64),
    #[error("Payout {0} does not exist")]
    PayoutNotFound(i64),
    #[error("Payout {0} is not pending")]
    PayoutNotPending(i64),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for SettlementError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::EscrowNotFound(id) => Self::NotFound(id),
            LedgerError::AlreadyReleased(id) => Self::AlreadyReleased(id),
            LedgerError::PayoutNotFound(id) => Self::PayoutNotFound(id),
            LedgerError::IllegalPayoutTransition { id, .. } => Self::PayoutNotPending(id),
            e => Self::Ledger(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    #[error("Delivery {0} does not exist")]
    NotFound(i64),
    #[error("Order {0} does not exist")]
    OrderNotFound(i64),
    #[error("Order {0} has not been paid")]
    OrderNotPaid(i64),
    #[error("Order {0} already has a delivery")]
    DeliveryExists(i64),
    #[error("Merchant {0} has no pickup location with coordinates")]
    NoPickupLocation(i64),
    #[error("A delivery cannot move from {from} to {to}")]
    IllegalTransition { from: DeliveryStatus, to: DeliveryStatus },
    #[error("Rider {rider_id} is not the assigned rider for delivery {delivery_id}")]
    NotAssignedRider { delivery_id: i64, rider_id: i64 },
    #[error("Delivery {0} has not been delivered yet")]
    NotDelivered(i64),
    #[error("Rider {0} does not exist")]
    RiderNotFound(i64),
    #[error("Rider {0} has an active delivery")]
    RiderBusy(i64),
    #[error("Rider {0} has not been approved")]
    RiderNotApproved(i64),
    #[error("Settlement failed. {0}")]
    Settlement(#[from] SettlementError),
    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for DeliveryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::DeliveryNotFound(id) => Self::NotFound(id),
            LedgerError::OrderNotFound(id) => Self::OrderNotFound(id),
            LedgerError::DeliveryExists(id) => Self::DeliveryExists(id),
            LedgerError::IllegalTransition { from, to } => Self::IllegalTransition { from, to },
            LedgerError::NotAssignedRider { delivery_id, rider_id } => Self::NotAssignedRider { delivery_id, rider_id },
            LedgerError::RiderNotFound(id) => Self::RiderNotFound(id),
            LedgerError::RiderBusy(id) => Self::RiderBusy(id),
            LedgerError::RiderNotApproved(id) => Self::RiderNotApproved(id),
            e => Self::Ledger(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum WithdrawalError {
    #[error("Withdrawal amounts must be positive, not {0}")]
    InvalidAmount(Kobo),
    #[error("There is no wallet for {0}")]
    WalletNotFound(String),
    #[error("Insufficient funds. The balance is {balance}, but {requested} was requested")]
    InsufficientFunds { balance: Kobo, requested: Kobo },
    #[error("The bank account could not be verified. {0}")]
    AccountVerification(GatewayError),
    #[error("The transfer failed and the wallet has been refunded. {0}")]
    TransferFailed(GatewayError),
    #[error("Payment gateway error. {0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for WithdrawalError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::WalletNotFound(owner) => Self::WalletNotFound(owner),
            LedgerError::InsufficientFunds { balance, requested } => Self::InsufficientFunds { balance, requested },
            e => Self::Ledger(e),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum CheckoutError {
    #[error("An order needs at least one item")]
    EmptyOrder,
    #[error("Quantity for product {0} must be positive")]
    InvalidQuantity(i64),
    #[error("The delivery fee cannot be negative")]
    InvalidDeliveryFee,
    #[error("Merchant {0} does not exist")]
    MerchantNotFound(i64),
    #[error("Product {0} does not exist or is not available for sale")]
    ProductUnavailable(i64),
    #[error("Product {product_id} does not belong to merchant {merchant_id}")]
    WrongMerchant { product_id: i64, merchant_id: i64 },
    #[error("Product {product_id} has {available} units in stock, but {required} are required")]
    InsufficientStock { product_id: i64, required: i64, available: i64 },
    #[error("The payment gateway could not start the charge. {0}")]
    Gateway(#[from] GatewayError),
    #[error("{0}")]
    Ledger(LedgerError),
}

impl From<LedgerError> for CheckoutError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientStock { product_id, required, available } => {
                Self::InsufficientStock { product_id, required, available }
            },
            LedgerError::ProductUnavailable(id) => Self::ProductUnavailable(id),
            e => Self::Ledger(e),
        }
    }
}
