use chrono::{DateTime, Utc};

use crate::{
    db_types::{Merchant, Order, OrderDraft, OrderItem, Product, StockLine},
    traits::{ConfirmedPayment, LedgerError, StockRelease},
};

/// Orders, their captured line items, and the product stock they consume.
#[allow(async_fn_in_trait)]
pub trait OrderManagement: Clone {
    /// Writes a priced order and its lines in a single transaction.
    ///
    /// The human-readable order number (`{prefix}-YYYYMMDD-NNNN`) is allocated from the per-day sequence inside the
    /// same transaction. If `draft.reserve_stock` is set, stock for every line is decremented with a guarded update,
    /// and the whole insert fails with [`LedgerError::InsufficientStock`] if any line cannot be covered.
    async fn insert_order(&self, draft: OrderDraft, prefix: &str) -> Result<(Order, Vec<OrderItem>), LedgerError>;

    async fn fetch_order(&self, id: i64) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_by_reference(&self, reference: &str) -> Result<Option<Order>, LedgerError>;

    async fn fetch_order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, LedgerError>;

    /// Returns the current stock position of every line of the order.
    async fn fetch_stock_lines(&self, order_id: i64) -> Result<Vec<StockLine>, LedgerError>;

    async fn fetch_products(&self, ids: &[i64]) -> Result<Vec<Product>, LedgerError>;

    async fn fetch_merchant(&self, id: i64) -> Result<Option<Merchant>, LedgerError>;

    /// The payment-confirmation commit. In a single transaction:
    /// * the order moves from `PENDING` (or `FAILED`, if it has not been cancelled) to `PAID`/`PROCESSING`. The
    ///   update is guarded on the payment status, so a concurrent confirmation fails with [`LedgerError::OrderNotPending`].
    /// * the escrow row is created, `HELD`, for the order total.
    /// * if the order did not reserve stock at checkout, stock is decremented for every line. A line that can no
    ///   longer be covered fails the whole transaction with [`LedgerError::InsufficientStock`].
    async fn confirm_payment(&self, order_id: i64) -> Result<ConfirmedPayment, LedgerError>;

    /// Marks an unpaid order as `FAILED`, and additionally `CANCELLED` if `cancel` is true.
    ///
    /// With `cancel`, an order that failed earlier but was left open is cancelled as well. Returns `None` if the order
    /// was no longer awaiting payment.
    async fn fail_payment(&self, order_id: i64, cancel: bool) -> Result<Option<Order>, LedgerError>;

    /// Orders still awaiting payment whose payment window closed before `now`. This includes orders whose charge
    /// failed but which were never cancelled.
    async fn fetch_expired_unpaid_orders(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError>;

    /// Orders that are either expired and unpaid, or cancelled while still holding a stock reservation.
    async fn fetch_orders_holding_stock(&self, now: DateTime<Utc>) -> Result<Vec<Order>, LedgerError>;

    /// In one transaction, expires the order if it is still unpaid past its window, and if it holds a stock
    /// reservation and is cancelled, returns the stock of every line to the catalogue.
    ///
    /// Returns `None` if there was nothing to do.
    async fn release_reserved_stock(&self, order_id: i64, now: DateTime<Utc>)
        -> Result<Option<StockRelease>, LedgerError>;
}
