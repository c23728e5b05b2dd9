use dispatch_common::Kobo;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{ActivityEntry, Delivery, DeliveryStatus, Order},
    traits::SettlementBreakdown,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
}

impl OrderPaidEvent {
    pub fn new(order: Order) -> Self {
        Self { order }
    }
}

/// An order that will not be fulfilled: the payment failed, it expired unpaid, or stock ran out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAnnulledEvent {
    pub order: Order,
    pub reason: String,
}

impl OrderAnnulledEvent {
    pub fn new<S: Into<String>>(order: Order, reason: S) -> Self {
        Self { order, reason: reason.into() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatusEvent {
    pub from: Option<DeliveryStatus>,
    pub delivery: Delivery,
}

impl DeliveryStatusEvent {
    pub fn new(from: Option<DeliveryStatus>, delivery: Delivery) -> Self {
        Self { from, delivery }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowReleasedEvent {
    pub order_id: i64,
    pub merchant_id: i64,
    pub payout_id: i64,
    pub payout_amount: Kobo,
    pub breakdown: SettlementBreakdown,
}

/// Raised for every activity entry at `HIGH` severity or above.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationalAlertEvent {
    pub entry: ActivityEntry,
}

#[derive(Debug, Clone)]
pub enum EventType {
    OrderPaid(OrderPaidEvent),
    OrderAnnulled(OrderAnnulledEvent),
    DeliveryStatus(DeliveryStatusEvent),
    EscrowReleased(EscrowReleasedEvent),
    OperationalAlert(OperationalAlertEvent),
}
