use dispatch_common::Kobo;
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Delivery,
    DeliveryEvent,
    DeliveryFeeTransaction,
    DeliveryStatus,
    Escrow,
    Order,
    OrderItem,
    Payout,
    Rider,
};

/// The result of a successful payment-confirmation commit.
#[derive(Debug, Clone)]
pub struct ConfirmedPayment {
    pub order: Order,
    pub escrow: Escrow,
}

/// How the funds in an escrow are split on release.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementBreakdown {
    /// Σ wholesale price × quantity, paid out to the merchant
    pub merchant_amount: Kobo,
    /// Σ (retail − wholesale) × quantity, kept by the platform
    pub commission: Kobo,
    pub delivery_fee: Kobo,
    pub rider_amount: Kobo,
    pub platform_delivery_fee: Kobo,
}

impl SettlementBreakdown {
    /// Computes the split from the prices captured on the order lines. The rider's share is rounded down to the kobo
    /// and the platform keeps the remainder, so no kobo is ever lost or created.
    pub fn calculate(items: &[OrderItem], delivery_fee: Kobo, rider_fee_percent: u8) -> Self {
        let merchant_amount = items.iter().map(OrderItem::wholesale_total).sum();
        let commission = items.iter().map(OrderItem::markup_total).sum();
        let rider_amount = delivery_fee.percent(rider_fee_percent);
        let platform_delivery_fee = delivery_fee - rider_amount;
        Self { merchant_amount, commission, delivery_fee, rider_amount, platform_delivery_fee }
    }

    /// Everything the platform earns from this order
    pub fn platform_total(&self) -> Kobo {
        self.commission + self.platform_delivery_fee
    }

    pub fn total(&self) -> Kobo {
        self.merchant_amount + self.commission + self.delivery_fee
    }
}

/// Everything written by a successful escrow release.
#[derive(Debug, Clone)]
pub struct SettlementRecord {
    pub escrow: Escrow,
    pub payout: Payout,
    pub breakdown: SettlementBreakdown,
    /// `None` if the order never had a rider, in which case the platform kept the whole delivery fee.
    pub fee_transaction: Option<DeliveryFeeTransaction>,
}

#[derive(Debug, Clone)]
pub struct DeliveryCreated {
    pub delivery: Delivery,
    /// The rider that was assigned, if one was available.
    pub rider: Option<Rider>,
}

#[derive(Debug, Clone)]
pub struct Reassignment {
    pub delivery: Delivery,
    /// The rider the delivery was taken away from, now available again.
    pub previous_rider: Option<Rider>,
    pub new_rider: Rider,
}

#[derive(Debug, Clone)]
pub struct DeliveryTransition {
    pub from: DeliveryStatus,
    pub delivery: Delivery,
    pub order: Order,
    /// The rider released back to `AVAILABLE` by this transition, if any.
    pub freed_rider: Option<Rider>,
}

/// Everything the ledger knows about one order, for support and admin views.
#[derive(Debug, Clone, Serialize)]
pub struct OrderSummary {
    pub order: Order,
    pub items: Vec<OrderItem>,
    pub escrow: Option<Escrow>,
    pub payout: Option<Payout>,
    pub delivery: Option<Delivery>,
    pub delivery_events: Vec<DeliveryEvent>,
}

#[derive(Debug, Clone)]
pub struct StockRelease {
    pub order: Order,
    /// True if the order was still awaiting payment and has been expired by this call.
    pub expired: bool,
    /// The lines whose quantities were returned to stock. Empty if the order held no reservation.
    pub restored: Vec<OrderItem>,
}
