use std::fmt::Display;

use dispatch_common::Kobo;
use serde::{Deserialize, Serialize};

use crate::{
    api::stock_api::StockIssue,
    db_types::{Delivery, Escrow, Order},
    traits::InvoiceDocument,
};

/// The payment gateway's webhook body. Only the fields the pipeline uses are read; everything else is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackEvent {
    pub event: String,
    pub data: PaystackEventData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaystackEventData {
    pub reference: String,
    /// In kobo
    pub amount: Kobo,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub gateway_response: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeEventKind {
    Success,
    Failed,
    Other,
}

impl PaystackEvent {
    pub fn kind(&self) -> ChargeEventKind {
        match self.event.as_str() {
            "charge.success" => ChargeEventKind::Success,
            "charge.failed" => ChargeEventKind::Failed,
            _ => ChargeEventKind::Other,
        }
    }

    /// The deduplication key for this event. Retries of the same event map to the same key.
    pub fn idempotency_key(&self) -> String {
        format!("paystack:{}:{}", self.event, self.data.reference)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmedOrder {
    pub order: Order,
    pub escrow: Escrow,
    /// `None` if the delivery could not be created. The failure is in the activity log.
    pub delivery: Option<Delivery>,
    pub invoice: Option<InvoiceDocument>,
}

/// What the pipeline did with a webhook event. Every variant is a success as far as the gateway is concerned.
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// The event was already processed (or is being processed) under the same idempotency key.
    Duplicate,
    /// No order carries this payment reference.
    UnknownReference,
    /// An event type the pipeline does not act on.
    Ignored,
    /// The order has already left `PENDING`.
    AlreadyProcessed,
    /// A charge succeeded for an order that had already failed or expired. A refund was requested.
    LatePayment,
    AmountMismatch { expected: Kobo, paid: Kobo },
    /// Stock ran out between checkout and payment. The order was cancelled and a refund requested.
    OutOfStock(Vec<StockIssue>),
    Confirmed(Box<ConfirmedOrder>),
    /// A failed charge was recorded against the order.
    Failed,
}

impl Display for WebhookOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WebhookOutcome::Duplicate => write!(f, "duplicate event"),
            WebhookOutcome::UnknownReference => write!(f, "unknown reference"),
            WebhookOutcome::Ignored => write!(f, "ignored"),
            WebhookOutcome::AlreadyProcessed => write!(f, "already processed"),
            WebhookOutcome::LatePayment => write!(f, "late payment, refund requested"),
            WebhookOutcome::AmountMismatch { expected, paid } => write!(f, "amount mismatch ({paid} != {expected})"),
            WebhookOutcome::OutOfStock(issues) => write!(f, "out of stock ({} lines)", issues.len()),
            WebhookOutcome::Confirmed(c) => write!(f, "order {} confirmed", c.order.order_number),
            WebhookOutcome::Failed => write!(f, "payment failed"),
        }
    }
}
