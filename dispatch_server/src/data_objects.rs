use std::fmt::Display;

use dispatch_engine::{
    db_types::{ActivityEntry, Delivery, DeliveryStatus, Escrow, Order, Payout, Rider},
    traits::{DeliveryTransition, OrderSummary, Reassignment, SettlementBreakdown, SettlementRecord},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiderStatusParams {
    pub online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationParams {
    pub lat: f64,
    pub lng: f64,
}

/// A rider reporting progress on a delivery. `status` is one of `PICKED_UP`, `IN_TRANSIT` or `DELIVERED`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryStatusParams {
    pub rider_id: i64,
    pub status: DeliveryStatus,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReasonParams {
    #[serde(default)]
    pub reason: Option<String>,
}

impl ReasonParams {
    pub fn reason_or(&self, default: &str) -> String {
        self.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()).unwrap_or(default).to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamQuery {
    /// Names the connection in the logs and for targeted messages
    pub client: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionResult {
    pub from: DeliveryStatus,
    pub delivery: Delivery,
    pub order: Order,
    pub freed_rider: Option<Rider>,
}

impl From<DeliveryTransition> for TransitionResult {
    fn from(t: DeliveryTransition) -> Self {
        Self { from: t.from, delivery: t.delivery, order: t.order, freed_rider: t.freed_rider }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettlementResult {
    pub escrow: Escrow,
    pub payout: Payout,
    pub breakdown: SettlementBreakdown,
}

impl From<SettlementRecord> for SettlementResult {
    fn from(r: SettlementRecord) -> Self {
        Self { escrow: r.escrow, payout: r.payout, breakdown: r.breakdown }
    }
}

/// The answer to a customer confirmation. `settlement` is empty if the escrow had already been released.
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmationResult {
    pub delivery_id: i64,
    pub settlement: Option<SettlementResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReassignmentResult {
    pub reassigned: bool,
    pub delivery: Option<Delivery>,
    pub previous_rider: Option<Rider>,
    pub new_rider: Option<Rider>,
}

impl From<Option<Reassignment>> for ReassignmentResult {
    fn from(r: Option<Reassignment>) -> Self {
        match r {
            Some(r) => Self {
                reassigned: true,
                delivery: Some(r.delivery),
                previous_rider: r.previous_rider,
                new_rider: Some(r.new_rider),
            },
            None => Self { reassigned: false, delivery: None, previous_rider: None, new_rider: None },
        }
    }
}

/// The admin view of an order: the ledger trail plus everything the activity log says about it.
#[derive(Debug, Clone, Serialize)]
pub struct OrderReport {
    #[serde(flatten)]
    pub summary: OrderSummary,
    pub activity: Vec<ActivityEntry>,
}
