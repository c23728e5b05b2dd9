use chrono::{DateTime, Utc};

use crate::{
    db_types::{Delivery, DeliveryEvent, DeliveryStatus, NewDelivery, Rider},
    traits::{DeliveryCreated, DeliveryTransition, LedgerError, Reassignment},
};

/// Deliveries, their audit trail, and the rider fleet.
///
/// A rider is `BUSY` exactly while it is the assigned rider of an active delivery. Every method that assigns or
/// frees a rider changes the rider's status in the same transaction as the delivery.
#[allow(async_fn_in_trait)]
pub trait DeliveryManagement: Clone {
    /// Creates the delivery for an order, allocating its delivery number from the per-day sequence.
    ///
    /// The first available, approved rider is claimed with a guarded update and the delivery starts in `ASSIGNED`.
    /// If no rider is free, the delivery starts in `PENDING` with no rider. Fails with [`LedgerError::DeliveryExists`]
    /// if the order already has a delivery.
    async fn create_delivery(&self, delivery: NewDelivery, prefix: &str) -> Result<DeliveryCreated, LedgerError>;

    async fn fetch_delivery(&self, id: i64) -> Result<Option<Delivery>, LedgerError>;

    async fn fetch_delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, LedgerError>;

    async fn fetch_delivery_events(&self, delivery_id: i64) -> Result<Vec<DeliveryEvent>, LedgerError>;

    /// Tries to give a `PENDING` delivery with no rider to an available rider. Returns `None` if no rider is free or
    /// the delivery is no longer waiting for one.
    async fn assign_pending_delivery(&self, delivery_id: i64) -> Result<Option<DeliveryCreated>, LedgerError>;

    /// Moves an `ASSIGNED` (or `PENDING`) delivery to a different available rider, freeing the current one.
    ///
    /// Returns `None`, leaving everything untouched, if no other rider is available.
    async fn reassign_delivery(&self, delivery_id: i64, reason: &str) -> Result<Option<Reassignment>, LedgerError>;

    /// Advances the delivery state machine.
    ///
    /// * `rider_id`: if provided, the transition is only permitted for the delivery's assigned rider.
    /// * Reaching `DELIVERED` sets `auto_release_at`, frees the rider and increments its delivery count.
    /// * Reaching `CANCELLED` frees the rider, if any.
    /// * The order's fulfilment status follows the delivery.
    ///
    /// An event row is written for every transition.
    async fn transition_delivery(
        &self,
        delivery_id: i64,
        to: DeliveryStatus,
        rider_id: Option<i64>,
        note: Option<&str>,
        auto_release_at: Option<DateTime<Utc>>,
    ) -> Result<DeliveryTransition, LedgerError>;

    /// Records the customer's confirmation of receipt. Returns `None` if the delivery is not `DELIVERED` or was
    /// already confirmed.
    async fn confirm_delivery(&self, delivery_id: i64) -> Result<Option<Delivery>, LedgerError>;

    /// Deliveries that have been `ASSIGNED` since before `assigned_before`.
    async fn fetch_stuck_assignments(&self, assigned_before: DateTime<Utc>) -> Result<Vec<Delivery>, LedgerError>;

    /// `PENDING` deliveries that are still waiting for a rider.
    async fn fetch_unassigned_deliveries(&self) -> Result<Vec<Delivery>, LedgerError>;

    /// `DELIVERED` deliveries whose escrow is still held, and which are either confirmed by the customer or past
    /// their auto-release deadline.
    async fn fetch_deliveries_due_for_release(&self, now: DateTime<Utc>) -> Result<Vec<Delivery>, LedgerError>;

    async fn fetch_rider(&self, id: i64) -> Result<Option<Rider>, LedgerError>;

    /// Toggles an approved rider between `OFFLINE` and `AVAILABLE`. Busy riders are refused with
    /// [`LedgerError::RiderBusy`].
    async fn set_rider_online(&self, rider_id: i64, online: bool) -> Result<Rider, LedgerError>;

    async fn update_rider_location(&self, rider_id: i64, lat: f64, lng: f64) -> Result<Rider, LedgerError>;
}
