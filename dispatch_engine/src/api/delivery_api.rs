use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    api::{
        activity_api::ActivityApi,
        engine_config::EngineConfig,
        errors::DeliveryError,
        messenger::Messenger,
        settlement_api::SettlementApi,
    },
    db_types::{
        Delivery,
        DeliveryEvent,
        DeliveryStatus,
        EscrowStatus,
        Location,
        NewActivity,
        NewDelivery,
        Order,
        PaymentStatus,
        Rider,
        Severity,
    },
    events::{DeliveryStatusEvent, EventProducers},
    traits::{
        DeliveryCreated,
        DeliveryTransition,
        LedgerStore,
        Notifier,
        OrderSummary,
        PaymentGateway,
        PromptButton,
        Reassignment,
        SettlementRecord,
    },
};

pub const CONFIRM_DELIVERY_BUTTON: &str = "confirm_delivery";
pub const REPORT_ISSUE_BUTTON: &str = "report_issue";

/// The delivery orchestrator.
///
/// Creates deliveries for paid orders, assigns and reassigns riders, and moves deliveries through their state
/// machine. Every store-side change is guarded (see [`DeliveryStatus::can_transition_to`]); the notifications that
/// follow are best-effort and never undo a transition.
#[derive(Clone)]
pub struct DeliveryApi<B, G, N> {
    db: B,
    messenger: Messenger<N>,
    settlement: SettlementApi<B, G>,
    activity: ActivityApi<B>,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B, G, N> Debug for DeliveryApi<B, G, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DeliveryApi")
    }
}

impl<B: Clone, G, N> DeliveryApi<B, G, N> {
    pub fn new(db: B, gateway: G, notifier: N, producers: EventProducers, config: EngineConfig) -> Self {
        let messenger = Messenger::new(notifier, config.broadcast_delay);
        let settlement = SettlementApi::new(db.clone(), gateway, producers.clone(), config.clone());
        let activity = ActivityApi::new(db.clone(), producers.clone());
        Self { db, messenger, settlement, activity, producers, config }
    }

    pub fn settlement(&self) -> &SettlementApi<B, G> {
        &self.settlement
    }
}

impl<B, G, N> DeliveryApi<B, G, N>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    /// Creates the delivery for a paid order and assigns the first available rider.
    ///
    /// No rider being free is not an error: the delivery is created in `PENDING`, an alert is raised, and the
    /// stuck-delivery sweep keeps trying to assign it.
    pub async fn create_delivery(&self, order_id: i64) -> Result<DeliveryCreated, DeliveryError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(DeliveryError::OrderNotFound(order_id))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(DeliveryError::OrderNotPaid(order_id));
        }
        if self.db.fetch_delivery_for_order(order_id).await?.is_some() {
            return Err(DeliveryError::DeliveryExists(order_id));
        }
        let pickup = self
            .db
            .fetch_merchant(order.merchant_id)
            .await?
            .and_then(|m| m.pickup_location())
            .ok_or(DeliveryError::NoPickupLocation(order.merchant_id))?;
        let dropoff =
            Location { address: order.delivery_address.clone(), lat: order.delivery_lat, lng: order.delivery_lng };
        let new_delivery = NewDelivery { order_id, pickup, dropoff, delivery_fee: order.delivery_fee };
        let created = self.db.create_delivery(new_delivery, &self.config.delivery_prefix).await?;
        let delivery = &created.delivery;
        info!("🛵️ Delivery {} created for order {} ({})", delivery.delivery_number, order.order_number, delivery.status);
        self.producers.publish_delivery_status(DeliveryStatusEvent::new(None, delivery.clone())).await;
        match &created.rider {
            Some(rider) => self.announce_assignment(&order, delivery, rider).await,
            None => {
                let msg = format!(
                    "No rider is available for delivery {} (order {}). It is waiting in PENDING.",
                    delivery.delivery_number, order.order_number
                );
                self.activity.log(NewActivity::new("delivery", Severity::High, msg).for_order(order_id)).await;
                let body = format!(
                    "Your order {} is confirmed! All our riders are busy right now, so there may be a short delay \
                     before it is picked up. We'll let you know as soon as a rider is on the way.",
                    order.order_number
                );
                self.notify(order_id, &order.customer_id, &body).await;
            },
        }
        Ok(created)
    }

    /// Tries to give an unassigned `PENDING` delivery to an available rider. Returns `None` if the delivery is no
    /// longer waiting or nobody is free.
    pub async fn assign_pending(&self, delivery_id: i64) -> Result<Option<DeliveryCreated>, DeliveryError> {
        let Some(assigned) = self.db.assign_pending_delivery(delivery_id).await? else {
            trace!("🛵️ Delivery #{delivery_id} could not be assigned yet");
            return Ok(None);
        };
        let delivery = &assigned.delivery;
        info!("🛵️ Pending delivery {} has been assigned", delivery.delivery_number);
        let event = DeliveryStatusEvent::new(Some(DeliveryStatus::Pending), delivery.clone());
        self.producers.publish_delivery_status(event).await;
        if let (Some(rider), Some(order)) = (&assigned.rider, self.db.fetch_order(delivery.order_id).await?) {
            self.announce_assignment(&order, delivery, rider).await;
        }
        Ok(Some(assigned))
    }

    /// Runs [`Self::assign_pending`] over every delivery still waiting for a rider. One failure does not stop the
    /// others. Returns the number of deliveries that were assigned.
    pub async fn retry_pending_assignments(&self) -> Result<usize, DeliveryError> {
        let waiting = self.db.fetch_unassigned_deliveries().await?;
        let mut assigned = 0;
        for delivery in waiting {
            match self.assign_pending(delivery.id).await {
                Ok(Some(_)) => assigned += 1,
                Ok(None) => match self.db.fetch_delivery(delivery.id).await {
                    // Still waiting, so nobody is free and there is no point trying the rest
                    Ok(Some(d)) if d.status == DeliveryStatus::Pending && d.rider_id.is_none() => break,
                    // Taken or cancelled by someone else in the meantime
                    Ok(_) => trace!("🛵️ Delivery {} no longer needs a rider", delivery.delivery_number),
                    Err(e) => warn!("🛵️ Could not re-read delivery {}. {e}", delivery.delivery_number),
                },
                Err(e) => warn!("🛵️ Could not assign delivery {}. {e}", delivery.delivery_number),
            }
        }
        Ok(assigned)
    }

    /// Moves the delivery to a different available rider.
    ///
    /// If nobody else is free, the delivery stays with its current rider and an alert is raised. Returns `None` in
    /// that case.
    pub async fn reassign_delivery(&self, delivery_id: i64, reason: &str) -> Result<Option<Reassignment>, DeliveryError> {
        let Some(reassignment) = self.db.reassign_delivery(delivery_id, reason).await? else {
            let delivery = self.db.fetch_delivery(delivery_id).await?.ok_or(DeliveryError::NotFound(delivery_id))?;
            let msg = format!(
                "Delivery {} needs a new rider ({reason}) but nobody else is available. It stays with rider {:?}.",
                delivery.delivery_number, delivery.rider_id
            );
            self.activity.log(NewActivity::new("delivery", Severity::High, msg).for_order(delivery.order_id)).await;
            return Ok(None);
        };
        let delivery = &reassignment.delivery;
        info!(
            "🛵️ Delivery {} reassigned from rider {:?} to rider #{}. {reason}",
            delivery.delivery_number,
            reassignment.previous_rider.as_ref().map(|r| r.id),
            reassignment.new_rider.id
        );
        let event = DeliveryStatusEvent::new(Some(DeliveryStatus::Assigned), delivery.clone());
        self.producers.publish_delivery_status(event).await;
        if let Some(previous) = &reassignment.previous_rider {
            let body = format!("Delivery {} has been reassigned to another rider. You are free for new jobs.", delivery.delivery_number);
            self.notify(delivery.order_id, &previous.phone, &body).await;
        }
        if let Some(order) = self.db.fetch_order(delivery.order_id).await? {
            self.announce_assignment(&order, delivery, &reassignment.new_rider).await;
        }
        Ok(Some(reassignment))
    }

    /// A rider reports progress on their delivery: `PICKED_UP`, `IN_TRANSIT` or `DELIVERED`.
    pub async fn update_delivery_status(
        &self,
        delivery_id: i64,
        rider_id: i64,
        status: DeliveryStatus,
        note: Option<&str>,
    ) -> Result<DeliveryTransition, DeliveryError> {
        if !matches!(status, DeliveryStatus::PickedUp | DeliveryStatus::InTransit | DeliveryStatus::Delivered) {
            let delivery = self.db.fetch_delivery(delivery_id).await?.ok_or(DeliveryError::NotFound(delivery_id))?;
            return Err(DeliveryError::IllegalTransition { from: delivery.status, to: status });
        }
        self.transition(delivery_id, status, Some(rider_id), note).await
    }

    /// Cancels a delivery (an admin action). The rider, if any, is freed and the order is cancelled.
    ///
    /// The escrow is left `HELD`. Refunding the customer is a manual step, so a `HIGH` entry is raised for it.
    pub async fn cancel_delivery(&self, delivery_id: i64, reason: &str) -> Result<DeliveryTransition, DeliveryError> {
        let transition = self.transition(delivery_id, DeliveryStatus::Cancelled, None, Some(reason)).await?;
        let order = &transition.order;
        let msg = format!("Delivery {} was cancelled. {reason}", transition.delivery.delivery_number);
        self.activity.log(NewActivity::new("delivery", Severity::Medium, msg).for_order(order.id)).await;
        match self.db.fetch_escrow_for_order(order.id).await {
            Ok(Some(escrow)) if escrow.status == EscrowStatus::Held => {
                let msg = format!(
                    "Order {} was cancelled with {} still held in escrow. The customer must be refunded manually.",
                    order.order_number, escrow.amount
                );
                self.activity.log(NewActivity::new("settlement", Severity::High, msg).for_order(order.id)).await;
            },
            Ok(_) => {},
            Err(e) => {
                let msg = format!("Could not check the escrow of cancelled order {}. {e}", order.order_number);
                self.activity.log(NewActivity::new("settlement", Severity::High, msg).for_order(order.id)).await;
            },
        }
        if let Some(rider) = &transition.freed_rider {
            let body = format!("Delivery {} has been cancelled. You are free for new jobs.", transition.delivery.delivery_number);
            self.notify(transition.order.id, &rider.phone, &body).await;
        }
        Ok(transition)
    }

    /// The customer confirms they received their order. This releases the escrow.
    ///
    /// Confirming twice, or confirming after the auto-release sweep got there first, is harmless: the escrow is only
    /// ever released once, and `None` is returned for the later calls.
    pub async fn confirm_delivery(&self, delivery_id: i64) -> Result<Option<SettlementRecord>, DeliveryError> {
        let delivery = self.db.fetch_delivery(delivery_id).await?.ok_or(DeliveryError::NotFound(delivery_id))?;
        if delivery.status != DeliveryStatus::Delivered {
            return Err(DeliveryError::NotDelivered(delivery_id));
        }
        if self.db.confirm_delivery(delivery_id).await?.is_some() {
            info!("🛵️ Customer confirmed receipt of delivery {}", delivery.delivery_number);
        }
        let record = self.settlement.release_if_held(delivery.order_id).await?;
        if let Some(record) = &record {
            self.announce_settlement(&delivery, record).await;
        }
        Ok(record)
    }

    pub async fn set_rider_online(&self, rider_id: i64, online: bool) -> Result<Rider, DeliveryError> {
        let rider = self.db.set_rider_online(rider_id, online).await?;
        info!("🛵️ Rider #{rider_id} is now {}", rider.status);
        if online {
            // A newly available rider can pick up a delivery that has been waiting
            if let Some(waiting) = self.db.fetch_unassigned_deliveries().await?.first() {
                if let Err(e) = self.assign_pending(waiting.id).await {
                    warn!("🛵️ Could not assign waiting delivery {}. {e}", waiting.delivery_number);
                }
            }
            let rider = self.db.fetch_rider(rider_id).await?.ok_or(DeliveryError::RiderNotFound(rider_id))?;
            return Ok(rider);
        }
        Ok(rider)
    }

    pub async fn update_rider_location(&self, rider_id: i64, lat: f64, lng: f64) -> Result<Rider, DeliveryError> {
        let rider = self.db.update_rider_location(rider_id, lat, lng).await?;
        trace!("🛵️ Rider #{rider_id} is at ({lat}, {lng})");
        Ok(rider)
    }

    pub async fn order_summary(&self, order_id: i64) -> Result<OrderSummary, DeliveryError> {
        let order = self.db.fetch_order(order_id).await?.ok_or(DeliveryError::OrderNotFound(order_id))?;
        let items = self.db.fetch_order_items(order_id).await?;
        let escrow = self.db.fetch_escrow_for_order(order_id).await?;
        let payout = self.db.fetch_payout_for_order(order_id).await?;
        let delivery = self.db.fetch_delivery_for_order(order_id).await?;
        let delivery_events = match &delivery {
            Some(d) => self.db.fetch_delivery_events(d.id).await?,
            None => Vec::new(),
        };
        Ok(OrderSummary { order, items, escrow, payout, delivery, delivery_events })
    }

    /// The delivery and its audit trail.
    pub async fn delivery_details(&self, delivery_id: i64) -> Result<(Delivery, Vec<DeliveryEvent>), DeliveryError> {
        let delivery = self.db.fetch_delivery(delivery_id).await?.ok_or(DeliveryError::NotFound(delivery_id))?;
        let events = self.db.fetch_delivery_events(delivery_id).await?;
        Ok((delivery, events))
    }

    async fn transition(
        &self,
        delivery_id: i64,
        to: DeliveryStatus,
        rider_id: Option<i64>,
        note: Option<&str>,
    ) -> Result<DeliveryTransition, DeliveryError> {
        let auto_release_at = Utc::now() + self.config.auto_release_after;
        let transition = self.db.transition_delivery(delivery_id, to, rider_id, note, Some(auto_release_at)).await?;
        let delivery = &transition.delivery;
        info!("🛵️ Delivery {} moved from {} to {to}", delivery.delivery_number, transition.from);
        let event = DeliveryStatusEvent::new(Some(transition.from), delivery.clone());
        self.producers.publish_delivery_status(event).await;
        let order = &transition.order;
        match to {
            DeliveryStatus::PickedUp => {
                let body = format!("Your order {} has been picked up by the rider.", order.order_number);
                self.notify(order.id, &order.customer_id, &body).await;
            },
            DeliveryStatus::InTransit => {
                let body = format!("Your order {} is on its way to {}.", order.order_number, delivery.dropoff_address);
                self.notify(order.id, &order.customer_id, &body).await;
            },
            DeliveryStatus::Delivered => self.request_confirmation(order, delivery).await,
            DeliveryStatus::Cancelled => {
                let body = format!(
                    "The delivery for your order {} has been cancelled. Our team will be in touch.",
                    order.order_number
                );
                self.notify(order.id, &order.customer_id, &body).await;
            },
            DeliveryStatus::Pending | DeliveryStatus::Assigned => {},
        }
        Ok(transition)
    }

    async fn request_confirmation(&self, order: &Order, delivery: &Delivery) {
        let hours = self.config.auto_release_after.num_hours();
        let body = format!(
            "Your order {} has been delivered. Please confirm that you received it. If we don't hear from you within \
             {hours} hours, we'll assume all is well.",
            order.order_number
        );
        let buttons = [
            PromptButton::new(format!("{CONFIRM_DELIVERY_BUTTON}:{}", delivery.id), "Yes, I got it"),
            PromptButton::new(format!("{REPORT_ISSUE_BUTTON}:{}", delivery.id), "Report a problem"),
        ];
        if let Err(e) = self.messenger.prompt(&order.customer_id, &body, &buttons).await {
            let msg = format!("Could not ask the customer to confirm delivery {}. {e}", delivery.delivery_number);
            self.activity.log(NewActivity::new("notification", Severity::Medium, msg).for_order(order.id)).await;
        }
    }

    async fn announce_assignment(&self, order: &Order, delivery: &Delivery, rider: &Rider) {
        let body = format!(
            "New delivery {}. Pick up from {} and deliver to {}. Delivery fee: {}.",
            delivery.delivery_number, delivery.pickup_address, delivery.dropoff_address, delivery.delivery_fee
        );
        self.notify(order.id, &rider.phone, &body).await;
        let body = format!("Good news! {} is on the way to collect your order {}.", rider.name, order.order_number);
        self.notify(order.id, &order.customer_id, &body).await;
    }

    pub(crate) async fn announce_settlement(&self, delivery: &Delivery, record: &SettlementRecord) {
        let order_id = delivery.order_id;
        match self.db.fetch_merchant(record.escrow.merchant_id).await {
            Ok(Some(merchant)) => {
                let body = format!(
                    "Delivery {} is complete. A payout of {} is being processed for you.",
                    delivery.delivery_number, record.payout.amount
                );
                self.notify(order_id, &merchant.phone, &body).await;
            },
            Ok(None) => warn!("🛵️ Merchant #{} for order #{order_id} no longer exists", record.escrow.merchant_id),
            Err(e) => warn!("🛵️ Could not look up the merchant for order #{order_id}. {e}"),
        }
    }

    /// Sends a text, recording a failure in the activity log instead of returning it.
    async fn notify(&self, order_id: i64, recipient: &str, body: &str) {
        if let Err(e) = self.messenger.text(recipient, body).await {
            let msg = format!("Could not message {recipient}. {e}");
            self.activity.log(NewActivity::new("notification", Severity::Medium, msg).for_order(order_id)).await;
        }
    }
}
