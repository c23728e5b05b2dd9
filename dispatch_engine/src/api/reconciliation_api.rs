//! Reconciliation sweeps.
//!
//! Each sweep finds orders or deliveries that stopped making progress and pushes them along. Sweeps take `now` as an
//! argument so that they can be tested without waiting, and every item is processed on its own: one failure is
//! logged and counted, and the sweep moves on.
//!
//! In a multi-instance deployment, [`ReconciliationApi::run`] takes a lease on the sweep first, so only one instance
//! runs a given sweep at a time.
use std::{fmt::Display, time::Duration};

use chrono::{DateTime, Utc};
use log::*;
use serde::Serialize;

use crate::{
    api::{activity_api::ActivityApi, delivery_api::DeliveryApi, engine_config::EngineConfig, messenger::Messenger},
    db_types::{NewActivity, Severity},
    events::{EventProducers, OrderAnnulledEvent},
    traits::{LeaseManagement, LedgerError, LedgerStore, Notifier, PaymentGateway},
};

pub const STUCK_REASON: &str = "rider not responding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Sweep {
    PaymentTimeout,
    StockCleanup,
    StuckDeliveries,
    AutoRelease,
}

impl Sweep {
    pub const ALL: [Sweep; 4] = [Sweep::PaymentTimeout, Sweep::StockCleanup, Sweep::StuckDeliveries, Sweep::AutoRelease];

    pub fn name(&self) -> &'static str {
        match self {
            Sweep::PaymentTimeout => "payment_timeout",
            Sweep::StockCleanup => "stock_cleanup",
            Sweep::StuckDeliveries => "stuck_deliveries",
            Sweep::AutoRelease => "auto_release",
        }
    }

    /// How often the sweep runs
    pub fn interval(&self) -> Duration {
        match self {
            Sweep::PaymentTimeout => Duration::from_secs(5 * 60),
            Sweep::StockCleanup => Duration::from_secs(10 * 60),
            Sweep::StuckDeliveries => Duration::from_secs(15 * 60),
            Sweep::AutoRelease => Duration::from_secs(60 * 60),
        }
    }
}

impl Display for Sweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Items the sweep looked at
    pub candidates: usize,
    /// Items the sweep changed
    pub processed: usize,
    pub failed: usize,
}

impl Display for SweepReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} candidates, {} processed, {} failed", self.candidates, self.processed, self.failed)
    }
}

#[derive(Clone)]
pub struct ReconciliationApi<B, G, N> {
    db: B,
    deliveries: DeliveryApi<B, G, N>,
    messenger: Messenger<N>,
    activity: ActivityApi<B>,
    producers: EventProducers,
    config: EngineConfig,
}

impl<B, G, N> std::fmt::Debug for ReconciliationApi<B, G, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi")
    }
}

impl<B: Clone, G, N: Clone> ReconciliationApi<B, G, N> {
    pub fn new(db: B, gateway: G, notifier: N, producers: EventProducers, config: EngineConfig) -> Self {
        let messenger = Messenger::new(notifier.clone(), config.broadcast_delay);
        let deliveries = DeliveryApi::new(db.clone(), gateway, notifier, producers.clone(), config.clone());
        let activity = ActivityApi::new(db.clone(), producers.clone());
        Self { db, deliveries, messenger, activity, producers, config }
    }
}

impl<B, G, N> ReconciliationApi<B, G, N>
where
    B: LedgerStore,
    G: PaymentGateway,
    N: Notifier,
{
    /// Cancels orders whose payment window has passed.
    pub async fn expire_unpaid_orders(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let candidates = self.db.fetch_expired_unpaid_orders(now).await?;
        let mut report = SweepReport { candidates: candidates.len(), ..Default::default() };
        for order in candidates {
            match self.db.fail_payment(order.id, true).await {
                Ok(Some(expired)) => {
                    report.processed += 1;
                    debug!("🕰️ Order {} expired unpaid", expired.order_number);
                    let body = format!(
                        "Your order {} has been cancelled because we did not receive payment in time. You're welcome \
                         to place it again.",
                        expired.order_number
                    );
                    if let Err(e) = self.messenger.text(&expired.customer_id, &body).await {
                        let msg = format!("Could not tell the customer that order {} expired. {e}", expired.order_number);
                        self.activity.log(NewActivity::new("notification", Severity::Low, msg).for_order(order.id)).await;
                    }
                    self.producers.publish_order_annulled(OrderAnnulledEvent::new(expired, "payment window expired")).await;
                },
                // Paid or failed in the meantime
                Ok(None) => {},
                Err(e) => {
                    report.failed += 1;
                    warn!("🕰️ Could not expire order {}. {e}", order.order_number);
                },
            }
        }
        Ok(report)
    }

    /// Returns reserved stock held by expired or cancelled orders.
    pub async fn cleanup_reserved_stock(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let candidates = self.db.fetch_orders_holding_stock(now).await?;
        let mut report = SweepReport { candidates: candidates.len(), ..Default::default() };
        for order in candidates {
            match self.db.release_reserved_stock(order.id, now).await {
                Ok(Some(release)) => {
                    report.processed += 1;
                    let units = release.restored.iter().map(|i| i.quantity).sum::<i64>();
                    debug!(
                        "🕰️ Order {}: {units} units returned to stock{}",
                        release.order.order_number,
                        if release.expired { " (order expired)" } else { "" }
                    );
                    if release.expired {
                        let event = OrderAnnulledEvent::new(release.order, "payment window expired");
                        self.producers.publish_order_annulled(event).await;
                    }
                },
                Ok(None) => {},
                Err(e) => {
                    report.failed += 1;
                    warn!("🕰️ Could not release stock held by order {}. {e}", order.order_number);
                },
            }
        }
        Ok(report)
    }

    /// Reassigns deliveries that have sat in `ASSIGNED` for too long, then tries to find riders for deliveries that
    /// never got one.
    pub async fn reassign_stuck_deliveries(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let cutoff = now - self.config.stuck_assignment_after;
        let stuck = self.db.fetch_stuck_assignments(cutoff).await?;
        let waiting = self.db.fetch_unassigned_deliveries().await?;
        let mut report = SweepReport { candidates: stuck.len() + waiting.len(), ..Default::default() };
        for delivery in stuck {
            match self.deliveries.reassign_delivery(delivery.id, STUCK_REASON).await {
                Ok(Some(_)) => report.processed += 1,
                Ok(None) => {},
                Err(e) => {
                    report.failed += 1;
                    warn!("🕰️ Could not reassign delivery {}. {e}", delivery.delivery_number);
                },
            }
        }
        if !waiting.is_empty() {
            match self.deliveries.retry_pending_assignments().await {
                Ok(n) => report.processed += n,
                Err(e) => {
                    report.failed += 1;
                    warn!("🕰️ Could not retry pending assignments. {e}");
                },
            }
        }
        Ok(report)
    }

    /// Releases escrow for delivered orders that the customer confirmed, or that passed their auto-release deadline
    /// without a word from the customer.
    pub async fn auto_release_escrows(&self, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        let candidates = self.db.fetch_deliveries_due_for_release(now).await?;
        let mut report = SweepReport { candidates: candidates.len(), ..Default::default() };
        for delivery in candidates {
            if !delivery.customer_confirmed {
                if let Err(e) = self.db.confirm_delivery(delivery.id).await {
                    report.failed += 1;
                    warn!("🕰️ Could not mark delivery {} as confirmed. {e}", delivery.delivery_number);
                    continue;
                }
                debug!("🕰️ Delivery {} passed its confirmation deadline", delivery.delivery_number);
            }
            match self.deliveries.settlement().release_if_held(delivery.order_id).await {
                Ok(Some(record)) => {
                    report.processed += 1;
                    self.deliveries.announce_settlement(&delivery, &record).await;
                },
                Ok(None) => {},
                Err(e) => {
                    report.failed += 1;
                    let msg = format!("Auto-release for delivery {} failed. {e}", delivery.delivery_number);
                    self.activity.log(NewActivity::new("settlement", Severity::High, msg).for_order(delivery.order_id)).await;
                },
            }
        }
        Ok(report)
    }

    pub async fn run_sweep(&self, sweep: Sweep, now: DateTime<Utc>) -> Result<SweepReport, LedgerError> {
        match sweep {
            Sweep::PaymentTimeout => self.expire_unpaid_orders(now).await,
            Sweep::StockCleanup => self.cleanup_reserved_stock(now).await,
            Sweep::StuckDeliveries => self.reassign_stuck_deliveries(now).await,
            Sweep::AutoRelease => self.auto_release_escrows(now).await,
        }
    }
}

impl<B, G, N> ReconciliationApi<B, G, N>
where
    B: LedgerStore + LeaseManagement,
    G: PaymentGateway,
    N: Notifier,
{
    /// Runs `sweep` if this instance (`holder`) can take its lease. Returns `None` if another instance holds it.
    pub async fn run(&self, sweep: Sweep, holder: &str) -> Result<Option<SweepReport>, LedgerError> {
        if !self.db.try_acquire_lease(sweep.name(), holder, self.config.lease_ttl).await? {
            debug!("🕰️ {sweep} is running elsewhere. Skipping it.");
            return Ok(None);
        }
        let result = self.run_sweep(sweep, Utc::now()).await;
        if let Err(e) = self.db.release_lease(sweep.name(), holder).await {
            warn!("🕰️ Could not release the {sweep} lease. It will expire on its own. {e}");
        }
        let report = result?;
        if report.candidates > 0 {
            info!("🕰️ {sweep}: {report}");
        }
        Ok(Some(report))
    }
}
