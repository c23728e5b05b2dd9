use std::time::Duration;

use dispatch_engine::{api::reconciliation_api::Sweep, IdempotencyBackend, ReconciliationApi, SqliteDatabase};
use dispatch_gateways::{PaystackClient, WhatsAppClient};
use log::*;
use tokio::task::JoinHandle;

pub type SweepApi = ReconciliationApi<SqliteDatabase, PaystackClient, WhatsAppClient>;

const IDEMPOTENCY_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Starts one worker per reconciliation sweep. Do not await the returned JoinHandles, as they run indefinitely.
///
/// Each tick only runs the sweep if this instance (`holder`) can take the sweep's lease, so several instances can run
/// the workers side by side.
pub fn start_sweep_workers(api: SweepApi, holder: String) -> Vec<JoinHandle<()>> {
    Sweep::ALL.iter().map(|sweep| start_sweep_worker(api.clone(), *sweep, holder.clone())).collect()
}

fn start_sweep_worker(api: SweepApi, sweep: Sweep, holder: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(sweep.interval());
        info!("🕰️ {sweep} worker started. It runs every {}s", sweep.interval().as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running the {sweep} sweep");
            match api.run(sweep, &holder).await {
                Ok(Some(report)) => debug!("🕰️ {sweep} finished. {report}"),
                Ok(None) => trace!("🕰️ {sweep} was skipped by {holder}"),
                Err(e) => error!("🕰️ Error running the {sweep} sweep: {e}"),
            }
        }
    })
}

/// Removes expired webhook idempotency keys once an hour.
pub fn start_idempotency_purge_worker(cache: IdempotencyBackend) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(IDEMPOTENCY_PURGE_INTERVAL);
        info!("🕰️ Idempotency key purge worker started for the {} backend", cache.name());
        loop {
            timer.tick().await;
            match cache.purge_expired().await {
                Ok(0) => trace!("🕰️ No expired idempotency keys"),
                Ok(n) => info!("🕰️ Purged {n} expired idempotency keys"),
                Err(e) => error!("🕰️ Error purging idempotency keys: {e}"),
            }
        }
    })
}
