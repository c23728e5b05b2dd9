//! Routes engine events to the people watching.
//!
//! Operational alerts go to the live admin feed straight away, and are also collected into one text message per
//! batch window for the on-call phones in `DSP_ADMIN_ALERT_RECIPIENTS`. Delivery status changes go to the
//! deliveries feed.
use std::time::Duration;

use dispatch_engine::{
    api::messenger::Messenger,
    db_types::ActivityEntry,
    events::{DeliveryStatusEvent, EventHooks, OperationalAlertEvent},
    Notifier,
};
use log::*;
use serde_json::json;
use tokio::{sync::mpsc, time::Instant};

use crate::connections::{ConnectionRegistry, ALERTS_TOPIC, DELIVERIES_TOPIC};

/// At most this many alerts are spelled out in one text message
const MAX_ALERTS_PER_MESSAGE: usize = 10;
const ALERT_QUEUE_SIZE: usize = 256;

/// Builds the hooks that feed the live connections, plus a queue for the batched text alerts if `batch` is given.
pub fn create_event_hooks(registry: ConnectionRegistry, batch: Option<mpsc::Sender<ActivityEntry>>) -> EventHooks {
    let mut hooks = EventHooks::default();
    let alert_registry = registry.clone();
    hooks.on_alert(move |ev: OperationalAlertEvent| {
        let registry = alert_registry.clone();
        let batch = batch.clone();
        Box::pin(async move {
            let payload = json!({ "type": "alert", "entry": ev.entry }).to_string();
            let reached = registry.broadcast(ALERTS_TOPIC, &payload).await;
            debug!("📬️ Alert #{} sent to {reached} live connections", ev.entry.id);
            if let Some(batch) = batch {
                if let Err(e) = batch.try_send(ev.entry) {
                    warn!("📬️ The alert message queue is full or closed. {e}");
                }
            }
        })
    });
    hooks.on_delivery_status(move |ev: DeliveryStatusEvent| {
        let registry = registry.clone();
        Box::pin(async move {
            let payload = json!({ "type": "delivery", "from": ev.from, "delivery": ev.delivery }).to_string();
            registry.broadcast(DELIVERIES_TOPIC, &payload).await;
        })
    });
    hooks
}

pub fn alert_queue() -> (mpsc::Sender<ActivityEntry>, mpsc::Receiver<ActivityEntry>) {
    mpsc::channel(ALERT_QUEUE_SIZE)
}

/// Runs the alert batcher until every queue sender is dropped. Spawn it; do not await it on a request path.
///
/// The first alert opens a batch. Everything that arrives within `window` joins it, and the batch is then sent as a
/// single message to each recipient.
pub async fn run_alert_batcher<N: Notifier>(
    mut queue: mpsc::Receiver<ActivityEntry>,
    messenger: Messenger<N>,
    recipients: Vec<String>,
    window: Duration,
) {
    info!("📋️ Alert batcher started for {} recipients", recipients.len());
    while let Some(first) = queue.recv().await {
        let mut batch = vec![first];
        let deadline = Instant::now() + window;
        let mut closed = false;
        loop {
            match tokio::time::timeout_at(deadline, queue.recv()).await {
                Ok(Some(entry)) => batch.push(entry),
                Ok(None) => {
                    closed = true;
                    break;
                },
                Err(_) => break,
            }
        }
        let message = format_alert_batch(&batch);
        let failed = messenger.broadcast(&recipients, &message).await;
        for (recipient, e) in failed {
            error!("📋️ Could not send {} alerts to {recipient}. {e}", batch.len());
        }
        if closed {
            break;
        }
    }
    info!("📋️ Alert batcher has shut down");
}

pub fn format_alert_batch(entries: &[ActivityEntry]) -> String {
    let mut message = match entries.len() {
        1 => "🚨 1 new alert".to_string(),
        n => format!("🚨 {n} new alerts"),
    };
    for entry in entries.iter().take(MAX_ALERTS_PER_MESSAGE) {
        message.push_str(&format!("\n• [{}] {}: {}", entry.severity, entry.category, entry.message));
        if let Some(order_id) = entry.order_id {
            message.push_str(&format!(" (order #{order_id})"));
        }
    }
    if entries.len() > MAX_ALERTS_PER_MESSAGE {
        message.push_str(&format!("\n…and {} more. See the activity log.", entries.len() - MAX_ALERTS_PER_MESSAGE));
    }
    message
}
