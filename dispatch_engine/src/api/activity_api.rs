use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{ActivityEntry, NewActivity, Severity},
    events::{EventProducers, OperationalAlertEvent},
    traits::{ActivityManagement, LedgerError},
};

/// The operational activity feed. Everything that goes wrong outside a financial transaction ends up here, and
/// `HIGH`/`CRITICAL` entries are also published as [`OperationalAlertEvent`]s.
#[derive(Clone)]
pub struct ActivityApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for ActivityApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ActivityApi")
    }
}

impl<B> ActivityApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> ActivityApi<B>
where B: ActivityManagement
{
    pub async fn record(&self, activity: NewActivity) -> Result<ActivityEntry, LedgerError> {
        let entry = self.db.record_activity(activity).await?;
        match entry.severity {
            Severity::Low => debug!("📋️ [{}] {}", entry.category, entry.message),
            Severity::Medium => info!("📋️ [{}] {}", entry.category, entry.message),
            Severity::High | Severity::Critical => warn!("📋️ [{}] {} {}", entry.category, entry.severity, entry.message),
        }
        if entry.severity.raises_alert() {
            self.producers.publish_alert(OperationalAlertEvent { entry: entry.clone() }).await;
        }
        Ok(entry)
    }

    /// Records the entry, logging (rather than returning) any failure to do so. Used on best-effort paths where there
    /// is nobody to report the error to.
    pub async fn log(&self, activity: NewActivity) {
        let message = activity.message.clone();
        if let Err(e) = self.record(activity).await {
            error!("📋️ Could not write to the activity log ({e}). The entry was: {message}");
        }
    }

    pub async fn recent(&self, limit: i64) -> Result<Vec<ActivityEntry>, LedgerError> {
        self.db.fetch_recent_activity(limit.clamp(1, 500)).await
    }

    pub async fn for_order(&self, order_id: i64) -> Result<Vec<ActivityEntry>, LedgerError> {
        self.db.fetch_activity_for_order(order_id).await
    }
}
