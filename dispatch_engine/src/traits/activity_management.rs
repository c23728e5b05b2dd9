use crate::{
    db_types::{ActivityEntry, NewActivity},
    traits::LedgerError,
};

#[allow(async_fn_in_trait)]
pub trait ActivityManagement: Clone {
    async fn record_activity(&self, activity: NewActivity) -> Result<ActivityEntry, LedgerError>;

    /// The most recent `limit` entries, newest first.
    async fn fetch_recent_activity(&self, limit: i64) -> Result<Vec<ActivityEntry>, LedgerError>;

    async fn fetch_activity_for_order(&self, order_id: i64) -> Result<Vec<ActivityEntry>, LedgerError>;
}
