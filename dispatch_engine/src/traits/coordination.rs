use chrono::Duration;

use crate::traits::LedgerError;

/// A key-value store with an atomic "set if absent, with expiry" primitive, used to deduplicate externally delivered
/// events.
#[allow(async_fn_in_trait)]
pub trait IdempotencyCache: Clone {
    /// Atomically claims `key` for `ttl`. Returns `true` if the key was absent (or had expired) and is now claimed by
    /// the caller, and `false` if someone else holds it. There is no window between the check and the set.
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError>;

    /// Gives up a claim, so that the next delivery of the same event is processed.
    async fn release(&self, key: &str) -> Result<(), LedgerError>;
}

/// Named, expiring leader leases. A sweep only runs on the instance that holds its lease.
#[allow(async_fn_in_trait)]
pub trait LeaseManagement: Clone {
    /// Acquires (or renews) the lease `name` for `holder`. Fails (returns `false`) if another holder has an unexpired
    /// lease.
    async fn try_acquire_lease(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, LedgerError>;

    async fn release_lease(&self, name: &str, holder: &str) -> Result<(), LedgerError>;
}
