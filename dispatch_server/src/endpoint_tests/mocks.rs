use chrono::Duration;
use dispatch_engine::{IdempotencyCache, LedgerError};
use mockall::mock;

mock! {
    pub Cache {}
    impl Clone for Cache {
        fn clone(&self) -> Self;
    }
    impl IdempotencyCache for Cache {
        async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError>;
        async fn release(&self, key: &str) -> Result<(), LedgerError>;
    }
}
