//! Idempotency cache backends.
//!
//! [`SqliteIdempotencyCache`] shares its keys between every instance that points at the same database.
//! [`MemoryIdempotencyCache`] is only safe for a single-instance deployment (and for tests).
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use log::*;

use crate::traits::{IdempotencyCache, LedgerError};

#[derive(Clone, Default)]
pub struct MemoryIdempotencyCache {
    keys: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl MemoryIdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, DateTime<Utc>>>, LedgerError> {
        self.keys.lock().map_err(|e| LedgerError::DatabaseError(format!("Idempotency cache lock is poisoned. {e}")))
    }

    /// The number of live keys
    pub fn len(&self) -> usize {
        let now = Utc::now();
        self.lock().map(|keys| keys.values().filter(|exp| **exp > now).count()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IdempotencyCache for MemoryIdempotencyCache {
    async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
        let now = Utc::now();
        let mut keys = self.lock()?;
        match keys.get(key) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                keys.insert(key.to_string(), now + ttl);
                if keys.len() > 10_000 {
                    keys.retain(|_, exp| *exp > now);
                }
                Ok(true)
            },
        }
    }

    async fn release(&self, key: &str) -> Result<(), LedgerError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

#[cfg(feature = "sqlite")]
pub use sqlite_cache::{IdempotencyBackend, SqliteIdempotencyCache};

#[cfg(feature = "sqlite")]
mod sqlite_cache {
    use super::*;
    use crate::{sqlite::db::idempotency, SqliteDatabase};

    /// Keeps idempotency keys in the `idempotency_keys` table.
    #[derive(Clone)]
    pub struct SqliteIdempotencyCache {
        db: SqliteDatabase,
    }

    impl SqliteIdempotencyCache {
        pub fn new(db: SqliteDatabase) -> Self {
            Self { db }
        }

        /// Removes keys that have expired. Returns the number of keys removed.
        pub async fn purge_expired(&self) -> Result<u64, LedgerError> {
            let mut conn = self.db.pool().acquire().await?;
            let removed = idempotency::purge_expired(Utc::now(), &mut conn).await?;
            if removed > 0 {
                debug!("🗃️ Purged {removed} expired idempotency keys");
            }
            Ok(removed)
        }
    }

    impl IdempotencyCache for SqliteIdempotencyCache {
        async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
            let mut conn = self.db.pool().acquire().await?;
            let claimed = idempotency::set_if_absent(key, ttl, Utc::now(), &mut conn).await?;
            trace!("🗃️ Idempotency key {key} claimed: {claimed}");
            Ok(claimed)
        }

        async fn release(&self, key: &str) -> Result<(), LedgerError> {
            let mut conn = self.db.pool().acquire().await?;
            idempotency::release(key, &mut conn).await?;
            Ok(())
        }
    }

    /// The cache chosen at start-up. Lets the server pick a backend from configuration without making every API
    /// type generic over the choice.
    #[derive(Clone)]
    pub enum IdempotencyBackend {
        Sqlite(SqliteIdempotencyCache),
        Memory(MemoryIdempotencyCache),
    }

    impl IdempotencyBackend {
        pub fn name(&self) -> &'static str {
            match self {
                Self::Sqlite(_) => "sqlite",
                Self::Memory(_) => "memory",
            }
        }

        pub async fn purge_expired(&self) -> Result<u64, LedgerError> {
            match self {
                Self::Sqlite(cache) => cache.purge_expired().await,
                Self::Memory(_) => Ok(0),
            }
        }
    }

    impl IdempotencyCache for IdempotencyBackend {
        async fn set_if_absent(&self, key: &str, ttl: Duration) -> Result<bool, LedgerError> {
            match self {
                Self::Sqlite(cache) => cache.set_if_absent(key, ttl).await,
                Self::Memory(cache) => cache.set_if_absent(key, ttl).await,
            }
        }

        async fn release(&self, key: &str) -> Result<(), LedgerError> {
            match self {
                Self::Sqlite(cache) => cache.release(key).await,
                Self::Memory(cache) => cache.release(key).await,
            }
        }
    }
}
