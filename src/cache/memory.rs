//! Process-local balance cache

use async_trait::async_trait;
use cached::{Cached, TimedCache};
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use super::{BalanceCache, CacheError, CacheResult, DEFAULT_TTL};

/// Balance cache held in process memory with per-entry expiry.
///
/// Used when no Redis is configured, and in tests. Cloning shares entries.
#[derive(Clone)]
pub struct InMemoryBalanceCache {
    entries: Arc<Mutex<TimedCache<Uuid, Decimal>>>,
}

impl InMemoryBalanceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Arc::new(Mutex::new(TimedCache::with_lifespan(ttl.as_secs().max(1)))),
        }
    }

    fn entries(&self) -> CacheResult<std::sync::MutexGuard<'_, TimedCache<Uuid, Decimal>>> {
        self.entries
            .lock()
            .map_err(|_| CacheError::Backend("balance cache lock poisoned".to_string()))
    }
}

impl Default for InMemoryBalanceCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[async_trait]
impl BalanceCache for InMemoryBalanceCache {
    async fn get(&self, account_id: Uuid) -> CacheResult<Option<Decimal>> {
        Ok(self.entries()?.cache_get(&account_id).copied())
    }

    async fn set(&self, account_id: Uuid, balance: Decimal) -> CacheResult<()> {
        self.entries()?.cache_set(account_id, balance);
        Ok(())
    }

    async fn invalidate(&self, account_id: Uuid) -> CacheResult<()> {
        self.entries()?.cache_remove(&account_id);
        Ok(())
    }
}
