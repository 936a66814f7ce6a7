//! Balance cache
//!
//! A read-through copy of account balances keyed by account id. The cache is
//! never authoritative: every failure here is logged by the caller and the
//! operation carries on against the store.

mod memory;
mod redis_cache;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::time::Duration;
use uuid::Uuid;

pub use self::memory::InMemoryBalanceCache;
pub use self::redis_cache::RedisBalanceCache;

/// Default time-to-live of a cached balance
pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

/// Cache key of an account balance.
pub fn balance_key(account_id: Uuid) -> String {
    format!("acct:balance:{account_id}")
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("cached value for {key} is not a decimal: {value}")]
    Parse { key: String, value: String },

    #[error("cache backend error: {0}")]
    Backend(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

#[async_trait]
pub trait BalanceCache: Send + Sync {
    /// Cached balance, `None` on a miss or after expiry.
    async fn get(&self, account_id: Uuid) -> CacheResult<Option<Decimal>>;

    async fn set(&self, account_id: Uuid, balance: Decimal) -> CacheResult<()>;

    async fn invalidate(&self, account_id: Uuid) -> CacheResult<()>;
}
