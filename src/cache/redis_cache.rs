//! Redis-backed balance cache

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use super::{balance_key, BalanceCache, CacheError, CacheResult};

/// Balance cache stored in Redis as decimal strings with `SET ... EX`.
#[derive(Clone)]
pub struct RedisBalanceCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisBalanceCache {
    /// Connect to Redis. The connection manager reconnects on its own after
    /// the initial connection succeeds.
    pub async fn connect(redis_url: &str, ttl: Duration) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;

        tracing::info!(ttl_secs = ttl.as_secs(), "Connected to Redis balance cache");

        Ok(Self { conn, ttl })
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}

#[async_trait]
impl BalanceCache for RedisBalanceCache {
    async fn get(&self, account_id: Uuid) -> CacheResult<Option<Decimal>> {
        let key = balance_key(account_id);
        let mut conn = self.conn.clone();

        let value: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;

        value
            .map(|raw| {
                Decimal::from_str(&raw).map_err(|_| CacheError::Parse {
                    key: key.clone(),
                    value: raw,
                })
            })
            .transpose()
    }

    async fn set(&self, account_id: Uuid, balance: Decimal) -> CacheResult<()> {
        let mut conn = self.conn.clone();

        redis::cmd("SET")
            .arg(balance_key(account_id))
            .arg(balance.to_string())
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }

    async fn invalidate(&self, account_id: Uuid) -> CacheResult<()> {
        let mut conn = self.conn.clone();

        redis::cmd("DEL")
            .arg(balance_key(account_id))
            .query_async::<_, ()>(&mut conn)
            .await?;

        Ok(())
    }
}
