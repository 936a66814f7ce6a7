//! Ledger
//!
//! Wires one store and one balance cache into the three handlers.

use std::sync::Arc;

use crate::cache::{BalanceCache, CacheError, InMemoryBalanceCache, RedisBalanceCache};
use crate::config::Config;
use crate::db;
use crate::handlers::{AccountHandler, MovementHandler, MovementWriteMode, TransferHandler};
use crate::store::{InMemoryLedgerStore, LedgerStore, PgLedgerStore};

/// Errors raised while assembling a ledger from configuration
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("balance cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("database schema is incomplete, run migrations")]
    SchemaIncomplete,
}

/// Account, movement and transfer operations over a shared store and cache
#[derive(Clone)]
pub struct Ledger {
    pub accounts: AccountHandler,
    pub movements: MovementHandler,
    pub transfers: TransferHandler,
}

impl Ledger {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn BalanceCache>,
        movement_mode: MovementWriteMode,
    ) -> Self {
        Self {
            accounts: AccountHandler::new(store.clone(), cache.clone()),
            movements: MovementHandler::new(store.clone(), cache.clone(), movement_mode),
            transfers: TransferHandler::new(store, cache),
        }
    }

    /// Connect to Postgres (and Redis when configured) and verify the schema.
    pub async fn connect(config: &Config) -> Result<Self, ConnectError> {
        tracing::info!("Connecting to database...");
        let pool = db::connect(config).await?;
        db::verify_connection(&pool).await?;

        if !db::check_schema(&pool).await? {
            return Err(ConnectError::SchemaIncomplete);
        }
        tracing::info!("Database connected successfully");

        let cache: Arc<dyn BalanceCache> = match &config.redis_url {
            Some(url) => Arc::new(RedisBalanceCache::connect(url, config.balance_cache_ttl).await?),
            None => {
                tracing::info!("REDIS_URL not set, using in-process balance cache");
                Arc::new(InMemoryBalanceCache::new(config.balance_cache_ttl))
            }
        };

        let ledger = Self::new(
            Arc::new(PgLedgerStore::new(pool)),
            cache,
            config.movement_write_mode,
        );
        tracing::info!(mode = %ledger.movements.mode(), "Movement write mode");

        Ok(ledger)
    }

    /// Ledger over a fresh in-memory store and cache.
    pub fn in_memory() -> Self {
        Self::with_store(InMemoryLedgerStore::new())
    }

    /// Ledger over an existing in-memory store, so callers can inspect it.
    pub fn with_store(store: InMemoryLedgerStore) -> Self {
        Self::new(
            Arc::new(store),
            Arc::new(InMemoryBalanceCache::default()),
            MovementWriteMode::default(),
        )
    }
}
