//! Account Handler
//!
//! Account opening and cache-first balance reads.

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::BalanceCache;
use crate::domain::{Account, NewAccount};
use crate::error::LedgerResult;
use crate::repository::AccountRepository;
use crate::store::LedgerStore;

use super::refresh_cached_balance;

/// Handler for account reads and account opening
#[derive(Clone)]
pub struct AccountHandler {
    accounts: AccountRepository,
    cache: Arc<dyn BalanceCache>,
}

impl AccountHandler {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            accounts: AccountRepository::new(store),
            cache,
        }
    }

    /// Open the single account of an owner, in `currency` or the default.
    pub async fn open_account(&self, owner_id: Uuid, currency: Option<&str>) -> LedgerResult<Account> {
        let mut account = NewAccount::new(owner_id);
        if let Some(currency) = currency {
            account = account.with_currency(currency);
        }

        let account = self.accounts.create(&account).await?;
        refresh_cached_balance(self.cache.as_ref(), &account).await;
        Ok(account)
    }

    pub async fn get_account(&self, account_id: Uuid) -> LedgerResult<Account> {
        self.accounts.get_by_id(account_id).await
    }

    pub async fn get_account_by_owner(&self, owner_id: Uuid) -> LedgerResult<Account> {
        self.accounts.get_by_owner(owner_id).await
    }

    /// Current balance, from the cache when possible.
    ///
    /// Cache misses and cache errors fall back to the store, then repopulate
    /// the cache.
    pub async fn get_balance(&self, account_id: Uuid) -> LedgerResult<Decimal> {
        match self.cache.get(account_id).await {
            Ok(Some(balance)) => {
                tracing::debug!(account_id = %account_id, "Balance cache hit");
                return Ok(balance);
            }
            Ok(None) => tracing::debug!(account_id = %account_id, "Balance cache miss"),
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "Balance cache read failed")
            }
        }

        let account = self.accounts.get_by_id(account_id).await?;
        refresh_cached_balance(self.cache.as_ref(), &account).await;

        Ok(account.balance)
    }
}
