//! In-memory store
//!
//! Behaves like the Postgres store for everything the ledger relies on:
//! exclusive row locks held until the transaction ends, writes invisible to
//! other callers until commit, and nothing applied on rollback or drop.
//! Ids come from counters that, like database sequences, are not rolled back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    Account, Movement, NewAccount, NewMovement, NewTransfer, PageRequest, Transfer,
    TransferStatus,
};

use super::{LedgerStore, LedgerTx, StoreError, StoreResult};

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    movements: BTreeMap<i64, Movement>,
    transfers: BTreeMap<i64, Transfer>,
    last_movement_id: i64,
    last_transfer_id: i64,
}

impl Tables {
    fn has_account(&self, id: Uuid) -> bool {
        self.accounts.contains_key(&id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
    Account(Uuid),
    Transfer(i64),
}

#[derive(Debug, Default)]
struct Shared {
    tables: Mutex<Tables>,
    row_locks: Mutex<HashMap<RowKey, Arc<RowMutex<()>>>>,
}

impl Shared {
    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Backend("table lock poisoned".to_string()))
    }

    fn row_lock(&self, key: RowKey) -> StoreResult<Arc<RowMutex<()>>> {
        let mut locks = self
            .row_locks
            .lock()
            .map_err(|_| StoreError::Backend("row lock table poisoned".to_string()))?;
        Ok(locks.entry(key).or_default().clone())
    }
}

/// In-memory ledger store.
///
/// Intended for tests and tooling. Cloning shares the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedgerStore {
    shared: Arc<Shared>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored movements across all accounts.
    pub fn movement_count(&self) -> StoreResult<usize> {
        Ok(self.shared.tables()?.movements.len())
    }

    /// Sum of all account balances.
    pub fn total_balance(&self) -> StoreResult<Decimal> {
        Ok(self.shared.tables()?.accounts.values().map(|a| a.balance).sum())
    }
}

fn page_of<T>(rows: Vec<T>, page: &PageRequest) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let limit = usize::try_from(page.limit).unwrap_or(0);
    (rows.into_iter().skip(offset).take(limit).collect(), total)
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(InMemoryLedgerTx {
            shared: self.shared.clone(),
            guards: HashMap::new(),
            accounts: HashMap::new(),
            created_accounts: HashSet::new(),
            movements: Vec::new(),
            transfers: HashMap::new(),
        }))
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self.shared.tables()?.accounts.get(&id).cloned())
    }

    async fn find_account_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Account>> {
        Ok(self
            .shared
            .tables()?
            .accounts
            .values()
            .find(|a| a.owner_id == owner_id)
            .cloned())
    }

    async fn find_movement(&self, id: i64) -> StoreResult<Option<Movement>> {
        Ok(self.shared.tables()?.movements.get(&id).cloned())
    }

    async fn movements_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Movement>, i64)> {
        let mut rows: Vec<Movement> = self
            .shared
            .tables()?
            .movements
            .values()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at).then(b.id.cmp(&a.id)));

        Ok(page_of(rows, page))
    }

    async fn find_transfer(&self, id: i64) -> StoreResult<Option<Transfer>> {
        Ok(self.shared.tables()?.transfers.get(&id).cloned())
    }

    async fn transfers_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Transfer>, i64)> {
        let mut rows: Vec<Transfer> = self
            .shared
            .tables()?
            .transfers
            .values()
            .filter(|t| t.involves(account_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.initiated_at.cmp(&a.initiated_at).then(b.id.cmp(&a.id)));

        Ok(page_of(rows, page))
    }
}

/// An open in-memory transaction.
///
/// Holds the row locks it acquired plus a private copy of every row it
/// touched. Dropping it releases the locks and discards the copies.
pub struct InMemoryLedgerTx {
    shared: Arc<Shared>,
    guards: HashMap<RowKey, OwnedMutexGuard<()>>,
    accounts: HashMap<Uuid, Account>,
    created_accounts: HashSet<Uuid>,
    movements: Vec<Movement>,
    transfers: HashMap<i64, Transfer>,
}

impl InMemoryLedgerTx {
    async fn acquire(&mut self, key: RowKey) -> StoreResult<()> {
        if self.guards.contains_key(&key) {
            return Ok(());
        }

        let row = self.shared.row_lock(key)?;
        let guard = row.lock_owned().await;
        self.guards.insert(key, guard);
        Ok(())
    }

    fn account_exists(&self, id: Uuid) -> StoreResult<bool> {
        Ok(self.accounts.contains_key(&id) || self.shared.tables()?.has_account(id))
    }
}

#[async_trait]
impl LedgerTx for InMemoryLedgerTx {
    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<Account> {
        if self.account_exists(account.id)? {
            return Err(StoreError::Conflict(format!("account {} already exists", account.id)));
        }

        let now = Utc::now();
        let row = Account {
            id: account.id,
            owner_id: account.owner_id,
            balance: Decimal::ZERO,
            currency: account.currency.clone(),
            created_at: now,
            updated_at: now,
        };

        self.acquire(RowKey::Account(row.id)).await?;
        self.accounts.insert(row.id, row.clone());
        self.created_accounts.insert(row.id);
        Ok(row)
    }

    async fn lock_account(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
        if let Some(account) = self.accounts.get(&id) {
            return Ok(Some(account.clone()));
        }

        self.acquire(RowKey::Account(id)).await?;
        let current = self.shared.tables()?.accounts.get(&id).cloned();
        match current {
            Some(account) => {
                self.accounts.insert(id, account.clone());
                Ok(Some(account))
            }
            None => {
                self.guards.remove(&RowKey::Account(id));
                Ok(None)
            }
        }
    }

    async fn write_balance(&mut self, id: Uuid, balance: Decimal) -> StoreResult<()> {
        let account = self.accounts.get_mut(&id).ok_or_else(|| {
            StoreError::Backend(format!("account {id} written without holding its row lock"))
        })?;

        account.balance = balance;
        account.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_movement(&mut self, movement: &NewMovement) -> StoreResult<Movement> {
        if !self.account_exists(movement.account_id)? {
            return Err(StoreError::Backend(format!(
                "movement references unknown account {}",
                movement.account_id
            )));
        }

        let id = {
            let mut tables = self.shared.tables()?;
            tables.last_movement_id += 1;
            tables.last_movement_id
        };

        let row = movement.clone().into_movement(id);
        self.movements.push(row.clone());
        Ok(row)
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> StoreResult<Transfer> {
        if transfer.from_account == transfer.to_account {
            return Err(StoreError::Backend(
                "transfer source and destination must differ".to_string(),
            ));
        }
        for account_id in [transfer.from_account, transfer.to_account] {
            if !self.account_exists(account_id)? {
                return Err(StoreError::Backend(format!(
                    "transfer references unknown account {account_id}"
                )));
            }
        }

        let id = {
            let mut tables = self.shared.tables()?;
            tables.last_transfer_id += 1;
            tables.last_transfer_id
        };

        self.acquire(RowKey::Transfer(id)).await?;
        let row = transfer.clone().into_transfer(id);
        self.transfers.insert(id, row.clone());
        Ok(row)
    }

    async fn lock_transfer(&mut self, id: i64) -> StoreResult<Option<Transfer>> {
        if let Some(transfer) = self.transfers.get(&id) {
            return Ok(Some(transfer.clone()));
        }

        self.acquire(RowKey::Transfer(id)).await?;
        let current = self.shared.tables()?.transfers.get(&id).cloned();
        match current {
            Some(transfer) => {
                self.transfers.insert(id, transfer.clone());
                Ok(Some(transfer))
            }
            None => {
                self.guards.remove(&RowKey::Transfer(id));
                Ok(None)
            }
        }
    }

    async fn write_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let transfer = self.transfers.get_mut(&id).ok_or_else(|| {
            StoreError::Backend(format!("transfer {id} written without holding its row lock"))
        })?;

        transfer.status = status;
        transfer.completed_at = completed_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let this = *self;
        let mut tables = this.shared.tables()?;

        for id in &this.created_accounts {
            let owner_id = this.accounts[id].owner_id;
            if tables.accounts.values().any(|a| a.owner_id == owner_id) {
                return Err(StoreError::Conflict(format!(
                    "owner {owner_id} already has an account"
                )));
            }
        }

        tables.accounts.extend(this.accounts);
        tables
            .movements
            .extend(this.movements.into_iter().map(|m| (m.id, m)));
        tables.transfers.extend(this.transfers);

        // Row guards drop with `this.guards` after the tables are updated.
        drop(tables);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        Ok(())
    }
}
