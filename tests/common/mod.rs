//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use bank_ledger::domain::{
    Account, Movement, MovementType, NewAccount, NewMovement, NewTransfer, PageRequest, Transfer,
    TransferStatus,
};
use bank_ledger::handlers::CreateMovementCommand;
use bank_ledger::store::{InMemoryLedgerStore, LedgerStore, LedgerTx, StoreError, StoreResult};
use bank_ledger::Ledger;

/// Connect to the test database and empty the ledger tables.
///
/// Returns `None` when `DATABASE_URL` is not set, so Postgres tests can skip.
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    assert!(
        bank_ledger::db::check_schema(&pool).await.unwrap(),
        "run migrations/001_ledger_schema.sql first"
    );

    sqlx::query("TRUNCATE TABLE movements, transfers, accounts RESTART IDENTITY CASCADE")
        .execute(&pool)
        .await
        .expect("Failed to clean up DB");

    Some(pool)
}

/// Open an account and credit it with `balance`.
pub async fn funded_account(ledger: &Ledger, balance: &str) -> Account {
    let account = ledger
        .accounts
        .open_account(Uuid::new_v4(), None)
        .await
        .expect("Failed to open account");

    ledger
        .movements
        .create(CreateMovementCommand::new(account.id, balance, "credit").with_description("seed"))
        .await
        .expect("Failed to fund account");

    ledger.accounts.get_account(account.id).await.unwrap()
}

/// Writes that [`FaultyStore`] transactions should refuse
#[derive(Debug, Default)]
pub struct Faults {
    balance_writes: Mutex<HashSet<Uuid>>,
    status_writes: Mutex<HashSet<&'static str>>,
    movement_inserts: Mutex<HashSet<&'static str>>,
}

impl Faults {
    pub fn fail_balance_write(&self, account_id: Uuid) {
        self.balance_writes.lock().unwrap().insert(account_id);
    }

    pub fn fail_status_write(&self, status: TransferStatus) {
        self.status_writes.lock().unwrap().insert(status.as_str());
    }

    pub fn fail_movement_insert(&self, movement_type: MovementType) {
        self.movement_inserts.lock().unwrap().insert(movement_type.as_str());
    }

    pub fn clear(&self) {
        self.balance_writes.lock().unwrap().clear();
        self.status_writes.lock().unwrap().clear();
        self.movement_inserts.lock().unwrap().clear();
    }

    fn balance_write_fails(&self, account_id: Uuid) -> bool {
        self.balance_writes.lock().unwrap().contains(&account_id)
    }

    fn status_write_fails(&self, status: TransferStatus) -> bool {
        self.status_writes.lock().unwrap().contains(status.as_str())
    }

    fn movement_insert_fails(&self, movement_type: MovementType) -> bool {
        self.movement_inserts.lock().unwrap().contains(movement_type.as_str())
    }
}

fn injected(what: &str) -> StoreError {
    StoreError::Backend(format!("injected failure: {what}"))
}

/// Store whose transactions fail on selected writes. Wraps an in-memory store
/// unless built with [`FaultyStore::wrapping`].
#[derive(Clone, Default)]
pub struct FaultyStore<S = InMemoryLedgerStore> {
    pub inner: S,
    pub faults: Arc<Faults>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: LedgerStore> FaultyStore<S> {
    pub fn wrapping(inner: S) -> Self {
        Self {
            inner,
            faults: Arc::default(),
        }
    }
}

#[async_trait]
impl<S: LedgerStore> LedgerStore for FaultyStore<S> {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        Ok(Box::new(FaultyTx {
            inner: self.inner.begin().await?,
            faults: self.faults.clone(),
        }))
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        self.inner.find_account(id).await
    }

    async fn find_account_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Account>> {
        self.inner.find_account_by_owner(owner_id).await
    }

    async fn find_movement(&self, id: i64) -> StoreResult<Option<Movement>> {
        self.inner.find_movement(id).await
    }

    async fn movements_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Movement>, i64)> {
        self.inner.movements_for_account(account_id, page).await
    }

    async fn find_transfer(&self, id: i64) -> StoreResult<Option<Transfer>> {
        self.inner.find_transfer(id).await
    }

    async fn transfers_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Transfer>, i64)> {
        self.inner.transfers_for_account(account_id, page).await
    }
}

pub struct FaultyTx {
    inner: Box<dyn LedgerTx>,
    faults: Arc<Faults>,
}

#[async_trait]
impl LedgerTx for FaultyTx {
    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<Account> {
        self.inner.insert_account(account).await
    }

    async fn lock_account(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
        self.inner.lock_account(id).await
    }

    async fn write_balance(&mut self, id: Uuid, balance: Decimal) -> StoreResult<()> {
        if self.faults.balance_write_fails(id) {
            return Err(injected("balance write"));
        }
        self.inner.write_balance(id, balance).await
    }

    async fn insert_movement(&mut self, movement: &NewMovement) -> StoreResult<Movement> {
        if self.faults.movement_insert_fails(movement.movement_type) {
            return Err(injected("movement insert"));
        }
        self.inner.insert_movement(movement).await
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> StoreResult<Transfer> {
        self.inner.insert_transfer(transfer).await
    }

    async fn lock_transfer(&mut self, id: i64) -> StoreResult<Option<Transfer>> {
        self.inner.lock_transfer(id).await
    }

    async fn write_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        if self.faults.status_write_fails(status) {
            return Err(injected("status write"));
        }
        self.inner.write_transfer_status(id, status, completed_at).await
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.inner.rollback().await
    }
}
