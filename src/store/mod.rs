//! Store module
//!
//! The relational store behind the ledger, consumed through two traits:
//! [`LedgerStore`] for plain reads and for opening transactions, and
//! [`LedgerTx`] for everything that writes. A transaction that is dropped
//! without [`LedgerTx::commit`] is rolled back by both backends.

mod error;
mod memory;
mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{
    Account, Movement, NewAccount, NewMovement, NewTransfer, PageRequest, Transfer,
    TransferStatus,
};

pub use error::StoreError;
pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Entry point to the relational store.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>>;

    async fn find_account_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Account>>;

    async fn find_movement(&self, id: i64) -> StoreResult<Option<Movement>>;

    /// Movements of one account, newest first, with the total row count.
    async fn movements_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Movement>, i64)>;

    async fn find_transfer(&self, id: i64) -> StoreResult<Option<Transfer>>;

    /// Transfers where the account is source or destination, newest first.
    async fn transfers_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Transfer>, i64)>;
}

/// An open store transaction.
#[async_trait]
pub trait LedgerTx: Send {
    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<Account>;

    /// Read an account under an exclusive row lock held until commit or
    /// rollback. Locking a row this transaction already holds returns its
    /// current (possibly uncommitted) state without blocking.
    async fn lock_account(&mut self, id: Uuid) -> StoreResult<Option<Account>>;

    /// Persist a new balance for an account locked by this transaction.
    async fn write_balance(&mut self, id: Uuid, balance: Decimal) -> StoreResult<()>;

    async fn insert_movement(&mut self, movement: &NewMovement) -> StoreResult<Movement>;

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> StoreResult<Transfer>;

    /// Read a transfer under an exclusive row lock.
    async fn lock_transfer(&mut self, id: i64) -> StoreResult<Option<Transfer>>;

    async fn write_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()>;

    async fn commit(self: Box<Self>) -> StoreResult<()>;

    async fn rollback(self: Box<Self>) -> StoreResult<()>;
}
