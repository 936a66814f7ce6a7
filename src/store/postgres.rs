//! PostgreSQL store
//!
//! Row locks are `SELECT ... FOR NO KEY UPDATE`. Inserting a movement or a
//! transfer takes `FOR KEY SHARE` on the referenced accounts through the
//! foreign keys, and a plain `FOR UPDATE` would block on it. Balance and status
//! writes never touch key columns, so the weaker lock is enough. Postgres
//! re-grants a lock the transaction already holds, so `lock_account` is
//! re-entrant.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::{
    Account, Movement, NewAccount, NewMovement, NewTransfer, PageRequest, Transfer,
    TransferStatus,
};

use super::{LedgerStore, LedgerTx, StoreError, StoreResult};

const ACCOUNT_COLUMNS: &str = "id, owner_id, balance, currency, created_at, updated_at";
const MOVEMENT_COLUMNS: &str =
    "id, account_id, amount, type AS movement_type, description, occurred_at";
const TRANSFER_COLUMNS: &str =
    "id, from_account, to_account, amount, status, initiated_at, completed_at";

#[derive(Debug, sqlx::FromRow)]
struct MovementRow {
    id: i64,
    account_id: Uuid,
    amount: Decimal,
    movement_type: String,
    description: String,
    occurred_at: DateTime<Utc>,
}

impl TryFrom<MovementRow> for Movement {
    type Error = StoreError;

    fn try_from(row: MovementRow) -> Result<Self, Self::Error> {
        let movement_type = row
            .movement_type
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("movement {}: {}", row.id, e)))?;

        Ok(Movement {
            id: row.id,
            account_id: row.account_id,
            amount: row.amount,
            movement_type,
            description: row.description,
            occurred_at: row.occurred_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransferRow {
    id: i64,
    from_account: Uuid,
    to_account: Uuid,
    amount: Decimal,
    status: String,
    initiated_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TransferRow> for Transfer {
    type Error = StoreError;

    fn try_from(row: TransferRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("transfer {}: {}", row.id, e)))?;

        Ok(Transfer {
            id: row.id,
            from_account: row.from_account,
            to_account: row.to_account,
            amount: row.amount,
            status,
            initiated_at: row.initiated_at,
            completed_at: row.completed_at,
        })
    }
}

fn lock_account_sql() -> String {
    format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR NO KEY UPDATE")
}

fn lock_transfer_sql() -> String {
    format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1 FOR NO KEY UPDATE")
}

fn into_movements(rows: Vec<MovementRow>) -> StoreResult<Vec<Movement>> {
    rows.into_iter().map(Movement::try_from).collect()
}

fn into_transfers(rows: Vec<TransferRow>) -> StoreResult<Vec<Transfer>> {
    rows.into_iter().map(Transfer::try_from).collect()
}

/// Ledger store backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgLedgerStore {
    pool: PgPool,
}

impl PgLedgerStore {
    /// Create a new PgLedgerStore with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl LedgerStore for PgLedgerStore {
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.pool.begin().await.map_err(StoreError::from_sqlx)?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn find_account(&self, id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn find_account_by_owner(&self, owner_id: Uuid) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE owner_id = $1");
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(account)
    }

    async fn find_movement(&self, id: i64) -> StoreResult<Option<Movement>> {
        let sql = format!("SELECT {MOVEMENT_COLUMNS} FROM movements WHERE id = $1");
        sqlx::query_as::<_, MovementRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Movement::try_from)
            .transpose()
    }

    async fn movements_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Movement>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM movements WHERE account_id = $1")
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            r#"
            SELECT {MOVEMENT_COLUMNS}
            FROM movements
            WHERE account_id = $1
            ORDER BY occurred_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(account_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((into_movements(rows)?, total))
    }

    async fn find_transfer(&self, id: i64) -> StoreResult<Option<Transfer>> {
        let sql = format!("SELECT {TRANSFER_COLUMNS} FROM transfers WHERE id = $1");
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(Transfer::try_from)
            .transpose()
    }

    async fn transfers_for_account(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> StoreResult<(Vec<Transfer>, i64)> {
        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM transfers WHERE from_account = $1 OR to_account = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {TRANSFER_COLUMNS}
            FROM transfers
            WHERE from_account = $1 OR to_account = $1
            ORDER BY initiated_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#
        );
        let rows = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(account_id)
            .bind(page.limit)
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((into_transfers(rows)?, total))
    }
}

/// An open PostgreSQL transaction. sqlx rolls back on drop.
pub struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn insert_account(&mut self, account: &NewAccount) -> StoreResult<Account> {
        let sql = format!(
            r#"
            INSERT INTO accounts (id, owner_id, balance, currency)
            VALUES ($1, $2, 0, $3)
            RETURNING {ACCOUNT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Account>(&sql)
            .bind(account.id)
            .bind(account.owner_id)
            .bind(&account.currency)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(StoreError::from_sqlx)
    }

    async fn lock_account(&mut self, id: Uuid) -> StoreResult<Option<Account>> {
        let sql = lock_account_sql();
        let account = sqlx::query_as::<_, Account>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(account)
    }

    async fn write_balance(&mut self, id: Uuid, balance: Decimal) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE accounts
            SET balance = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(balance)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Backend(format!(
                "balance update touched no row for account {id}"
            )));
        }

        Ok(())
    }

    async fn insert_movement(&mut self, movement: &NewMovement) -> StoreResult<Movement> {
        let sql = format!(
            r#"
            INSERT INTO movements (account_id, amount, type, description, occurred_at)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {MOVEMENT_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, MovementRow>(&sql)
            .bind(movement.account_id)
            .bind(movement.amount.value())
            .bind(movement.movement_type.as_str())
            .bind(&movement.description)
            .bind(movement.occurred_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        Movement::try_from(row)
    }

    async fn insert_transfer(&mut self, transfer: &NewTransfer) -> StoreResult<Transfer> {
        let sql = format!(
            r#"
            INSERT INTO transfers (from_account, to_account, amount, status, initiated_at)
            VALUES ($1, $2, $3, 'pending', $4)
            RETURNING {TRANSFER_COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, TransferRow>(&sql)
            .bind(transfer.from_account)
            .bind(transfer.to_account)
            .bind(transfer.amount.value())
            .bind(transfer.initiated_at)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(StoreError::from_sqlx)?;

        Transfer::try_from(row)
    }

    async fn lock_transfer(&mut self, id: i64) -> StoreResult<Option<Transfer>> {
        let sql = lock_transfer_sql();
        sqlx::query_as::<_, TransferRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?
            .map(Transfer::try_from)
            .transpose()
    }

    async fn write_transfer_status(
        &mut self,
        id: i64,
        status: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE transfers
            SET status = $2, completed_at = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(completed_at)
        .execute(&mut *self.tx)
        .await?
        .rows_affected();

        if rows_affected == 0 {
            return Err(StoreError::Backend(format!(
                "status update touched no row for transfer {id}"
            )));
        }

        Ok(())
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_locks_leave_key_share_compatible() {
        for sql in [lock_account_sql(), lock_transfer_sql()] {
            assert!(sql.ends_with("FOR NO KEY UPDATE"), "{sql}");
        }
    }
}
