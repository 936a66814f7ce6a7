//! Movement Handler
//!
//! Records single credits and debits and keeps the balance in step.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::BalanceCache;
use crate::domain::{Account, Movement, MovementType, NewMovement, PageRequest, Paginated};
use crate::error::{LedgerError, LedgerResult, ResultExt};
use crate::repository::{apply_balance_delta, AccountRepository, MovementRepository};
use crate::store::{LedgerStore, LedgerTx};

use super::{parse_amount, refresh_cached_balance, CreateMovementCommand};

/// How a single movement's balance update and ledger insert are committed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MovementWriteMode {
    /// Balance update and movement insert share one transaction.
    #[default]
    Atomic,
    /// Balance update commits first, then the movement is inserted on its
    /// own. A failure between the two leaves the balance changed with no
    /// matching ledger row.
    Sequential,
}

impl MovementWriteMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementWriteMode::Atomic => "atomic",
            MovementWriteMode::Sequential => "sequential",
        }
    }
}

impl fmt::Display for MovementWriteMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MovementWriteMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(MovementWriteMode::Atomic),
            "sequential" => Ok(MovementWriteMode::Sequential),
            other => Err(format!("expected 'atomic' or 'sequential', got '{other}'")),
        }
    }
}

/// Handler for single-account movements
#[derive(Clone)]
pub struct MovementHandler {
    store: Arc<dyn LedgerStore>,
    accounts: AccountRepository,
    movements: MovementRepository,
    cache: Arc<dyn BalanceCache>,
    mode: MovementWriteMode,
}

impl MovementHandler {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        cache: Arc<dyn BalanceCache>,
        mode: MovementWriteMode,
    ) -> Self {
        Self {
            accounts: AccountRepository::new(store.clone()),
            movements: MovementRepository::new(store.clone()),
            store,
            cache,
            mode,
        }
    }

    pub fn mode(&self) -> MovementWriteMode {
        self.mode
    }

    /// Record a credit or debit and apply it to the account balance.
    pub async fn create(&self, command: CreateMovementCommand) -> LedgerResult<Movement> {
        let movement_type = command
            .movement_type
            .parse::<MovementType>()
            .map_err(|e| LedgerError::bad_request(e.to_string()))?;
        let amount = parse_amount(&command.amount)?;

        let account = self
            .accounts
            .get_by_id(command.account_id)
            .await
            .context("failed to get account")?;

        let delta = movement_type.signed(&amount);
        let movement = NewMovement::new(account.id, amount, movement_type, command.description);

        let (updated, created) = match self.mode {
            MovementWriteMode::Atomic => self.write_atomic(&movement).await?,
            MovementWriteMode::Sequential => self.write_sequential(&movement).await?,
        };

        tracing::info!(
            account_id = %account.id,
            movement_id = created.id,
            movement_type = %movement_type,
            amount = %amount,
            delta = %delta,
            "Movement recorded"
        );

        refresh_cached_balance(self.cache.as_ref(), &updated).await;
        Ok(created)
    }

    async fn write_atomic(&self, movement: &NewMovement) -> LedgerResult<(Account, Movement)> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;

        match record_movement(tx.as_mut(), movement).await {
            Ok(written) => {
                tx.commit().await.context("failed to commit movement")?;
                Ok(written)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn write_sequential(&self, movement: &NewMovement) -> LedgerResult<(Account, Movement)> {
        let delta = movement.movement_type.signed(&movement.amount);
        let updated = self
            .accounts
            .update_balance(movement.account_id, delta)
            .await
            .context("failed to update account balance")?;

        match self.movements.create(movement).await {
            Ok(created) => Ok((updated, created)),
            Err(err) => {
                tracing::error!(
                    account_id = %movement.account_id,
                    delta = %delta,
                    error = %err,
                    "Balance updated but movement insert failed"
                );
                // The balance change is already committed.
                refresh_cached_balance(self.cache.as_ref(), &updated).await;
                Err(err)
            }
        }
    }

    pub async fn get_by_id(&self, id: i64) -> LedgerResult<Movement> {
        self.movements.get_by_id(id).await
    }

    /// Paginated movements of an account, most recent first.
    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> LedgerResult<Paginated<Movement>> {
        self.accounts
            .get_by_id(account_id)
            .await
            .context("failed to get account")?;

        let request = PageRequest::new(page, limit);
        let (movements, total) = self
            .movements
            .get_by_account_id(account_id, &request)
            .await?;

        Ok(Paginated::new(movements, &request, total))
    }
}

async fn record_movement(
    tx: &mut dyn LedgerTx,
    movement: &NewMovement,
) -> LedgerResult<(Account, Movement)> {
    let delta = movement.movement_type.signed(&movement.amount);
    let updated = apply_balance_delta(tx, movement.account_id, delta)
        .await
        .context("failed to update account balance")?;

    let created = tx
        .insert_movement(movement)
        .await
        .context("failed to create movement")?;

    Ok((updated, created))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_mode_parse() {
        assert_eq!("atomic".parse::<MovementWriteMode>(), Ok(MovementWriteMode::Atomic));
        assert_eq!(
            " Sequential ".parse::<MovementWriteMode>(),
            Ok(MovementWriteMode::Sequential)
        );
        assert!("eventual".parse::<MovementWriteMode>().is_err());
        assert_eq!(MovementWriteMode::default(), MovementWriteMode::Atomic);
    }
}
