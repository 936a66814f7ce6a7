//! Account Repository
//!
//! Owns account rows and the locked read-modify-write balance update.

use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Account, NewAccount};
use crate::error::{LedgerError, LedgerResult, ResultExt};
use crate::store::{LedgerStore, LedgerTx, StoreError};

/// Repository for account rows
#[derive(Clone)]
pub struct AccountRepository {
    store: Arc<dyn LedgerStore>,
}

impl AccountRepository {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Open an account with a zero balance.
    pub async fn create(&self, account: &NewAccount) -> LedgerResult<Account> {
        if !account.has_valid_currency() {
            return Err(LedgerError::bad_request(format!(
                "invalid currency code '{}'",
                account.currency
            )));
        }

        let mut tx = self.store.begin().await.context("failed to begin transaction")?;
        let created = tx
            .insert_account(account)
            .await
            .map_err(|e| owner_conflict(account, "failed to create account", e))?;
        tx.commit()
            .await
            .map_err(|e| owner_conflict(account, "failed to commit account creation", e))?;

        tracing::info!(account_id = %created.id, owner_id = %created.owner_id, "Account opened");
        Ok(created)
    }

    pub async fn get_by_id(&self, id: Uuid) -> LedgerResult<Account> {
        self.store
            .find_account(id)
            .await
            .context("failed to get account by ID")?
            .ok_or_else(|| LedgerError::account_not_found(id))
    }

    pub async fn get_by_owner(&self, owner_id: Uuid) -> LedgerResult<Account> {
        self.store
            .find_account_by_owner(owner_id)
            .await
            .context("failed to get account by owner ID")?
            .ok_or_else(|| LedgerError::NotFound {
                entity: "account",
                id: format!("owner {owner_id}"),
            })
    }

    /// Apply a signed balance delta in its own transaction.
    ///
    /// Returns the account as committed. Rejects with `InsufficientFunds`
    /// (and changes nothing) when the balance would go negative.
    pub async fn update_balance(&self, id: Uuid, delta: Decimal) -> LedgerResult<Account> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;

        match apply_balance_delta(tx.as_mut(), id, delta).await {
            Ok(account) => {
                tx.commit().await.context("failed to commit balance update")?;
                Ok(account)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(account_id = %id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// A second account for the same owner is the caller's mistake.
fn owner_conflict(account: &NewAccount, context: &'static str, err: StoreError) -> LedgerError {
    match err {
        StoreError::Conflict(_) => LedgerError::bad_request(format!(
            "owner {} already has an account",
            account.owner_id
        )),
        source => LedgerError::Store { context, source },
    }
}

/// Locked read-modify-write of one balance inside an open transaction.
///
/// This is the only code path that writes a balance.
pub async fn apply_balance_delta(
    tx: &mut dyn LedgerTx,
    id: Uuid,
    delta: Decimal,
) -> LedgerResult<Account> {
    let account = tx
        .lock_account(id)
        .await
        .context("failed to get account for balance update")?
        .ok_or_else(|| LedgerError::account_not_found(id))?;

    let new_balance = account
        .balance
        .checked_add(delta)
        .ok_or_else(|| LedgerError::Internal(format!("balance overflow on account {id}")))?;

    if new_balance < Decimal::ZERO {
        return Err(LedgerError::InsufficientFunds {
            account_id: id,
            balance: account.balance,
            requested: -delta,
        });
    }

    tx.write_balance(id, new_balance)
        .await
        .context("failed to update account balance")?;

    tracing::debug!(
        account_id = %id,
        old_balance = %account.balance,
        new_balance = %new_balance,
        "Balance updated"
    );

    Ok(Account {
        balance: new_balance,
        ..account
    })
}
