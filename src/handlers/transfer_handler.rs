//! Transfer Handler
//!
//! Moves funds between two accounts. The transfer row is committed as
//! `pending` first, then one transaction writes both movements, both
//! balances and the `completed` status. If that transaction fails it is
//! rolled back and the row is marked `failed` separately.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::cache::BalanceCache;
use crate::domain::{
    Account, Amount, NewMovement, NewTransfer, PageRequest, Paginated, Transfer, TransferStatus,
};
use crate::error::{LedgerError, LedgerResult, ResultExt};
use crate::repository::{
    apply_balance_delta, finalize_transfer, AccountRepository, TransferRepository,
};
use crate::store::{LedgerStore, LedgerTx};

use super::{parse_amount, refresh_cached_balance, TransferCommand};

/// Handler for account-to-account transfers
#[derive(Clone)]
pub struct TransferHandler {
    store: Arc<dyn LedgerStore>,
    accounts: AccountRepository,
    transfers: TransferRepository,
    cache: Arc<dyn BalanceCache>,
}

impl TransferHandler {
    pub fn new(store: Arc<dyn LedgerStore>, cache: Arc<dyn BalanceCache>) -> Self {
        Self {
            accounts: AccountRepository::new(store.clone()),
            transfers: TransferRepository::new(store.clone()),
            store,
            cache,
        }
    }

    /// Execute the transfer command
    pub async fn execute(&self, command: TransferCommand) -> LedgerResult<Transfer> {
        let amount = parse_amount(&command.amount)?;

        if command.from_account == command.to_account {
            return Err(LedgerError::bad_request(
                "cannot transfer to the same account",
            ));
        }

        let from_account = self
            .accounts
            .get_by_id(command.from_account)
            .await
            .context("failed to get source account")?;
        let to_account = self
            .accounts
            .get_by_id(command.to_account)
            .await
            .context("failed to get destination account")?;

        if from_account.currency != to_account.currency {
            return Err(LedgerError::bad_request(format!(
                "currency mismatch: {} to {}",
                from_account.currency, to_account.currency
            )));
        }

        // The authoritative check happens again under the row lock.
        if !from_account.can_cover(amount.value()) {
            return Err(LedgerError::InsufficientFunds {
                account_id: from_account.id,
                balance: from_account.balance,
                requested: amount.value(),
            });
        }

        let transfer = self
            .transfers
            .create(&NewTransfer::pending(from_account.id, to_account.id, amount))
            .await
            .context("failed to create transfer record")?;

        match self.run_atomic(&transfer, amount, &command.description).await {
            Ok((from_after, to_after)) => {
                tracing::info!(
                    transfer_id = transfer.id,
                    from_account = %from_after.id,
                    to_account = %to_after.id,
                    amount = %amount,
                    "Transfer completed"
                );
                refresh_cached_balance(self.cache.as_ref(), &from_after).await;
                refresh_cached_balance(self.cache.as_ref(), &to_after).await;
            }
            Err(err) => {
                tracing::warn!(transfer_id = transfer.id, error = %err, "Transfer failed");
                self.mark_failed(transfer.id).await;
                return Err(err.context("transfer failed"));
            }
        }

        self.transfers
            .get_by_id(transfer.id)
            .await
            .context("failed to get updated transfer")
    }

    async fn run_atomic(
        &self,
        transfer: &Transfer,
        amount: Amount,
        description: &str,
    ) -> LedgerResult<(Account, Account)> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;

        match apply_transfer(tx.as_mut(), transfer, amount, description).await {
            Ok(accounts) => {
                tx.commit().await.context("failed to commit transfer")?;
                Ok(accounts)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(
                        transfer_id = transfer.id,
                        error = %rollback_err,
                        "Rollback failed"
                    );
                }
                Err(err)
            }
        }
    }

    /// Compensating status write after the atomic block was rolled back.
    /// Failure here leaves the row `pending`.
    async fn mark_failed(&self, transfer_id: i64) {
        if let Err(e) = self
            .transfers
            .update_status(transfer_id, TransferStatus::Failed, Some(Utc::now()))
            .await
        {
            tracing::error!(
                transfer_id = transfer_id,
                error = %e,
                "Failed to mark transfer as failed"
            );
        }
    }

    pub async fn get_by_id(&self, id: i64) -> LedgerResult<Transfer> {
        self.transfers.get_by_id(id).await
    }

    /// Paginated transfers where the account is source or destination.
    pub async fn list_by_account(
        &self,
        account_id: Uuid,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> LedgerResult<Paginated<Transfer>> {
        self.accounts
            .get_by_id(account_id)
            .await
            .context("failed to get account")?;

        let request = PageRequest::new(page, limit);
        let (transfers, total) = self
            .transfers
            .get_by_account_id(account_id, &request)
            .await?;

        Ok(Paginated::new(transfers, &request, total))
    }
}

/// Ledger text of both legs of a transfer.
fn leg_description(description: &str, transfer_id: i64) -> String {
    let description = description.trim();
    if description.is_empty() {
        format!("Transfer #{transfer_id}")
    } else {
        format!("{description} (Transfer #{transfer_id})")
    }
}

/// Both legs of a transfer inside one open transaction.
///
/// Account rows are locked in ascending id order whatever the direction,
/// so opposite transfers between the same pair cannot deadlock.
async fn apply_transfer(
    tx: &mut dyn LedgerTx,
    transfer: &Transfer,
    amount: Amount,
    description: &str,
) -> LedgerResult<(Account, Account)> {
    let (from, to) = (transfer.from_account, transfer.to_account);
    let (first, second) = if from < to { (from, to) } else { (to, from) };

    for id in [first, second] {
        tx.lock_account(id)
            .await
            .context("failed to lock account")?
            .ok_or_else(|| LedgerError::account_not_found(id))?;
    }

    let memo = leg_description(description, transfer.id);

    tx.insert_movement(&NewMovement::debit(from, amount, memo.clone()))
        .await
        .context("failed to create debit movement")?;
    tx.insert_movement(&NewMovement::credit(to, amount, memo))
        .await
        .context("failed to create credit movement")?;

    let from_after = apply_balance_delta(tx, from, amount.negated())
        .await
        .context("failed to update source account balance")?;
    let to_after = apply_balance_delta(tx, to, amount.value())
        .await
        .context("failed to update destination account balance")?;

    finalize_transfer(tx, transfer.id, TransferStatus::Completed, Some(Utc::now()))
        .await
        .context("failed to update transfer status")?;

    Ok((from_after, to_after))
}
