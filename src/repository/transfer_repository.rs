//! Transfer Repository
//!
//! Transfer rows and their guarded status transitions.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{NewTransfer, PageRequest, Transfer, TransferStatus};
use crate::error::{LedgerError, LedgerResult, ResultExt};
use crate::store::{LedgerStore, LedgerTx};

/// Repository for transfer records
#[derive(Clone)]
pub struct TransferRepository {
    store: Arc<dyn LedgerStore>,
}

impl TransferRepository {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Persist a new `pending` transfer.
    pub async fn create(&self, transfer: &NewTransfer) -> LedgerResult<Transfer> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;
        let created = tx
            .insert_transfer(transfer)
            .await
            .context("failed to create transfer")?;
        tx.commit().await.context("failed to commit transfer")?;

        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> LedgerResult<Transfer> {
        self.store
            .find_transfer(id)
            .await
            .context("failed to get transfer by ID")?
            .ok_or_else(|| LedgerError::transfer_not_found(id))
    }

    /// Transfers where the account is either side, most recent first.
    pub async fn get_by_account_id(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<Transfer>, i64)> {
        self.store
            .transfers_for_account(account_id, page)
            .await
            .context("failed to get transfers by account ID")
    }

    /// Move a transfer to a terminal status in its own transaction.
    pub async fn update_status(
        &self,
        id: i64,
        status: TransferStatus,
        completed_at: Option<DateTime<Utc>>,
    ) -> LedgerResult<Transfer> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;

        match finalize_transfer(tx.as_mut(), id, status, completed_at).await {
            Ok(transfer) => {
                tx.commit().await.context("failed to commit transfer status")?;
                Ok(transfer)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(transfer_id = id, error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }
}

/// Lock a transfer row and apply a state transition inside an open
/// transaction. Illegal transitions leave the row untouched.
pub async fn finalize_transfer(
    tx: &mut dyn LedgerTx,
    id: i64,
    status: TransferStatus,
    completed_at: Option<DateTime<Utc>>,
) -> LedgerResult<Transfer> {
    let current = tx
        .lock_transfer(id)
        .await
        .context("failed to lock transfer")?
        .ok_or_else(|| LedgerError::transfer_not_found(id))?;

    if !current.status.can_transition_to(status) {
        return Err(LedgerError::InvalidTransition {
            transfer_id: id,
            from: current.status,
            to: status,
        });
    }

    tx.write_transfer_status(id, status, completed_at)
        .await
        .context("failed to update transfer status")?;

    Ok(Transfer {
        status,
        completed_at,
        ..current
    })
}
