//! Movement Repository
//!
//! Append-only: insert and paginated reads, nothing else.

use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Movement, NewMovement, PageRequest};
use crate::error::{LedgerError, LedgerResult, ResultExt};
use crate::store::LedgerStore;

/// Repository for ledger movements
#[derive(Clone)]
pub struct MovementRepository {
    store: Arc<dyn LedgerStore>,
}

impl MovementRepository {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Insert one movement in its own transaction.
    pub async fn create(&self, movement: &NewMovement) -> LedgerResult<Movement> {
        let mut tx = self.store.begin().await.context("failed to begin transaction")?;
        let created = tx
            .insert_movement(movement)
            .await
            .context("failed to create movement")?;
        tx.commit().await.context("failed to commit movement")?;

        Ok(created)
    }

    pub async fn get_by_id(&self, id: i64) -> LedgerResult<Movement> {
        self.store
            .find_movement(id)
            .await
            .context("failed to get movement by ID")?
            .ok_or_else(|| LedgerError::movement_not_found(id))
    }

    /// Movements for an account, most recent first, with the total count.
    pub async fn get_by_account_id(
        &self,
        account_id: Uuid,
        page: &PageRequest,
    ) -> LedgerResult<(Vec<Movement>, i64)> {
        self.store
            .movements_for_account(account_id, page)
            .await
            .context("failed to get movements by account ID")
    }
}
