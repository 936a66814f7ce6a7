//! Command Handlers module
//!
//! Orchestrate repositories, transactions and the balance cache for each
//! ledger operation. Validation happens before any store access.

mod account_handler;
mod commands;
mod movement_handler;
mod transfer_handler;

#[cfg(test)]
mod tests;

pub use account_handler::AccountHandler;
pub use commands::*;
pub use movement_handler::{MovementHandler, MovementWriteMode};
pub use transfer_handler::TransferHandler;

use crate::cache::BalanceCache;
use crate::domain::{Account, Amount};
use crate::error::{LedgerError, LedgerResult};

/// Best-effort cache write after a confirmed store mutation.
async fn refresh_cached_balance(cache: &dyn BalanceCache, account: &Account) {
    if let Err(e) = cache.set(account.id, account.balance).await {
        tracing::warn!(account_id = %account.id, error = %e, "Failed to refresh balance cache");
    }
}

fn parse_amount(raw: &str) -> LedgerResult<Amount> {
    raw.parse()
        .map_err(|e| LedgerError::bad_request(format!("invalid amount: {e}")))
}
