//! Repository module
//!
//! Typed facades over the [`crate::store::LedgerStore`]: one per table, each
//! turning store results into ledger errors with operation context.

pub mod account_repository;
mod movement_repository;
mod transfer_repository;

pub use account_repository::{apply_balance_delta, AccountRepository};
pub use movement_repository::MovementRepository;
pub use transfer_repository::{finalize_transfer, TransferRepository};
