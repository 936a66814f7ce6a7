//! bank_ledger Library
//!
//! Ledger core of a banking backend: locked balance updates, an append-only
//! movement ledger, atomic two-sided transfers and a best-effort balance
//! cache.

pub mod cache;
pub mod config;
pub mod db;
pub mod domain;
mod error;
pub mod handlers;
pub mod ledger;
pub mod repository;
pub mod store;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use domain::{Account, Amount, AmountError, Movement, MovementType, Transfer, TransferStatus};
pub use error::{ErrorKind, LedgerError, LedgerResult, ResultExt};
pub use ledger::{ConnectError, Ledger};
