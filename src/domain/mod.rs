//! Domain module
//!
//! Ledger records, monetary primitives and pagination types.

pub mod account;
pub mod amount;
pub mod movement;
pub mod pagination;
pub mod transfer;

pub use account::{Account, NewAccount, DEFAULT_CURRENCY};
pub use amount::{Amount, AmountError};
pub use movement::{Movement, MovementType, NewMovement};
pub use pagination::{PageRequest, Paginated};
pub use transfer::{NewTransfer, Transfer, TransferStatus};
