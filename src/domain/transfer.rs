//! Transfer record and its state machine
//!
//! ```text
//! pending --(atomic success)--> completed
//! pending --(atomic failure)--> failed
//! ```
//! Terminal states are final.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

/// Lifecycle state of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    Completed,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferStatus::Pending)
    }

    /// Only `pending -> completed` and `pending -> failed` are legal.
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Completed)
                | (TransferStatus::Pending, TransferStatus::Failed)
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown transfer status '{0}'")]
pub struct InvalidTransferStatus(pub String);

impl FromStr for TransferStatus {
    type Err = InvalidTransferStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "completed" => Ok(TransferStatus::Completed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(InvalidTransferStatus(other.to_string())),
        }
    }
}

/// A stored transfer between two accounts
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    pub id: i64,
    pub from_account: Uuid,
    pub to_account: Uuid,
    pub amount: Decimal,
    pub status: TransferStatus,
    pub initiated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Transfer {
    /// Whether `account_id` is either side of this transfer.
    pub fn involves(&self, account_id: Uuid) -> bool {
        self.from_account == account_id || self.to_account == account_id
    }
}

/// A transfer waiting to be inserted. Always starts `pending`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub from_account: Uuid,
    pub to_account: Uuid,
    pub amount: Amount,
    pub initiated_at: DateTime<Utc>,
}

impl NewTransfer {
    pub fn pending(from_account: Uuid, to_account: Uuid, amount: Amount) -> Self {
        Self {
            from_account,
            to_account,
            amount,
            initiated_at: Utc::now(),
        }
    }

    pub fn into_transfer(self, id: i64) -> Transfer {
        Transfer {
            id,
            from_account: self.from_account,
            to_account: self.to_account,
            amount: self.amount.value(),
            status: TransferStatus::Pending,
            initiated_at: self.initiated_at,
            completed_at: None,
        }
    }
}
