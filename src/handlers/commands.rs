//! Command definitions
//!
//! Commands carry caller input as received. Amounts and movement types stay
//! strings until the handler validates them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Command to record a single credit or debit on an account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMovementCommand {
    pub account_id: Uuid,
    /// Amount (as string for precise decimal)
    pub amount: String,
    /// "credit" or "debit"
    #[serde(rename = "type")]
    pub movement_type: String,
    #[serde(default)]
    pub description: String,
}

impl CreateMovementCommand {
    pub fn new(account_id: Uuid, amount: impl Into<String>, movement_type: impl Into<String>) -> Self {
        Self {
            account_id,
            amount: amount.into(),
            movement_type: movement_type.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Command to move funds between two accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferCommand {
    pub from_account: Uuid,
    pub to_account: Uuid,
    /// Amount to transfer (as string for precise decimal)
    pub amount: String,
    #[serde(default)]
    pub description: String,
}

impl TransferCommand {
    pub fn new(from_account: Uuid, to_account: Uuid, amount: impl Into<String>) -> Self {
        Self {
            from_account,
            to_account,
            amount: amount.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}
