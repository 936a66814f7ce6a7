//! Movement record
//!
//! A movement is one credit or debit against a single account. The amount is
//! always positive; the direction lives in [`MovementType`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::Amount;

/// Direction of a movement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Credit,
    Debit,
}

impl MovementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MovementType::Credit => "credit",
            MovementType::Debit => "debit",
        }
    }

    /// Balance delta produced by a movement of `amount` in this direction.
    pub fn signed(&self, amount: &Amount) -> Decimal {
        match self {
            MovementType::Credit => amount.value(),
            MovementType::Debit => amount.negated(),
        }
    }
}

impl fmt::Display for MovementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("movement type must be 'credit' or 'debit' (got '{0}')")]
pub struct InvalidMovementType(pub String);

impl FromStr for MovementType {
    type Err = InvalidMovementType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "credit" => Ok(MovementType::Credit),
            "debit" => Ok(MovementType::Debit),
            other => Err(InvalidMovementType(other.to_string())),
        }
    }
}

/// A stored ledger entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: i64,
    pub account_id: Uuid,
    pub amount: Decimal,
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// A movement waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMovement {
    pub account_id: Uuid,
    pub amount: Amount,
    pub movement_type: MovementType,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

impl NewMovement {
    pub fn new(
        account_id: Uuid,
        amount: Amount,
        movement_type: MovementType,
        description: impl Into<String>,
    ) -> Self {
        Self {
            account_id,
            amount,
            movement_type,
            description: description.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn credit(account_id: Uuid, amount: Amount, description: impl Into<String>) -> Self {
        Self::new(account_id, amount, MovementType::Credit, description)
    }

    pub fn debit(account_id: Uuid, amount: Amount, description: impl Into<String>) -> Self {
        Self::new(account_id, amount, MovementType::Debit, description)
    }

    /// Materialize the stored row once the store assigned an id.
    pub fn into_movement(self, id: i64) -> Movement {
        Movement {
            id,
            account_id: self.account_id,
            amount: self.amount.value(),
            movement_type: self.movement_type,
            description: self.description,
            occurred_at: self.occurred_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_movement_type_parse() {
        assert_eq!("credit".parse::<MovementType>().unwrap(), MovementType::Credit);
        assert_eq!("debit".parse::<MovementType>().unwrap(), MovementType::Debit);
        assert!("CREDIT".parse::<MovementType>().is_err());
        assert!("refund".parse::<MovementType>().is_err());
    }

    #[test]
    fn test_signed_delta() {
        let amount = Amount::new(dec!(12.50)).unwrap();
        assert_eq!(MovementType::Credit.signed(&amount), dec!(12.50));
        assert_eq!(MovementType::Debit.signed(&amount), dec!(-12.50));
    }

    #[test]
    fn test_movement_serializes_type_field() {
        let movement = NewMovement::debit(Uuid::new_v4(), Amount::from_integer(5).unwrap(), "wd")
            .into_movement(7);
        let json = serde_json::to_value(&movement).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["type"], "debit");
        assert_eq!(json["description"], "wd");
    }
}
