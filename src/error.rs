//! Error handling module
//!
//! Centralized ledger error type. Every error reduces to one of four kinds
//! (see [`ErrorKind`]); wrapping an error with context never changes its kind.

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::TransferStatus;
use crate::store::StoreError;

/// Ledger-wide Result type
pub type LedgerResult<T> = Result<T, LedgerError>;

/// Coarse error classification exposed to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadRequest,
    NotFound,
    InsufficientFunds,
    Internal,
}

/// Ledger error types
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    // Client errors
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("insufficient funds on account {account_id}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account_id: Uuid,
        balance: Decimal,
        requested: Decimal,
    },

    // Server errors
    #[error("transfer {transfer_id} cannot move from {from} to {to}")]
    InvalidTransition {
        transfer_id: i64,
        from: TransferStatus,
        to: TransferStatus,
    },

    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<LedgerError>,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn account_not_found(id: Uuid) -> Self {
        Self::NotFound {
            entity: "account",
            id: id.to_string(),
        }
    }

    pub fn movement_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "movement",
            id: id.to_string(),
        }
    }

    pub fn transfer_not_found(id: i64) -> Self {
        Self::NotFound {
            entity: "transfer",
            id: id.to_string(),
        }
    }

    /// Wrap this error with operation context, keeping its kind.
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classification, looking through context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Self::InvalidTransition { .. } | Self::Store { .. } | Self::Internal(_) => {
                ErrorKind::Internal
            }
            Self::Context { source, .. } => source.kind(),
        }
    }

    /// Innermost error, past all context wrappers.
    pub fn root(&self) -> &LedgerError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Internal)
    }
}

/// Attach operation context to fallible ledger and store calls.
pub trait ResultExt<T> {
    fn context(self, context: &'static str) -> LedgerResult<T>;
}

impl<T> ResultExt<T> for Result<T, LedgerError> {
    fn context(self, context: &'static str) -> LedgerResult<T> {
        self.map_err(|e| e.context(context))
    }
}

impl<T> ResultExt<T> for Result<T, StoreError> {
    fn context(self, context: &'static str) -> LedgerResult<T> {
        self.map_err(|source| LedgerError::Store { context, source })
    }
}
