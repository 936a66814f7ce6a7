//! Store Errors

/// Errors raised by a [`super::LedgerStore`] backend
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database error
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Unique constraint hit
    #[error("conflict: {0}")]
    Conflict(String),

    /// A stored value could not be mapped back to a domain value
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Any other backend fault
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Postgres unique_violation (23505) maps to `Conflict`.
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("23505") {
                return StoreError::Conflict(db_err.message().to_string());
            }
        }
        StoreError::Database(err)
    }
}
