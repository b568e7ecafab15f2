use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Transaction is inactive and cannot perform commit or roll back operations")]
    InactiveTransaction,

    #[error("Transaction {0} is already in progress on this connection")]
    TransactionInProgress(String),

    #[error("No active transaction")]
    NoActiveTransaction,

    #[error("Connection {0} is closed")]
    ConnectionClosed(u64),

    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Column '{0}' not found in table '{1}'")]
    ColumnNotFound(String, String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl DbError {
    /// True for failures raised by the underlying store's integrity checks
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl<T> From<std::sync::PoisonError<T>> for DbError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::ConfigError(err.to_string())
    }
}
