//! Error types for st-db

use thiserror::Error;

/// Database operation errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Connection error (D001)
    #[error("[D001] Database connection failed: {0}")]
    ConnectionError(String),

    /// Query execution error (D002)
    #[error("[D002] SQL execution failed: {0}")]
    ExecutionError(String),

    /// Table not found (D003)
    #[error("[D003] Table or view not found: {0}")]
    TableNotFound(String),

    /// Primary key, unique or NOT NULL constraint violated (D004)
    #[error("[D004] Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Not implemented (D005)
    #[error("[D005] Feature not implemented for {backend}: {feature}")]
    NotImplemented { backend: String, feature: String },

    /// Mutex poisoned (D006)
    #[error("[D006] Database mutex poisoned: {0}")]
    MutexPoisoned(String),

    /// BEGIN/COMMIT/ROLLBACK failed (D007)
    #[error("[D007] Transaction control failed: {0}")]
    TransactionError(String),

    /// Internal error (D008)
    #[error("[D008] Internal database error: {0}")]
    Internal(String),

    /// Another process holds the database file open (D009)
    #[error("[D009] Database file is locked by another process: {0}")]
    FileLocked(String),
}

/// Result type alias for DbError
pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// `true` when the store rejected a write because of a key or
    /// constraint conflict.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, DbError::ConstraintViolation(_))
    }

    /// `true` when the database file could not be opened because another
    /// process has it open.
    pub fn is_file_locked(&self) -> bool {
        matches!(self, DbError::FileLocked(_))
    }
}

impl From<duckdb::Error> for DbError {
    fn from(err: duckdb::Error) -> Self {
        // duckdb::Error does not expose structured variants, so classify by
        // the message prefix DuckDB puts on each error class.
        let msg = err.to_string();
        if msg.contains("Table with name")
            || msg.contains("View with name")
            || msg.contains("Table or view with name")
            || (msg.contains("Catalog Error") && msg.contains("Table") && msg.contains("not found"))
        {
            DbError::TableNotFound(msg)
        } else if msg.contains("Constraint Error") {
            DbError::ConstraintViolation(msg)
        } else {
            DbError::ExecutionError(msg)
        }
    }
}
