//! Error types for st-ledger

use st_core::{ChangeUnitId, CoreError, Direction};
use st_db::DbError;
use thiserror::Error;

/// Ledger and migration-run errors
#[derive(Error, Debug)]
pub enum LedgerError {
    /// L001: An operation failed; the unit's transaction was rolled back
    #[error(
        "[L001] Change unit '{unit}' failed ({direction}) at operation {index} [{summary}]: {error}"
    )]
    OperationFailure {
        unit: ChangeUnitId,
        direction: Direction,
        index: usize,
        summary: String,
        error: String,
    },

    /// L002: Ledger and change-unit files (or the live schema) disagree
    #[error("[L002] Ledger inconsistency:\n  - {}", .problems.join("\n  - "))]
    LedgerInconsistency { problems: Vec<String> },

    /// L003: The migration lock could not be obtained in time
    #[error("[L003] Migration lock '{name}' is held by {holder} (gave up after {waited_secs}s)")]
    LockContention {
        name: String,
        holder: String,
        waited_secs: u64,
    },

    /// L004: `--to` names a unit that is unknown or not applied
    #[error("[L004] Unknown target change unit '{id}': {reason}")]
    UnknownTarget { id: String, reason: String },

    /// L005: Refusing to roll back a unit that declares no inverse
    #[error("[L005] Change unit '{unit}' is not reversible ({reason}); pass --allow-irreversible to run its inverse anyway")]
    NonReversible { unit: ChangeUnitId, reason: String },

    /// L006: Ledger bookkeeping inside a unit's transaction failed
    #[error("[L006] Failed to record change unit '{unit}' in the ledger: {source}")]
    Bookkeeping {
        unit: ChangeUnitId,
        #[source]
        source: DbError,
    },

    /// Database error
    #[error(transparent)]
    Db(#[from] DbError),

    /// Core error
    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type alias for LedgerError
pub type LedgerResult<T> = Result<T, LedgerError>;
