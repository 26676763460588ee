//! st-ledger - Migration ledger for Strata
//!
//! Records which change units have been applied, serializes migration runs
//! behind a store-provided lock, and applies or rolls back units atomically.

pub mod error;
pub mod executor;
pub mod ledger;
pub mod lock;
pub mod migrator;

pub use error::{LedgerError, LedgerResult};
pub use executor::{execute_unit, ExecutionReport};
pub use ledger::{Ledger, LedgerEntry};
pub use lock::{open_when_free, MigrationLock};
pub use migrator::{MigrationObserver, Migrator, RollbackTarget, StatusReport, UnitStatus};
