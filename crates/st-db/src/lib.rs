//! st-db - Database abstraction layer for Strata
//!
//! This crate provides the async `Database` trait the ledger runs against
//! and its DuckDB implementation.

pub mod duckdb;
pub mod error;
pub mod traits;

pub use duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use traits::{Capabilities, Database};
