//! Database trait definition

use crate::error::DbResult;
use async_trait::async_trait;

/// What a backend can do inside a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// DDL participates in transactions and is undone by ROLLBACK.
    pub transactional_ddl: bool,
    /// `ALTER TABLE ... ADD/DROP CONSTRAINT` for foreign keys is supported.
    pub alter_foreign_keys: bool,
}

/// Database abstraction trait for Strata
///
/// Implementations must be Send + Sync for async operation.
#[async_trait]
pub trait Database: Send + Sync {
    /// Execute a single SQL statement, returns affected rows
    async fn execute(&self, sql: &str) -> DbResult<usize>;

    /// Execute multiple SQL statements
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Execute query returning row count
    async fn query_count(&self, sql: &str) -> DbResult<usize>;

    /// Run a query and return every row as nullable strings.
    ///
    /// Every selected column must be VARCHAR; cast in SQL where needed.
    async fn query_strings(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>>;

    /// Check if a table or view exists (`table` or `schema.table`)
    async fn relation_exists(&self, name: &str) -> DbResult<bool>;

    /// Check if a column exists on a table
    async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool>;

    /// Check if a named index exists on a table
    async fn index_exists(&self, table: &str, index: &str) -> DbResult<bool>;

    /// Sorted one-line descriptions of every user column, index and
    /// constraint. Two equal snapshots mean an equal observable schema.
    async fn schema_snapshot(&self) -> DbResult<Vec<String>>;

    /// Open a transaction
    async fn begin(&self) -> DbResult<()>;

    /// Commit the open transaction
    async fn commit(&self) -> DbResult<()>;

    /// Roll back the open transaction
    async fn rollback(&self) -> DbResult<()>;

    /// Backend capabilities consulted before a unit runs
    fn capabilities(&self) -> Capabilities;

    /// Name of the attached database that unqualified names resolve in.
    /// Prefix it to names that could clash with a schema of the same name.
    fn catalog(&self) -> &str;

    /// Database type identifier for logging
    fn db_type(&self) -> &'static str;
}
