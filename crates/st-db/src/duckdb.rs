//! DuckDB database backend implementation

use crate::error::{DbError, DbResult};
use crate::traits::{Capabilities, Database};
use async_trait::async_trait;
use duckdb::Connection;
use st_core::sql_utils::quote_literal;
use st_core::table_name::TableName;
use st_core::DatabaseConfig;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

const IN_MEMORY: &str = ":memory:";
const FILE_LOCK_CONFLICT: &str = "Could not set lock on file";

/// DuckDB database backend
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    catalog: String,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::with_connection(conn)
    }

    /// Create a new DuckDB connection from a file path
    ///
    /// Fails with [`DbError::FileLocked`] while another process has the file
    /// open.
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| {
            let msg = format!("{e}: {}", path.display());
            if msg.contains(FILE_LOCK_CONFLICT) {
                DbError::FileLocked(msg)
            } else {
                DbError::ConnectionError(msg)
            }
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        // The file stem for on-disk databases, `memory` otherwise.
        let catalog: String = conn.query_row("SELECT current_database()", [], |row| row.get(0))?;
        Ok(Self {
            conn: Mutex::new(conn),
            catalog,
        })
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == IN_MEMORY {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    /// Open the database a (target-resolved) config points at
    pub fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        log::debug!("Opening {} database at {}", config.db_type, config.path);
        Self::new(&config.path)
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute SQL synchronously
    fn execute_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        Ok(conn.execute(sql, [])?)
    }

    /// Execute batch SQL synchronously
    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        Ok(conn.execute_batch(sql)?)
    }

    /// Query count synchronously
    fn query_count_sync(&self, sql: &str) -> DbResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM ({})", sql), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    fn query_strings_sync(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let width = row.as_ref().column_count();
            let mut values = Vec::with_capacity(width);
            for i in 0..width {
                values.push(row.get::<_, Option<String>>(i)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    fn query_exists_sync(&self, sql: &str) -> DbResult<bool> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(sql, [], |row| row.get(0))?;
        Ok(count > 0)
    }

    fn transaction_sync(&self, statement: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(statement)
            .map_err(|e| DbError::TransactionError(format!("{statement} failed: {e}")))
    }
}

/// Split `schema.table` into its parts, defaulting to the `main` schema.
fn split_name(name: &str) -> DbResult<(String, String)> {
    let table = TableName::parse(name)
        .ok_or_else(|| DbError::Internal(format!("invalid table name '{name}'")))?;
    Ok((
        table.schema_or_default().to_string(),
        table.name().to_string(),
    ))
}

const SNAPSHOT_SQL: &str = "
SELECT line FROM (
    SELECT table_schema || '.' || table_name || ' column ' || column_name || ' '
        || data_type || CASE WHEN is_nullable = 'NO' THEN ' NOT NULL' ELSE '' END
        || COALESCE(' DEFAULT ' || column_default, '') AS line
    FROM information_schema.columns
    WHERE table_catalog = current_database()
      AND table_schema NOT IN ('information_schema', 'pg_catalog')
    UNION ALL
    SELECT schema_name || '.' || table_name || ' index ' || index_name || ' '
        || CASE WHEN is_unique THEN 'UNIQUE ' ELSE '' END || COALESCE(CAST(expressions AS VARCHAR), '')
    FROM duckdb_indexes()
    WHERE database_name = current_database()
    UNION ALL
    SELECT schema_name || '.' || table_name || ' constraint ' || constraint_type || ' '
        || COALESCE(constraint_text, '')
    FROM duckdb_constraints()
    WHERE database_name = current_database() AND constraint_type <> 'NOT NULL'
)
ORDER BY line";

#[async_trait]
impl Database for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<usize> {
        self.execute_sync(sql)
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        self.execute_batch_sync(sql)
    }

    async fn query_count(&self, sql: &str) -> DbResult<usize> {
        self.query_count_sync(sql)
    }

    async fn query_strings(&self, sql: &str) -> DbResult<Vec<Vec<Option<String>>>> {
        self.query_strings_sync(sql)
    }

    async fn relation_exists(&self, name: &str) -> DbResult<bool> {
        let (schema, table) = split_name(name)?;
        self.query_exists_sync(&format!(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = {} AND table_name = {}",
            quote_literal(&schema),
            quote_literal(&table)
        ))
    }

    async fn column_exists(&self, table: &str, column: &str) -> DbResult<bool> {
        let (schema, table) = split_name(table)?;
        self.query_exists_sync(&format!(
            "SELECT COUNT(*) FROM information_schema.columns \
             WHERE table_schema = {} AND table_name = {} AND column_name = {}",
            quote_literal(&schema),
            quote_literal(&table),
            quote_literal(column)
        ))
    }

    async fn index_exists(&self, table: &str, index: &str) -> DbResult<bool> {
        let (schema, table) = split_name(table)?;
        self.query_exists_sync(&format!(
            "SELECT COUNT(*) FROM duckdb_indexes() \
             WHERE schema_name = {} AND table_name = {} AND index_name = {}",
            quote_literal(&schema),
            quote_literal(&table),
            quote_literal(index)
        ))
    }

    async fn schema_snapshot(&self) -> DbResult<Vec<String>> {
        let rows = self.query_strings_sync(SNAPSHOT_SQL)?;
        Ok(rows
            .into_iter()
            .filter_map(|mut row| row.pop().flatten())
            .collect())
    }

    async fn begin(&self) -> DbResult<()> {
        self.transaction_sync("BEGIN TRANSACTION")
    }

    async fn commit(&self) -> DbResult<()> {
        self.transaction_sync("COMMIT")
    }

    async fn rollback(&self) -> DbResult<()> {
        self.transaction_sync("ROLLBACK")
    }

    fn capabilities(&self) -> Capabilities {
        // DuckDB has no ALTER TABLE ... ADD/DROP CONSTRAINT for foreign keys.
        Capabilities {
            transactional_ddl: true,
            alter_foreign_keys: false,
        }
    }

    fn catalog(&self) -> &str {
        &self.catalog
    }

    fn db_type(&self) -> &'static str {
        "duckdb"
    }
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
