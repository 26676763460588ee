//! The ledger table: one row per applied change unit.

use crate::error::{LedgerError, LedgerResult};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use st_core::sql_utils::{quote_ident, quote_literal};
use st_core::{ChangeUnit, ChangeUnitId};
use st_db::Database;

const LEDGER_TABLE: &str = "schema_ledger";
const LOCK_TABLE: &str = "migration_lock";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// One applied change unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    pub id: ChangeUnitId,
    pub description: String,
    pub checksum: String,
    /// `full`, `partial` or `none`, as declared when applied.
    pub reversibility: String,
    pub applied_at: DateTime<Utc>,
    pub execution_ms: u64,
}

/// Location of the ledger and lock tables.
///
/// DuckDB names the catalog of a file database after the file stem, so
/// `strata.schema_ledger` is ambiguous in `strata.duckdb`. Ledgers built with
/// [`Ledger::in_catalog`] use three-part names to avoid that.
#[derive(Debug, Clone)]
pub struct Ledger {
    catalog: Option<String>,
    schema: String,
}

impl Ledger {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            catalog: None,
            schema: schema.into(),
        }
    }

    /// Qualify every ledger name with `catalog`.
    pub fn in_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Quoted `schema.schema_ledger`
    pub fn table(&self) -> String {
        self.qualified(LEDGER_TABLE)
    }

    /// Quoted `schema.migration_lock`
    pub fn lock_table(&self) -> String {
        self.qualified(LOCK_TABLE)
    }

    /// Quoted schema, behind the catalog when one is set
    fn qualified_schema(&self) -> String {
        match &self.catalog {
            Some(catalog) => format!("{}.{}", quote_ident(catalog), quote_ident(&self.schema)),
            None => quote_ident(&self.schema),
        }
    }

    fn qualified(&self, table: &str) -> String {
        format!("{}.{}", self.qualified_schema(), quote_ident(table))
    }

    /// Create the ledger schema and tables if they do not exist yet.
    pub async fn bootstrap(&self, db: &dyn Database) -> LedgerResult<()> {
        let sql = format!(
            "CREATE SCHEMA IF NOT EXISTS {schema};
             CREATE TABLE IF NOT EXISTS {ledger} (
                 id            VARCHAR PRIMARY KEY,
                 description   VARCHAR NOT NULL,
                 checksum      VARCHAR NOT NULL,
                 reversibility VARCHAR NOT NULL,
                 applied_at    TIMESTAMP NOT NULL,
                 execution_ms  BIGINT NOT NULL
             );
             CREATE TABLE IF NOT EXISTS {lock} (
                 lock_name   VARCHAR PRIMARY KEY,
                 owner       VARCHAR NOT NULL,
                 acquired_at TIMESTAMP NOT NULL
             );",
            schema = self.qualified_schema(),
            ledger = self.table(),
            lock = self.lock_table(),
        );
        db.execute_batch(&sql).await?;
        log::debug!("Ledger tables ready in schema '{}'", self.schema);
        Ok(())
    }

    /// Applied units in ascending id order. Empty when the ledger has never
    /// been bootstrapped. Rows whose timestamp or duration cannot be read
    /// are a [`LedgerError::LedgerInconsistency`].
    pub async fn entries(&self, db: &dyn Database) -> LedgerResult<Vec<LedgerEntry>> {
        if !db
            .relation_exists(&format!("{}.{}", self.schema, LEDGER_TABLE))
            .await?
        {
            return Ok(Vec::new());
        }

        let rows = db
            .query_strings(&format!(
                "SELECT id, description, checksum, reversibility, \
                 CAST(applied_at AS VARCHAR), CAST(execution_ms AS VARCHAR) \
                 FROM {} ORDER BY id",
                self.table()
            ))
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        let mut problems = Vec::new();
        for row in rows {
            let field = |i: usize| row.get(i).cloned().flatten().unwrap_or_default();
            let id = ChangeUnitId::parse(field(0))?;
            let applied_at = NaiveDateTime::parse_from_str(&field(4), TIMESTAMP_FORMAT)
                .map(|t| t.and_utc());
            let execution_ms = field(5).parse::<u64>();
            match (applied_at, execution_ms) {
                (Ok(applied_at), Ok(execution_ms)) => entries.push(LedgerEntry {
                    id,
                    description: field(1),
                    checksum: field(2),
                    reversibility: field(3),
                    applied_at,
                    execution_ms,
                }),
                (Err(_), _) => problems.push(format!(
                    "ledger row {} has an unreadable applied_at '{}'",
                    id,
                    field(4)
                )),
                (_, Err(_)) => problems.push(format!(
                    "ledger row {} has an unreadable execution_ms '{}'",
                    id,
                    field(5)
                )),
            }
        }
        if !problems.is_empty() {
            return Err(LedgerError::LedgerInconsistency { problems });
        }
        Ok(entries)
    }

    /// INSERT recording `unit` as applied now.
    pub fn insert_sql(&self, unit: &ChangeUnit, execution_ms: u64) -> String {
        format!(
            "INSERT INTO {} (id, description, checksum, reversibility, applied_at, execution_ms) \
             VALUES ({}, {}, {}, {}, {}, {})",
            self.table(),
            quote_literal(unit.id.as_str()),
            quote_literal(&unit.description),
            quote_literal(&unit.checksum()),
            quote_literal(unit.reversibility.level()),
            timestamp_literal(Utc::now()),
            execution_ms
        )
    }

    /// DELETE removing the row of a rolled-back unit.
    pub fn delete_sql(&self, id: &ChangeUnitId) -> String {
        format!(
            "DELETE FROM {} WHERE id = {}",
            self.table(),
            quote_literal(id.as_str())
        )
    }
}

/// `TIMESTAMP '...'` literal in UTC.
pub(crate) fn timestamp_literal(at: DateTime<Utc>) -> String {
    format!("TIMESTAMP '{}'", at.format("%Y-%m-%d %H:%M:%S%.6f"))
}

#[cfg(test)]
#[path = "ledger_test.rs"]
mod tests;
