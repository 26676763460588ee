//! Runs one change unit in one direction, atomically when the backend
//! allows it.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::Ledger;
use serde::Serialize;
use st_core::{ChangeUnit, ChangeUnitId, Direction};
use st_db::{Database, DbError};
use std::time::Instant;

/// Outcome of a successfully executed unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub unit: ChangeUnitId,
    pub direction: Direction,
    pub operations: usize,
    pub execution_ms: u64,
}

/// Apply (`Forward`) or roll back (`Inverse`) `unit`.
///
/// Every operation is checked against the backend's capabilities and
/// rendered before anything runs. Then the operations and the ledger row
/// insert (or delete) run inside one transaction; any failure rolls the
/// whole unit back and leaves the ledger untouched.
pub async fn execute_unit(
    db: &dyn Database,
    ledger: &Ledger,
    unit: &ChangeUnit,
    direction: Direction,
) -> LedgerResult<ExecutionReport> {
    let ops = unit.operations(direction);
    let failure = |index: usize, error: String| LedgerError::OperationFailure {
        unit: unit.id.clone(),
        direction,
        index,
        summary: ops
            .get(index)
            .map(|op| op.summary())
            .unwrap_or_default(),
        error,
    };

    let caps = db.capabilities();
    let mut rendered = Vec::with_capacity(ops.len());
    for (i, op) in ops.iter().enumerate() {
        if op.alters_foreign_keys() && !caps.alter_foreign_keys {
            let unsupported = DbError::NotImplemented {
                backend: db.db_type().to_string(),
                feature: format!("{} on an existing table", op.kind()),
            };
            return Err(failure(i, unsupported.to_string()));
        }
        rendered.push(op.to_sql().map_err(|e| failure(i, e.to_string()))?);
    }

    let bookkeeping = match direction {
        Direction::Forward => None,
        Direction::Inverse => Some(ledger.delete_sql(&unit.id)),
    };

    if caps.transactional_ddl {
        db.begin().await?;
    } else {
        log::warn!(
            "{} does not run DDL transactionally: if '{}' fails part-way, its changes stay \
             applied and need manual repair",
            db.db_type(),
            unit.id
        );
    }

    log::info!("Running {} of {} ({} operations)", direction, unit.id, ops.len());
    let started = Instant::now();
    let outcome = run_statements(db, &rendered).await.map_err(|(i, e)| {
        log::debug!("{} {}[{}] failed: {}", unit.id, direction, i, e);
        failure(i, e.to_string())
    });

    let outcome = match outcome {
        Ok(()) => {
            let elapsed = started.elapsed().as_millis() as u64;
            let record = bookkeeping.unwrap_or_else(|| ledger.insert_sql(unit, elapsed));
            db.execute(&record)
                .await
                .map(|_| elapsed)
                .map_err(|source| LedgerError::Bookkeeping {
                    unit: unit.id.clone(),
                    source,
                })
        }
        Err(e) => Err(e),
    };

    match outcome {
        Ok(execution_ms) => {
            if caps.transactional_ddl {
                db.commit().await?;
            }
            Ok(ExecutionReport {
                unit: unit.id.clone(),
                direction,
                operations: ops.len(),
                execution_ms,
            })
        }
        Err(e) => {
            if caps.transactional_ddl {
                if let Err(rollback_err) = db.rollback().await {
                    log::warn!("ROLLBACK after failure of {} failed: {}", unit.id, rollback_err);
                }
            }
            Err(e)
        }
    }
}

/// Run rendered statements in order, reporting the index of the failing
/// operation.
async fn run_statements(
    db: &dyn Database,
    rendered: &[Vec<String>],
) -> Result<(), (usize, DbError)> {
    for (i, statements) in rendered.iter().enumerate() {
        for sql in statements {
            db.execute_batch(sql).await.map_err(|e| (i, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "executor_test.rs"]
mod tests;
