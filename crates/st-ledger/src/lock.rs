//! Cross-process mutual exclusion through a lock row.
//!
//! Acquiring inserts `(lock_name, owner, acquired_at)` into the lock table; a
//! primary-key conflict means another process holds it. Contention is retried
//! with exponential backoff until the configured timeout. The timeout covers
//! acquisition only.
//!
//! DuckDB also locks the database file itself, so a concurrent run may not
//! get as far as the lock row. [`open_when_free`] retries that open with the
//! same backoff.

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{timestamp_literal, Ledger};
use chrono::Utc;
use st_core::sql_utils::quote_literal;
use st_core::LockConfig;
use st_db::{Database, DbResult};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// A held migration lock. Release it with [`MigrationLock::release`].
#[derive(Debug)]
pub struct MigrationLock {
    table: String,
    name: String,
    owner: String,
}

impl MigrationLock {
    /// Acquire the lock named in `config`, waiting up to `timeout_secs`.
    pub async fn acquire(
        db: &dyn Database,
        ledger: &Ledger,
        config: &LockConfig,
    ) -> LedgerResult<Self> {
        let lock = Self {
            table: ledger.lock_table(),
            name: config.name.clone(),
            owner: owner_tag(),
        };

        let mut backoff = Backoff::new(config);
        loop {
            let insert = format!(
                "INSERT INTO {} (lock_name, owner, acquired_at) VALUES ({}, {}, {})",
                lock.table,
                quote_literal(&lock.name),
                quote_literal(&lock.owner),
                timestamp_literal(Utc::now())
            );
            match db.execute(&insert).await {
                Ok(_) => {
                    log::debug!("Acquired migration lock '{}' as {}", lock.name, lock.owner);
                    return Ok(lock);
                }
                Err(e) if e.is_constraint_violation() => {
                    if !backoff.wait(&format!("Migration lock '{}'", lock.name)).await {
                        let holder = lock
                            .holder(db)
                            .await?
                            .unwrap_or_else(|| "an unknown process".to_string());
                        return Err(LedgerError::LockContention {
                            name: lock.name,
                            holder,
                            waited_secs: backoff.waited_secs(),
                        });
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    async fn holder(&self, db: &dyn Database) -> LedgerResult<Option<String>> {
        current_holder(db, &self.table, &self.name).await
    }

    /// Delete the lock row if this process still owns it.
    pub async fn release(self, db: &dyn Database) -> LedgerResult<()> {
        let deleted = db
            .execute(&format!(
                "DELETE FROM {} WHERE lock_name = {} AND owner = {}",
                self.table,
                quote_literal(&self.name),
                quote_literal(&self.owner)
            ))
            .await?;
        if deleted == 0 {
            log::warn!(
                "Migration lock '{}' was no longer held by {} at release",
                self.name,
                self.owner
            );
        }
        Ok(())
    }
}

/// Describe who holds the named lock, if anyone.
pub async fn current_holder(
    db: &dyn Database,
    table: &str,
    name: &str,
) -> LedgerResult<Option<String>> {
    let rows = db
        .query_strings(&format!(
            "SELECT owner || ' since ' || CAST(acquired_at AS VARCHAR) FROM {} WHERE lock_name = {}",
            table,
            quote_literal(name)
        ))
        .await?;
    Ok(rows.into_iter().next().and_then(|mut r| r.pop().flatten()))
}

/// Remove a lock row regardless of owner. Returns whether a row existed.
pub async fn force_unlock(db: &dyn Database, ledger: &Ledger, name: &str) -> LedgerResult<bool> {
    let deleted = db
        .execute(&format!(
            "DELETE FROM {} WHERE lock_name = {}",
            ledger.lock_table(),
            quote_literal(name)
        ))
        .await?;
    Ok(deleted > 0)
}

/// Open a database with `open`, retrying while another process has the file
/// open. Gives up with [`LedgerError::LockContention`] once `timeout_secs`
/// has passed.
pub async fn open_when_free<T>(
    config: &LockConfig,
    mut open: impl FnMut() -> DbResult<T>,
) -> LedgerResult<T> {
    let mut backoff = Backoff::new(config);
    loop {
        match open() {
            Ok(db) => return Ok(db),
            Err(e) if e.is_file_locked() => {
                log::debug!("{}", e);
                if !backoff.wait("Database file").await {
                    return Err(LedgerError::LockContention {
                        name: config.name.clone(),
                        holder: "another process with the database file open".to_string(),
                        waited_secs: backoff.waited_secs(),
                    });
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Exponential backoff up to a deadline.
struct Backoff {
    started: Instant,
    deadline: Instant,
    delay: Duration,
    max_delay: Duration,
}

impl Backoff {
    fn new(config: &LockConfig) -> Self {
        let started = Instant::now();
        Self {
            started,
            deadline: started + Duration::from_secs(config.timeout_secs),
            delay: Duration::from_millis(config.initial_backoff_ms),
            max_delay: Duration::from_millis(config.max_backoff_ms),
        }
    }

    /// Sleep before the next attempt. `false` once the deadline has passed.
    async fn wait(&mut self, what: &str) -> bool {
        let now = Instant::now();
        if now >= self.deadline {
            return false;
        }
        let wait = self.delay.min(self.deadline - now);
        log::debug!("{} busy, retrying in {}ms", what, wait.as_millis());
        tokio::time::sleep(wait).await;
        self.delay = (self.delay * 2).min(self.max_delay);
        true
    }

    fn waited_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

fn owner_tag() -> String {
    format!("pid {} ({})", std::process::id(), Uuid::new_v4())
}

#[cfg(test)]
#[path = "lock_test.rs"]
mod tests;
