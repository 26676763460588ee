//! Apply, roll back, inspect and verify a project's change units against
//! one database.

use crate::error::{LedgerError, LedgerResult};
use crate::executor::{execute_unit, ExecutionReport};
use crate::ledger::{Ledger, LedgerEntry};
use crate::lock::{self, MigrationLock};
use chrono::{DateTime, Utc};
use serde::Serialize;
use st_core::{ChangeUnit, ChangeUnitId, Direction, Probe, Project, Reversibility, SchemaModel};
use st_db::Database;
use std::collections::{HashMap, HashSet};
use std::future::Future;

/// How far `rollback` goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackTarget {
    /// The most recent `n` applied units.
    Steps(usize),
    /// Every applied unit newer than this one (exclusive).
    To(ChangeUnitId),
}

/// Progress callbacks for long runs. Every method defaults to a no-op.
pub trait MigrationObserver {
    /// Called once with the number of units about to run.
    fn planned(&mut self, _total: usize) {}
    fn unit_started(&mut self, _unit: &ChangeUnit, _direction: Direction) {}
    fn unit_finished(&mut self, _report: &ExecutionReport) {}
    /// A warning the operator should see before the batch runs.
    fn notice(&mut self, _message: &str) {}
}

impl MigrationObserver for () {}

/// Status of one known change unit.
#[derive(Debug, Clone, Serialize)]
pub struct UnitStatus {
    pub id: ChangeUnitId,
    pub description: String,
    pub applied: bool,
    pub applied_at: Option<DateTime<Utc>>,
    /// Applied, and the file changed since.
    pub checksum_drift: bool,
    pub reversibility: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reversibility_reason: Option<String>,
}

/// Output of [`Migrator::status`].
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub units: Vec<UnitStatus>,
    /// Ledger rows whose change-unit file no longer exists.
    pub orphaned: Vec<LedgerEntry>,
    /// Current lock holder, if a run is in progress (or a lock went stale).
    pub lock_holder: Option<String>,
}

impl StatusReport {
    pub fn pending(&self) -> impl Iterator<Item = &UnitStatus> {
        self.units.iter().filter(|u| !u.applied)
    }
}

/// Runs a project's change units against a database.
pub struct Migrator<'a> {
    db: &'a dyn Database,
    project: &'a Project,
    ledger: Ledger,
}

impl<'a> Migrator<'a> {
    pub fn new(db: &'a dyn Database, project: &'a Project) -> Self {
        Self {
            db,
            project,
            ledger: Ledger::new(project.config.ledger_schema.clone()).in_catalog(db.catalog()),
        }
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Applied ledger entries, ascending.
    pub async fn entries(&self) -> LedgerResult<Vec<LedgerEntry>> {
        self.ledger.entries(self.db).await
    }

    /// Apply every pending unit in ascending id order, stopping after `to`
    /// (inclusive) when given.
    pub async fn apply_pending(
        &self,
        to: Option<&ChangeUnitId>,
        observer: &mut dyn MigrationObserver,
    ) -> LedgerResult<Vec<ExecutionReport>> {
        if let Some(id) = to {
            if self.project.unit(id).is_none() {
                return Err(LedgerError::UnknownTarget {
                    id: id.to_string(),
                    reason: "no change unit with this id".to_string(),
                });
            }
        }

        self.with_lock(async {
            let entries = self.entries().await?;
            self.ensure_consistent(&entries)?;

            let applied: HashMap<&ChangeUnitId, &LedgerEntry> =
                entries.iter().map(|e| (&e.id, e)).collect();
            let pending: Vec<&ChangeUnit> = self
                .project
                .units()
                .iter()
                .filter(|u| !applied.contains_key(&u.id))
                .filter(|u| to.map_or(true, |to| u.id <= *to))
                .collect();

            log::info!("{} change units pending", pending.len());
            self.warn_if_not_transactional(pending.len(), observer);
            observer.planned(pending.len());
            let mut reports = Vec::with_capacity(pending.len());
            for unit in pending {
                observer.unit_started(unit, Direction::Forward);
                let report = execute_unit(self.db, &self.ledger, unit, Direction::Forward).await?;
                observer.unit_finished(&report);
                reports.push(report);
            }
            Ok(reports)
        })
        .await
    }

    /// Roll back applied units newest first.
    pub async fn rollback(
        &self,
        target: &RollbackTarget,
        allow_irreversible: bool,
        observer: &mut dyn MigrationObserver,
    ) -> LedgerResult<Vec<ExecutionReport>> {
        self.with_lock(async {
            let entries = self.entries().await?;
            self.ensure_consistent(&entries)?;

            let selected: Vec<&LedgerEntry> = match target {
                RollbackTarget::Steps(n) => entries.iter().rev().take(*n).collect(),
                RollbackTarget::To(id) => {
                    if !entries.iter().any(|e| &e.id == id) {
                        return Err(LedgerError::UnknownTarget {
                            id: id.to_string(),
                            reason: "not an applied change unit".to_string(),
                        });
                    }
                    entries.iter().rev().take_while(|e| &e.id > id).collect()
                }
            };

            // Consistency guarantees every applied id has a unit.
            let units: Vec<&ChangeUnit> = selected
                .iter()
                .filter_map(|e| self.project.unit(&e.id))
                .collect();

            for unit in &units {
                match &unit.reversibility {
                    Reversibility::None { reason } if !allow_irreversible => {
                        return Err(LedgerError::NonReversible {
                            unit: unit.id.clone(),
                            reason: reason.clone(),
                        });
                    }
                    Reversibility::Full => {}
                    other => {
                        let message = format!(
                            "{} has {} reversibility ({}); rolling it back will not restore \
                             its data exactly",
                            unit.id,
                            other.level(),
                            other.reason().unwrap_or_default()
                        );
                        log::warn!("{}", message);
                        observer.notice(&message);
                    }
                }
            }
            self.warn_if_not_transactional(units.len(), observer);

            observer.planned(units.len());
            let mut reports = Vec::with_capacity(units.len());
            for unit in units {
                observer.unit_started(unit, Direction::Inverse);
                let report = execute_unit(self.db, &self.ledger, unit, Direction::Inverse).await?;
                observer.unit_finished(&report);
                reports.push(report);
            }
            Ok(reports)
        })
        .await
    }

    /// Every known unit with its applied state, plus orphaned ledger rows.
    pub async fn status(&self) -> LedgerResult<StatusReport> {
        let entries = self.entries().await?;
        let applied: HashMap<&ChangeUnitId, &LedgerEntry> =
            entries.iter().map(|e| (&e.id, e)).collect();

        let units = self
            .project
            .units()
            .iter()
            .map(|unit| {
                let entry = applied.get(&unit.id);
                UnitStatus {
                    id: unit.id.clone(),
                    description: unit.description.clone(),
                    applied: entry.is_some(),
                    applied_at: entry.map(|e| e.applied_at),
                    checksum_drift: entry.is_some_and(|e| e.checksum != unit.checksum()),
                    reversibility: unit.reversibility.level().to_string(),
                    reversibility_reason: unit.reversibility.reason().map(str::to_string),
                }
            })
            .collect();

        let orphaned = entries
            .iter()
            .filter(|e| self.project.unit(&e.id).is_none())
            .cloned()
            .collect();

        let lock_holder = if self
            .db
            .relation_exists(&format!("{}.migration_lock", self.ledger.schema()))
            .await?
        {
            lock::current_holder(
                self.db,
                &self.ledger.lock_table(),
                &self.project.config.lock.name,
            )
            .await?
        } else {
            None
        };

        Ok(StatusReport {
            units,
            orphaned,
            lock_holder,
        })
    }

    /// Full consistency check: ledger against unit files, then every table,
    /// column and index the applied units imply against the live schema.
    pub async fn verify(&self) -> LedgerResult<()> {
        let entries = self.entries().await?;
        let mut problems = self.ledger_problems(&entries);

        let applied: Vec<&ChangeUnit> = entries
            .iter()
            .filter_map(|e| self.project.unit(&e.id))
            .collect();
        let model = SchemaModel::replay(applied);
        for probe in model.probes() {
            let present = match &probe {
                Probe::Table(t) => self.db.relation_exists(&t.to_string()).await?,
                Probe::Column(t, c) => self.db.column_exists(&t.to_string(), c).await?,
                Probe::Index(t, i) => self.db.index_exists(&t.to_string(), i).await?,
            };
            if !present {
                problems.push(format!("{} is missing from the database", describe(&probe)));
            }
        }

        if problems.is_empty() {
            log::info!("Ledger verified: {} applied change units", entries.len());
            Ok(())
        } else {
            Err(LedgerError::LedgerInconsistency { problems })
        }
    }

    /// Remove the lock row whoever holds it. Returns whether one existed.
    pub async fn force_unlock(&self) -> LedgerResult<bool> {
        self.ledger.bootstrap(self.db).await?;
        let removed =
            lock::force_unlock(self.db, &self.ledger, &self.project.config.lock.name).await?;
        if removed {
            log::warn!("Removed migration lock '{}'", self.project.config.lock.name);
        }
        Ok(removed)
    }

    fn warn_if_not_transactional(&self, units: usize, observer: &mut dyn MigrationObserver) {
        if units > 0 && !self.db.capabilities().transactional_ddl {
            observer.notice(&format!(
                "{} does not run DDL transactionally: a unit that fails part-way stays \
                 partly applied and needs manual repair",
                self.db.db_type()
            ));
        }
    }

    fn ensure_consistent(&self, entries: &[LedgerEntry]) -> LedgerResult<()> {
        let problems = self.ledger_problems(entries);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(LedgerError::LedgerInconsistency { problems })
        }
    }

    /// Ledger rows without a unit file, pending units older than the newest
    /// applied one, and applied units whose content changed.
    fn ledger_problems(&self, entries: &[LedgerEntry]) -> Vec<String> {
        let mut problems = Vec::new();
        for entry in entries {
            match self.project.unit(&entry.id) {
                None => problems.push(format!(
                    "{} is recorded as applied but has no change-unit file",
                    entry.id
                )),
                Some(unit) if unit.checksum() != entry.checksum => problems.push(format!(
                    "{} changed after it was applied (checksum {} != {})",
                    entry.id,
                    short(&unit.checksum()),
                    short(&entry.checksum)
                )),
                Some(_) => {}
            }
        }

        if let Some(latest) = entries.last() {
            let applied: HashSet<&ChangeUnitId> = entries.iter().map(|e| &e.id).collect();
            for unit in self.project.units() {
                if unit.id < latest.id && !applied.contains(&unit.id) {
                    problems.push(format!(
                        "{} is pending but sorts before the latest applied unit {}",
                        unit.id, latest.id
                    ));
                }
            }
        }
        problems
    }

    /// Bootstrap, take the lock, run `body`, and always release the lock.
    async fn with_lock<T>(
        &self,
        body: impl Future<Output = LedgerResult<T>>,
    ) -> LedgerResult<T> {
        self.ledger.bootstrap(self.db).await?;
        let held = MigrationLock::acquire(self.db, &self.ledger, &self.project.config.lock).await?;
        let result = body.await;
        let released = held.release(self.db).await;
        match (result, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(e),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                log::warn!("Releasing the migration lock failed: {}", release_err);
                Err(e)
            }
        }
    }
}

fn describe(probe: &Probe) -> String {
    match probe {
        Probe::Table(t) => format!("table {t}"),
        Probe::Column(t, c) => format!("column {t}.{c}"),
        Probe::Index(t, i) => format!("index {i} on {t}"),
    }
}

fn short(checksum: &str) -> &str {
    checksum.get(..12).unwrap_or(checksum)
}

#[cfg(test)]
#[path = "migrator_test.rs"]
mod tests;
