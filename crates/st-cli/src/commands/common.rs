//! Shared utilities for CLI commands

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use st_core::{ChangeUnit, Config, Direction, Project};
use st_db::DuckDbBackend;
use st_ledger::{open_when_free, ExecutionReport, LedgerError, MigrationObserver};
use std::fmt;
use std::path::Path;

use crate::cli::GlobalArgs;

/// Error type representing a non-zero process exit code.
///
/// Use `return Err(ExitCode(N).into())` instead of `std::process::exit(N)`
/// so that RAII destructors run and the migration lock is released.
#[derive(Debug)]
pub(crate) struct ExitCode(pub(crate) i32);

impl fmt::Display for ExitCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control flow only; the message was already printed.
        write!(f, "")
    }
}

impl std::error::Error for ExitCode {}

/// Process exit code for a ledger failure: 2 inconsistency, 3 lock
/// contention, 4 database or operation error, 1 anything else.
pub(crate) fn exit_code_for(err: &LedgerError) -> i32 {
    match err {
        LedgerError::LedgerInconsistency { .. } => 2,
        LedgerError::LockContention { .. } => 3,
        LedgerError::OperationFailure { .. }
        | LedgerError::Bookkeeping { .. }
        | LedgerError::Db(_) => 4,
        LedgerError::UnknownTarget { .. }
        | LedgerError::NonReversible { .. }
        | LedgerError::Core(_) => 1,
    }
}

/// Print a ledger failure and turn it into its exit code.
pub(crate) fn fail(err: LedgerError) -> anyhow::Error {
    eprintln!("Error: {err}");
    ExitCode(exit_code_for(&err)).into()
}

pub(crate) fn load_project(global: &GlobalArgs) -> Result<Project> {
    Project::load(&global.project_dir).context("Failed to load project")
}

/// Open the database of the resolved target. Relative paths are taken from
/// the project root. While another process has the file open, retry with the
/// lock backoff and exit 3 once the lock timeout passes.
pub(crate) async fn open_database(
    project: &Project,
    global: &GlobalArgs,
) -> Result<DuckDbBackend> {
    let target = Config::resolve_target(global.target.as_deref());
    let mut db_config = project
        .config
        .get_database_config(target.as_deref())
        .context("Failed to get database configuration")?;
    if db_config.path != ":memory:" && Path::new(&db_config.path).is_relative() {
        db_config.path = project.root.join(&db_config.path).display().to_string();
    }
    verbose(
        global,
        &format!(
            "Using {} database {} (target: {})",
            db_config.db_type,
            db_config.path,
            target.as_deref().unwrap_or("default")
        ),
    );
    open_when_free(&project.config.lock, || DuckDbBackend::from_config(&db_config))
        .await
        .map_err(|err| match err {
            LedgerError::LockContention { .. } => fail(err),
            other => anyhow::Error::new(other).context("Failed to connect to database"),
        })
}

/// Print a `[verbose]` line when `--verbose` is set.
pub(crate) fn verbose(global: &GlobalArgs, msg: &str) {
    if global.verbose {
        eprintln!("[verbose] {}", msg);
    }
}

/// Calculate column widths for a text table
pub(crate) fn calculate_column_widths(headers: &[&str], rows: &[Vec<String>]) -> Vec<usize> {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }
    widths
}

/// Print a left-aligned table with a dashed separator under the header.
pub(crate) fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    let widths = calculate_column_widths(headers, rows);

    let header_parts: Vec<String> = headers
        .iter()
        .zip(&widths)
        .map(|(h, &w)| format!("{:<width$}", h, width = w))
        .collect();
    println!("{}", header_parts.join("  ").trim_end());

    let sep_parts: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep_parts.join("  "));

    for row in rows {
        let row_parts: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, &w)| format!("{:<width$}", cell, width = w))
            .collect();
        println!("{}", row_parts.join("  ").trim_end());
    }
}

/// Progress bar over a batch of change units.
pub(crate) struct ProgressObserver {
    bar: Option<ProgressBar>,
    verbose: bool,
}

impl ProgressObserver {
    pub(crate) fn new(global: &GlobalArgs) -> Self {
        Self {
            bar: None,
            verbose: global.verbose,
        }
    }

    pub(crate) fn finish(&self) {
        if let Some(pb) = &self.bar {
            pb.finish_and_clear();
        }
    }
}

impl MigrationObserver for ProgressObserver {
    fn planned(&mut self, total: usize) {
        if total == 0 {
            return;
        }
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        self.bar = Some(pb);
    }

    fn unit_started(&mut self, unit: &ChangeUnit, direction: Direction) {
        if let Some(pb) = &self.bar {
            pb.set_message(unit.id.to_string());
            if self.verbose {
                pb.println(format!(
                    "[verbose] {} {} ({} operations)",
                    direction,
                    unit.id,
                    unit.operations(direction).len()
                ));
            }
        }
    }

    fn notice(&mut self, message: &str) {
        // Not pb.println: that is dropped when stderr is not a terminal.
        match &self.bar {
            Some(pb) => pb.suspend(|| eprintln!("Warning: {}", message)),
            None => eprintln!("Warning: {}", message),
        }
    }

    fn unit_finished(&mut self, report: &ExecutionReport) {
        if let Some(pb) = &self.bar {
            pb.println(format!(
                "  ✓ {} [{}ms]",
                report.unit, report.execution_ms
            ));
            pb.inc(1);
        }
    }
}

#[cfg(test)]
#[path = "common_test.rs"]
mod tests;
