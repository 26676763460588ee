//! `migrate status`: applied and pending change units

use anyhow::{Context, Result};
use st_ledger::{Migrator, StatusReport};

use crate::cli::{GlobalArgs, OutputFormat, StatusArgs};
use crate::commands::common::{self, load_project, open_database, print_table};

/// Execute the status command
pub async fn execute(args: &StatusArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let db = open_database(&project, global).await?;
    let report = Migrator::new(&db, &project)
        .status()
        .await
        .map_err(common::fail)?;

    match args.output {
        OutputFormat::Json => {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{json}");
        }
        OutputFormat::Text => print_text(&report),
    }
    Ok(())
}

/// One row per unit: state, reversibility and applied time.
pub(crate) fn status_rows(report: &StatusReport) -> Vec<Vec<String>> {
    report
        .units
        .iter()
        .map(|u| {
            let state = match (u.applied, u.checksum_drift) {
                (true, true) => "applied (changed)",
                (true, false) => "applied",
                (false, _) => "pending",
            };
            let reversibility = match &u.reversibility_reason {
                Some(reason) => format!("{} ({})", u.reversibility, reason),
                None => u.reversibility.clone(),
            };
            vec![
                u.id.to_string(),
                state.to_string(),
                reversibility,
                u.applied_at
                    .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

fn print_text(report: &StatusReport) {
    if report.units.is_empty() {
        println!("No change units found.");
    } else {
        print_table(
            &["CHANGE UNIT", "STATE", "REVERSIBILITY", "APPLIED AT"],
            &status_rows(report),
        );
    }

    if !report.orphaned.is_empty() {
        println!();
        println!("Applied but missing a change-unit file:");
        for entry in &report.orphaned {
            println!("  ! {} ({})", entry.id, entry.description);
        }
    }

    if let Some(holder) = &report.lock_holder {
        println!();
        println!("Migration lock held by {holder}");
    }

    println!();
    println!(
        "{} applied, {} pending",
        report.units.len() - report.pending().count(),
        report.pending().count()
    );
}

#[cfg(test)]
#[path = "status_test.rs"]
mod tests;
