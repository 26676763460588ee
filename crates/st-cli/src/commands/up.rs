//! `migrate up`: apply pending change units

use anyhow::Result;
use st_core::ChangeUnitId;
use st_ledger::Migrator;
use std::time::Instant;

use crate::cli::{GlobalArgs, UpArgs};
use crate::commands::common::{self, load_project, open_database, ProgressObserver};

/// Execute the up command
pub async fn execute(args: &UpArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let to = args
        .to
        .as_deref()
        .map(ChangeUnitId::parse)
        .transpose()
        .map_err(|e| common::fail(e.into()))?;
    let db = open_database(&project, global).await?;
    let migrator = Migrator::new(&db, &project);

    common::verbose(
        global,
        &format!(
            "{} change units known in {}",
            project.units().len(),
            project.root.display()
        ),
    );

    let start_time = Instant::now();
    let mut progress = ProgressObserver::new(global);
    let result = migrator.apply_pending(to.as_ref(), &mut progress).await;
    progress.finish();
    let reports = result.map_err(common::fail)?;

    if reports.is_empty() {
        println!("Nothing to apply: the database is up to date.");
        return Ok(());
    }
    for report in &reports {
        println!("  ✓ {} [{}ms]", report.unit, report.execution_ms);
    }
    println!();
    println!(
        "Applied {} change unit(s) in {}ms",
        reports.len(),
        start_time.elapsed().as_millis()
    );
    Ok(())
}
