//! `migrate down`: roll back applied change units

use anyhow::Result;
use st_core::ChangeUnitId;
use st_ledger::{Migrator, RollbackTarget};
use std::time::Instant;

use crate::cli::{DownArgs, GlobalArgs};
use crate::commands::common::{self, load_project, open_database, ProgressObserver};

/// Without `--steps` or `--to`, roll back the latest unit only.
pub(crate) fn rollback_target(args: &DownArgs) -> Result<RollbackTarget> {
    match (&args.to, args.steps) {
        (Some(to), _) => {
            let id = ChangeUnitId::parse(to.as_str()).map_err(|e| common::fail(e.into()))?;
            Ok(RollbackTarget::To(id))
        }
        (None, Some(steps)) => Ok(RollbackTarget::Steps(steps)),
        (None, None) => Ok(RollbackTarget::Steps(1)),
    }
}

/// Execute the down command
pub async fn execute(args: &DownArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let target = rollback_target(args)?;
    let db = open_database(&project, global).await?;
    let migrator = Migrator::new(&db, &project);

    common::verbose(global, &format!("Rolling back: {:?}", target));
    if args.allow_irreversible {
        common::verbose(global, "Irreversible units may be rolled back");
    }

    let start_time = Instant::now();
    let mut progress = ProgressObserver::new(global);
    let result = migrator
        .rollback(&target, args.allow_irreversible, &mut progress)
        .await;
    progress.finish();
    let reports = result.map_err(common::fail)?;

    if reports.is_empty() {
        println!("Nothing to roll back.");
        return Ok(());
    }
    for report in &reports {
        println!("  ↩ {} [{}ms]", report.unit, report.execution_ms);
    }
    println!();
    println!(
        "Rolled back {} change unit(s) in {}ms",
        reports.len(),
        start_time.elapsed().as_millis()
    );
    Ok(())
}
