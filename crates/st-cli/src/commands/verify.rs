//! `migrate verify`: ledger and live schema consistency

use anyhow::Result;
use st_ledger::Migrator;

use crate::cli::GlobalArgs;
use crate::commands::common::{self, load_project, open_database};

/// Execute the verify command
pub async fn execute(global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let db = open_database(&project, global).await?;
    let migrator = Migrator::new(&db, &project);

    migrator.verify().await.map_err(common::fail)?;
    let applied = migrator.entries().await.map_err(common::fail)?.len();
    println!(
        "Ledger consistent: {} of {} change units applied, schema matches",
        applied,
        project.units().len()
    );
    Ok(())
}
