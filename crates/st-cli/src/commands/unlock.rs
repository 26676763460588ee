//! `migrate unlock --force`: remove a stale lock row

use anyhow::Result;
use st_ledger::Migrator;

use crate::cli::{GlobalArgs, UnlockArgs};
use crate::commands::common::{self, load_project, open_database, ExitCode};

/// Execute the unlock command
pub async fn execute(args: &UnlockArgs, global: &GlobalArgs) -> Result<()> {
    if !args.force {
        eprintln!(
            "Refusing to unlock without --force: make sure no migration is running first."
        );
        return Err(ExitCode(1).into());
    }

    let project = load_project(global)?;
    let db = open_database(&project, global).await?;
    let migrator = Migrator::new(&db, &project);

    if migrator.force_unlock().await.map_err(common::fail)? {
        println!("Removed migration lock '{}'", project.config.lock.name);
    } else {
        println!("No migration lock '{}' was held", project.config.lock.name);
    }
    Ok(())
}
