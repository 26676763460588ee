//! `migrate new`: write a change-unit skeleton

use anyhow::{Context, Result};
use chrono::Utc;
use st_core::change_unit::skeleton;
use st_core::ChangeUnitId;
use std::fs;

use crate::cli::{GlobalArgs, NewArgs};
use crate::commands::common::{self, load_project};

/// Execute the new command
pub async fn execute(args: &NewArgs, global: &GlobalArgs) -> Result<()> {
    let project = load_project(global)?;
    let id = ChangeUnitId::generate(&args.slug, Utc::now()).map_err(|e| common::fail(e.into()))?;

    if project.units().iter().any(|u| u.id.slug() == id.slug()) {
        eprintln!("Warning: another change unit already uses the slug '{}'", id.slug());
    }

    let dir = project.primary_migration_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(format!("{id}.yml"));
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }

    common::verbose(global, &format!("Writing skeleton for {id}"));
    fs::write(&path, skeleton(&args.slug))
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(())
}
