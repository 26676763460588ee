//! Project loading and change-unit discovery

use crate::change_unit::ChangeUnit;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::unit_id::ChangeUnitId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// A loaded Strata project: config plus every change unit, sorted by id.
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub config: Config,
    units: Vec<ChangeUnit>,
}

impl Project {
    /// Load a project from a directory
    pub fn load(path: &Path) -> CoreResult<Self> {
        let root = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        if !root.exists() {
            return Err(CoreError::ProjectNotFound {
                path: root.display().to_string(),
            });
        }

        let config = Config::load_from_dir(&root)?;
        let units = discover_units(&config.migration_paths_absolute(&root))?;
        log::debug!(
            "Loaded project '{}' with {} change units",
            config.name,
            units.len()
        );
        Ok(Self {
            root,
            config,
            units,
        })
    }

    /// Build a project from units constructed in code.
    pub fn from_units(root: PathBuf, config: Config, mut units: Vec<ChangeUnit>) -> CoreResult<Self> {
        units.sort_by(|a, b| a.id.cmp(&b.id));
        check_duplicates(&units)?;
        Ok(Self {
            root,
            config,
            units,
        })
    }

    /// All units in ascending id order.
    pub fn units(&self) -> &[ChangeUnit] {
        &self.units
    }

    pub fn unit(&self, id: &ChangeUnitId) -> Option<&ChangeUnit> {
        self.units
            .binary_search_by(|u| u.id.cmp(id))
            .ok()
            .map(|i| &self.units[i])
    }

    /// First configured migration directory, where `migrate new` writes.
    pub fn primary_migration_dir(&self) -> PathBuf {
        self.config
            .migration_paths_absolute(&self.root)
            .into_iter()
            .next()
            .unwrap_or_else(|| self.root.join("migrations"))
    }
}

/// Load every `*.yml`/`*.yaml` under `dirs` (recursively) as a change unit.
///
/// Missing directories are skipped. The result is sorted by id; two files
/// with the same id are an error.
pub fn discover_units(dirs: &[PathBuf]) -> CoreResult<Vec<ChangeUnit>> {
    let mut units = Vec::new();
    for dir in dirs {
        if !dir.exists() {
            log::debug!("Migration path {} does not exist, skipping", dir.display());
            continue;
        }
        discover_recursive(dir, &mut units)?;
    }
    units.sort_by(|a, b| a.id.cmp(&b.id));
    check_duplicates(&units)?;
    Ok(units)
}

fn discover_recursive(dir: &Path, units: &mut Vec<ChangeUnit>) -> CoreResult<()> {
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| CoreError::IoWithPath {
        path: dir.display().to_string(),
        source: e,
    })? {
        let entry = entry.map_err(|e| CoreError::IoWithPath {
            path: dir.display().to_string(),
            source: e,
        })?;
        entries.push(entry.path());
    }
    entries.sort();

    for path in entries {
        if path.is_dir() {
            discover_recursive(&path, units)?;
            continue;
        }
        if !path.extension().is_some_and(|e| e == "yml" || e == "yaml") {
            continue;
        }
        units.push(ChangeUnit::load(&path)?);
    }
    Ok(())
}

fn check_duplicates(sorted: &[ChangeUnit]) -> CoreResult<()> {
    let mut seen: HashMap<&ChangeUnitId, &ChangeUnit> = HashMap::new();
    for unit in sorted {
        if let Some(first) = seen.insert(&unit.id, unit) {
            let describe = |u: &ChangeUnit| {
                u.path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "<in-memory>".to_string())
            };
            return Err(CoreError::DuplicateUnit {
                id: unit.id.to_string(),
                path1: describe(first),
                path2: describe(unit),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "project_test.rs"]
mod tests;
