//! Change units: one migration with hand-authored forward and inverse
//! operation lists.

use crate::checksum::compute_checksum;
use crate::email_template::EmailTemplateOp;
use crate::error::{CoreError, CoreResult};
use crate::operation::Operation;
use crate::unit_id::ChangeUnitId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Which operation list of a unit to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Inverse,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Inverse => write!(f, "inverse"),
        }
    }
}

/// How faithfully the inverse list undoes the forward list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Reversibility {
    /// Forward then inverse restores the prior observable state.
    #[default]
    Full,
    /// The inverse restores structure but not everything (e.g. overwritten
    /// template bodies).
    Partial { reason: String },
    /// The inverse is a no-op or absent.
    None { reason: String },
}

impl Reversibility {
    /// Level keyword as stored in the ledger and written in unit files.
    pub fn level(&self) -> &'static str {
        match self {
            Reversibility::Full => "full",
            Reversibility::Partial { .. } => "partial",
            Reversibility::None { .. } => "none",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Reversibility::Full => None,
            Reversibility::Partial { reason } | Reversibility::None { reason } => Some(reason),
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Reversibility::Full)
    }
}

impl fmt::Display for Reversibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.reason() {
            Some(reason) => write!(f, "{} ({})", self.level(), reason),
            None => f.write_str(self.level()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ReversibilityLevel {
    #[default]
    Full,
    Partial,
    None,
}

impl ReversibilityLevel {
    fn as_str(self) -> &'static str {
        match self {
            ReversibilityLevel::Full => "full",
            ReversibilityLevel::Partial => "partial",
            ReversibilityLevel::None => "none",
        }
    }
}

/// On-disk shape of a change-unit file (`<id>.yml`).
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ChangeUnitFile {
    #[serde(default)]
    description: String,
    #[serde(default)]
    reversibility: ReversibilityLevel,
    /// Required when `reversibility` is `partial` or `none`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    forward: Vec<Operation>,
    #[serde(default)]
    inverse: Vec<Operation>,
}

/// Canonical content hashed for drift detection. The id and file path are
/// not part of it.
#[derive(Serialize)]
struct CanonicalUnit<'a> {
    description: &'a str,
    reversibility: &'a str,
    reason: Option<&'a str>,
    forward: &'a [Operation],
    inverse: &'a [Operation],
}

/// One reversible, atomically-applied migration.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeUnit {
    pub id: ChangeUnitId,
    pub description: String,
    pub reversibility: Reversibility,
    pub forward: Vec<Operation>,
    pub inverse: Vec<Operation>,
    /// Source file, when loaded from disk.
    pub path: Option<PathBuf>,
}

impl ChangeUnit {
    pub fn new(id: ChangeUnitId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            reversibility: Reversibility::Full,
            forward: Vec::new(),
            inverse: Vec::new(),
            path: None,
        }
    }

    /// Append a forward operation.
    pub fn up(mut self, op: Operation) -> Self {
        self.forward.push(op);
        self
    }

    /// Append an inverse operation. Inverse operations run in the order they
    /// are added.
    pub fn down(mut self, op: Operation) -> Self {
        self.inverse.push(op);
        self
    }

    pub fn with_reversibility(mut self, reversibility: Reversibility) -> Self {
        self.reversibility = reversibility;
        self
    }

    /// Operations for a direction, in execution order.
    pub fn operations(&self, direction: Direction) -> &[Operation] {
        match direction {
            Direction::Forward => &self.forward,
            Direction::Inverse => &self.inverse,
        }
    }

    /// SHA-256 of the canonical JSON serialization of the unit's content.
    pub fn checksum(&self) -> String {
        let canonical = CanonicalUnit {
            description: &self.description,
            reversibility: self.reversibility.level(),
            reason: self.reversibility.reason(),
            forward: &self.forward,
            inverse: &self.inverse,
        };
        // Operations hold only strings, numbers and string-keyed maps, so
        // serialization cannot fail.
        let json = serde_json::to_string(&canonical).unwrap_or_default();
        compute_checksum(&json)
    }

    /// Parse a unit from YAML text.
    pub fn from_yaml(id: ChangeUnitId, text: &str, path: Option<&Path>) -> CoreResult<Self> {
        let file: ChangeUnitFile =
            serde_yaml::from_str(text).map_err(|e| CoreError::UnitParseError {
                path: path
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| id.to_string()),
                details: e.to_string(),
            })?;

        let reason = file.reason.filter(|r| !r.trim().is_empty());
        let reversibility = match (file.reversibility, reason) {
            (ReversibilityLevel::Full, _) => Reversibility::Full,
            (ReversibilityLevel::Partial, Some(reason)) => Reversibility::Partial { reason },
            (ReversibilityLevel::None, Some(reason)) => Reversibility::None { reason },
            (level, None) => {
                return Err(CoreError::InvalidUnit {
                    id: id.to_string(),
                    reason: format!("reversibility '{}' requires a `reason`", level.as_str()),
                })
            }
        };

        let unit = Self {
            id,
            description: file.description,
            reversibility,
            forward: file.forward,
            inverse: file.inverse,
            path: path.map(Path::to_path_buf),
        };
        unit.validate()?;
        Ok(unit)
    }

    /// Load a unit from `<id>.yml`. The id is the file stem.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| CoreError::UnitParseError {
                path: path.display().to_string(),
                details: "file name is not valid UTF-8".to_string(),
            })?;
        let id = ChangeUnitId::parse(stem)?;
        let text = std::fs::read_to_string(path).map_err(|e| CoreError::IoWithPath {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(id, &text, Some(path))
    }

    /// Serialize back to the change-unit file format.
    pub fn to_yaml(&self) -> CoreResult<String> {
        let file = ChangeUnitFile {
            description: self.description.clone(),
            reversibility: match self.reversibility {
                Reversibility::Full => ReversibilityLevel::Full,
                Reversibility::Partial { .. } => ReversibilityLevel::Partial,
                Reversibility::None { .. } => ReversibilityLevel::None,
            },
            reason: self.reversibility.reason().map(str::to_string),
            forward: self.forward.clone(),
            inverse: self.inverse.clone(),
        };
        Ok(serde_yaml::to_string(&file)?)
    }

    /// Structural checks that need no database.
    pub fn validate(&self) -> CoreResult<()> {
        let unit_err = |reason: String| CoreError::InvalidUnit {
            id: self.id.to_string(),
            reason,
        };

        if self.forward.is_empty() {
            return Err(unit_err("forward has no operations".to_string()));
        }
        if let Some(reason) = self.reversibility.reason() {
            if reason.trim().is_empty() {
                return Err(unit_err(format!(
                    "reversibility '{}' requires a reason",
                    self.reversibility.level()
                )));
            }
        }

        for direction in [Direction::Forward, Direction::Inverse] {
            for (i, op) in self.operations(direction).iter().enumerate() {
                op.validate()
                    .map_err(|e| unit_err(format!("{direction}[{i}] {}: {e}", op.kind())))?;
            }
        }

        if self.reversibility.is_full() {
            let restored: HashSet<&str> = self
                .inverse
                .iter()
                .filter_map(content_update_target)
                .collect();
            if let Some(name) = self
                .forward
                .iter()
                .filter_map(content_update_target)
                .find(|n| !restored.contains(n))
            {
                return Err(unit_err(format!(
                    "update_content of '{name}' has no inverse restoring the prior content; \
                     supply it or mark the unit `reversibility: partial` with a reason"
                )));
            }
        }
        Ok(())
    }
}

fn content_update_target(op: &Operation) -> Option<&str> {
    match op {
        Operation::EmailTemplates(EmailTemplateOp::UpdateContent { name, .. }) => {
            Some(name.as_str())
        }
        _ => None,
    }
}

/// Skeleton written by `strata migrate new`.
pub fn skeleton(description: &str) -> String {
    format!(
        r#"description: "{}"
# reversibility: full | partial | none (partial/none need a `reason:`)
forward:
  - op: sql
    sql: SELECT 1
inverse:
  - op: sql
    sql: SELECT 1
"#,
        description.replace('\\', "\\\\").replace('"', "\\\"")
    )
}

#[cfg(test)]
#[path = "change_unit_test.rs"]
mod tests;
