//! Static round-trip lint for change units.
//!
//! Each unit's forward list is replayed against a [`SchemaModel`] built from
//! all earlier units, then its inverse list; the result must equal the model
//! before the unit. Catalog operations are checked for a matching undo in
//! the inverse list, since the schema model cannot see rows.

use crate::change_unit::{ChangeUnit, Direction};
use crate::email_template::EmailTemplateOp;
use crate::operation::Operation;
use crate::reference_value::ReferenceValueOp;
use crate::schema_model::SchemaModel;
use crate::table_name::TableName;
use crate::unit_id::ChangeUnitId;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub unit: ChangeUnitId,
    pub severity: Severity,
    pub message: String,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.severity, self.unit, self.message)
    }
}

/// Lint `units`, which must be sorted by id.
pub fn lint_units(units: &[ChangeUnit]) -> Vec<Finding> {
    let mut findings = Vec::new();
    let mut model = SchemaModel::new();
    for unit in units {
        model = lint_unit(unit, model, &mut findings);
    }
    findings
}

/// Lint one unit against `model` (the state before it) and return the model
/// after its forward list.
pub fn lint_unit(unit: &ChangeUnit, model: SchemaModel, findings: &mut Vec<Finding>) -> SchemaModel {
    let mut push = |severity: Severity, message: String| {
        findings.push(Finding {
            unit: unit.id.clone(),
            severity,
            message,
        })
    };

    let mut before = model;
    let mut after = before.clone();
    for (i, op) in unit.forward.iter().enumerate() {
        for issue in after.apply(op) {
            push(Severity::Error, format!("forward[{i}] {}: {issue}", op.kind()));
        }
    }
    for assumed in after.take_materialized() {
        before.assume(&assumed);
    }

    if unit.reversibility.is_full() && unit.inverse.is_empty() {
        push(
            Severity::Error,
            "reversibility is full but the inverse list is empty".to_string(),
        );
    }
    if let Some(reason) = unit.reversibility.reason() {
        push(
            Severity::Info,
            format!("not fully reversible ({}): {reason}", unit.reversibility.level()),
        );
    }

    let mut restored = after.clone();
    for (i, op) in unit.inverse.iter().enumerate() {
        for issue in restored.apply(op) {
            push(Severity::Error, format!("inverse[{i}] {}: {issue}", op.kind()));
        }
    }
    // Objects first touched by the inverse pre-date the unit too.
    let late = restored.take_materialized();
    for assumed in &late {
        before.assume(assumed);
    }
    for assumed in &late {
        after.assume(assumed);
    }

    if unit.reversibility.is_full() && !unit.inverse.is_empty() {
        for diff in before.diff(&restored) {
            push(Severity::Error, format!("inverse does not restore schema: {diff}"));
        }
        for gap in catalog_gaps(unit) {
            push(Severity::Error, gap);
        }
    }

    for direction in [Direction::Forward, Direction::Inverse] {
        for (i, op) in unit.operations(direction).iter().enumerate() {
            match op {
                Operation::Sql { .. } => push(
                    Severity::Info,
                    format!("{direction}[{i}] raw SQL is not checked: {}", op.summary()),
                ),
                Operation::EmailTemplates(EmailTemplateOp::Create { template, .. }) => {
                    if let Some(m) = template.placeholder_mismatch() {
                        push(
                            Severity::Warning,
                            format!(
                                "{direction}[{i}] template {} placeholders differ: text-only {:?}, html-only {:?}",
                                template.name, m.only_in_text, m.only_in_html
                            ),
                        );
                    }
                }
                _ => {}
            }
        }
    }

    after
}

/// Catalog changes in the forward list without a matching undo in the
/// inverse list.
fn catalog_gaps(unit: &ChangeUnit) -> Vec<String> {
    let mut gaps = Vec::new();
    let inverse_rv: Vec<&ReferenceValueOp> = unit
        .inverse
        .iter()
        .filter_map(|op| match op {
            Operation::ReferenceValues(rv) => Some(rv),
            _ => None,
        })
        .collect();
    let inverse_et: Vec<&EmailTemplateOp> = unit
        .inverse
        .iter()
        .filter_map(|op| match op {
            Operation::EmailTemplates(et) => Some(et),
            _ => None,
        })
        .collect();

    let store_dropped = |table: &TableName| {
        inverse_rv
            .iter()
            .any(|op| matches!(op, ReferenceValueOp::DropStore { table: t } if t == table))
    };
    let removes = |enum_type: &str, code: &str| {
        inverse_rv.iter().any(|op| match op {
            ReferenceValueOp::Remove {
                enum_type: e,
                codes,
                all,
                ..
            } => e == enum_type && (*all || codes.iter().any(|c| c == code)),
            ReferenceValueOp::RestoreLegacyTable { enum_type: e, .. } => e == enum_type,
            _ => false,
        })
    };
    let reseeds = |enum_type: &str, code: &str| {
        inverse_rv.iter().any(|op| match op {
            ReferenceValueOp::Seed {
                enum_type: e,
                values,
                ..
            } => e == enum_type && values.iter().any(|v| v.code == code),
            _ => false,
        })
    };

    for op in &unit.forward {
        match op {
            Operation::ReferenceValues(rv) => match rv {
                ReferenceValueOp::Seed {
                    enum_type,
                    values,
                    table,
                } => {
                    for v in values {
                        if !removes(enum_type, &v.code) && !store_dropped(table) {
                            gaps.push(format!(
                                "seeded {}.{} is not removed by the inverse",
                                enum_type, v.code
                            ));
                        }
                    }
                }
                ReferenceValueOp::Remove {
                    enum_type,
                    codes,
                    all,
                    ..
                } => {
                    let restored = if *all {
                        inverse_rv.iter().any(|op| {
                            matches!(op, ReferenceValueOp::Seed { enum_type: e, .. } if e == enum_type)
                        })
                    } else {
                        codes.iter().all(|c| reseeds(enum_type, c))
                    };
                    if !restored {
                        gaps.push(format!(
                            "removed {enum_type} rows are not re-seeded by the inverse"
                        ));
                    }
                }
                ReferenceValueOp::Deprecate {
                    enum_type, code, ..
                } => {
                    let undone = inverse_rv.iter().any(|op| {
                        matches!(op, ReferenceValueOp::Reactivate { enum_type: e, code: c, .. }
                            if e == enum_type && c == code)
                    });
                    if !undone {
                        gaps.push(format!(
                            "deprecated {enum_type}.{code} is not reactivated by the inverse"
                        ));
                    }
                }
                ReferenceValueOp::Reactivate {
                    enum_type, code, ..
                } => {
                    let undone = inverse_rv.iter().any(|op| {
                        matches!(op, ReferenceValueOp::Deprecate { enum_type: e, code: c, .. }
                            if e == enum_type && c == code)
                    });
                    if !undone {
                        gaps.push(format!(
                            "reactivated {enum_type}.{code} is not deprecated again by the inverse"
                        ));
                    }
                }
                ReferenceValueOp::Update {
                    enum_type,
                    code,
                    set,
                    ..
                } => {
                    let current = set.code.as_deref().unwrap_or(code);
                    let undone = inverse_rv.iter().any(|op| {
                        matches!(op, ReferenceValueOp::Update { enum_type: e, code: c, .. }
                            if e == enum_type && c == current)
                    });
                    if !undone {
                        gaps.push(format!(
                            "update of {enum_type}.{code} has no inverse update of {enum_type}.{current}"
                        ));
                    }
                }
                ReferenceValueOp::FoldLegacyTable {
                    legacy_table,
                    enum_type,
                    ..
                } => {
                    let undone = inverse_rv.iter().any(|op| {
                        matches!(op, ReferenceValueOp::RestoreLegacyTable { enum_type: e, legacy, .. }
                            if e == enum_type && legacy.table == *legacy_table)
                    });
                    if !undone {
                        gaps.push(format!(
                            "fold of {legacy_table} has no restore_legacy_table in the inverse"
                        ));
                    }
                }
                _ => {}
            },
            Operation::EmailTemplates(et) => match et {
                EmailTemplateOp::Create { template, table } => {
                    let undone = inverse_et.iter().any(|op| match op {
                        EmailTemplateOp::Remove { names, .. } => names.contains(&template.name),
                        EmailTemplateOp::DropStore { table: t } => t == table,
                        _ => false,
                    });
                    if !undone {
                        gaps.push(format!(
                            "created template {} is not removed by the inverse",
                            template.name
                        ));
                    }
                }
                EmailTemplateOp::Remove { names, .. } => {
                    for name in names {
                        let undone = inverse_et.iter().any(|op| {
                            matches!(op, EmailTemplateOp::Create { template, .. } if template.name == *name)
                        });
                        if !undone {
                            gaps.push(format!(
                                "removed template {name} is not re-created by the inverse"
                            ));
                        }
                    }
                }
                EmailTemplateOp::Rename { .. } | EmailTemplateOp::RenameAll { .. } => {
                    for (from, to) in et.renames() {
                        let undone = inverse_et
                            .iter()
                            .flat_map(|op| op.renames())
                            .any(|(f, t)| f == to && t == from);
                        if !undone {
                            gaps.push(format!(
                                "rename {from} -> {to} is not renamed back by the inverse"
                            ));
                        }
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    gaps
}

#[cfg(test)]
#[path = "lint_test.rs"]
mod tests;
