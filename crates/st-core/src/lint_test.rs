use super::*;
use crate::change_unit::Reversibility;
use crate::email_template::{EmailTemplate, TemplateName};
use crate::operation::{ColumnDef, CreateTable};
use crate::reference_value::{EnumType, ReferenceValue, REFERENCE_VALUES_TABLE};

fn id(s: &str) -> ChangeUnitId {
    ChangeUnitId::parse(s).unwrap()
}

fn store() -> TableName {
    TableName::from(REFERENCE_VALUES_TABLE)
}

fn templates() -> TableName {
    TableName::from(crate::email_template::EMAIL_TEMPLATES_TABLE)
}

fn errors(findings: &[Finding]) -> Vec<&str> {
    findings
        .iter()
        .filter(|f| f.severity == Severity::Error)
        .map(|f| f.message.as_str())
        .collect()
}

fn create_store_unit() -> ChangeUnit {
    ChangeUnit::new(id("20250101000000_reference_store"), "store")
        .up(Operation::CreateSchema {
            name: "reference_data".into(),
            if_not_exists: true,
        })
        .up(Operation::ReferenceValues(ReferenceValueOp::CreateStore {
            table: store(),
        }))
        .down(Operation::ReferenceValues(ReferenceValueOp::DropStore {
            table: store(),
        }))
        .down(Operation::DropSchema {
            name: "reference_data".into(),
        })
}

fn seed(codes: &[(&str, i32)]) -> Operation {
    Operation::ReferenceValues(ReferenceValueOp::Seed {
        enum_type: EnumType::new("EventCategory"),
        values: codes
            .iter()
            .map(|(c, v)| ReferenceValue::new(c, *v))
            .collect(),
        table: store(),
    })
}

fn remove(codes: &[&str]) -> Operation {
    Operation::ReferenceValues(ReferenceValueOp::Remove {
        enum_type: EnumType::new("EventCategory"),
        codes: codes.iter().map(|c| c.to_string()).collect(),
        all: false,
        table: store(),
    })
}

#[test]
fn test_clean_units_have_no_errors() {
    let seed_unit = ChangeUnit::new(id("20250102000000_seed_categories"), "seed")
        .up(seed(&[("Religious", 0), ("Cultural", 1)]))
        .down(remove(&["Religious", "Cultural"]));
    let findings = lint_units(&[create_store_unit(), seed_unit]);
    assert!(errors(&findings).is_empty(), "{findings:?}");
}

#[test]
fn test_missing_drop_in_inverse() {
    let unit = ChangeUnit::new(id("20250101000000_reference_store"), "store")
        .up(Operation::ReferenceValues(ReferenceValueOp::CreateStore {
            table: store(),
        }))
        .down(Operation::Sql {
            sql: "SELECT 1".into(),
            affects: vec![],
        });
    let findings = lint_units(&[unit]);
    assert_eq!(
        errors(&findings),
        vec!["inverse does not restore schema: table reference_data.reference_values was left behind"]
    );
    assert!(findings
        .iter()
        .any(|f| f.severity == Severity::Info && f.message.contains("raw SQL")));
}

#[test]
fn test_inverse_order_matters() {
    // Dropping the schema before the table it contains.
    let unit = ChangeUnit::new(id("20250101000000_reference_store"), "store")
        .up(Operation::CreateSchema {
            name: "reference_data".into(),
            if_not_exists: false,
        })
        .up(Operation::ReferenceValues(ReferenceValueOp::CreateStore {
            table: store(),
        }))
        .down(Operation::DropSchema {
            name: "reference_data".into(),
        })
        .down(Operation::ReferenceValues(ReferenceValueOp::DropStore {
            table: store(),
        }));
    let findings = lint_units(&[unit]);
    assert_eq!(
        errors(&findings),
        vec!["inverse[0] drop_schema: schema reference_data still contains table reference_data.reference_values"]
    );
}

#[test]
fn test_full_unit_with_empty_inverse() {
    let unit = ChangeUnit::new(id("20250102000000_seed_categories"), "seed")
        .up(seed(&[("Religious", 0)]));
    let findings = lint_units(&[create_store_unit(), unit]);
    assert_eq!(
        errors(&findings),
        vec!["reversibility is full but the inverse list is empty"]
    );
}

#[test]
fn test_seed_without_remove() {
    let unit = ChangeUnit::new(id("20250102000000_seed_categories"), "seed")
        .up(seed(&[("Religious", 0), ("Cultural", 1)]))
        .down(remove(&["Religious"]));
    let findings = lint_units(&[create_store_unit(), unit]);
    assert_eq!(
        errors(&findings),
        vec!["seeded EventCategory.Cultural is not removed by the inverse"]
    );
}

#[test]
fn test_non_reversible_units_skip_round_trip() {
    let unit = ChangeUnit::new(id("20250102000000_seed_categories"), "seed")
        .up(seed(&[("Religious", 0)]))
        .with_reversibility(Reversibility::None {
            reason: "one-way data fix".into(),
        });
    let findings = lint_units(&[create_store_unit(), unit]);
    assert!(errors(&findings).is_empty());
    assert!(findings
        .iter()
        .any(|f| f.severity == Severity::Info && f.message.contains("one-way data fix")));
}

#[test]
fn test_rename_must_be_reversed() {
    let rename = |from: &str, to: &str| {
        Operation::EmailTemplates(EmailTemplateOp::Rename {
            from: TemplateName::new(from),
            to: TemplateName::new(to),
            table: templates(),
        })
    };
    let good = ChangeUnit::new(id("20260123013633_rename_templates"), "rename")
        .up(rename("event-approved", "template-event-approval"))
        .down(rename("template-event-approval", "event-approved"));
    assert!(errors(&lint_units(&[good])).is_empty());

    let bad = ChangeUnit::new(id("20260123013633_rename_templates"), "rename")
        .up(rename("event-approved", "template-event-approval"))
        .down(rename("template-event-approval", "event-approval"));
    assert_eq!(
        errors(&lint_units(&[bad])),
        vec!["rename event-approved -> template-event-approval is not renamed back by the inverse"]
    );
}

#[test]
fn test_placeholder_mismatch_is_a_warning() {
    let template = EmailTemplate::new(
        "event-approved",
        "Approved",
        "{{EventTitle}} {{EventUrl}}",
        "<b>{{EventTitle}}</b>",
    );
    let unit = ChangeUnit::new(id("20260120235127_add_event_approved"), "template")
        .up(Operation::EmailTemplates(EmailTemplateOp::Create {
            template,
            table: templates(),
        }))
        .down(Operation::EmailTemplates(EmailTemplateOp::Remove {
            names: vec![TemplateName::new("event-approved")],
            table: templates(),
        }));
    let findings = lint_units(&[unit]);
    assert!(errors(&findings).is_empty());
    let warning = findings
        .iter()
        .find(|f| f.severity == Severity::Warning)
        .unwrap();
    assert!(warning.message.contains("text-only {\"EventUrl\"}"));
}

#[test]
fn test_fold_and_restore_round_trip() {
    let mut legacy = CreateTable::new(
        "main.event_categories",
        vec![
            ColumnDef::new("id", "UUID").not_null(),
            ColumnDef::new("code", "VARCHAR(100)").not_null(),
            ColumnDef::new("name", "VARCHAR(255)").not_null(),
            ColumnDef::new("description", "VARCHAR"),
            ColumnDef::new("display_order", "INTEGER").not_null(),
            ColumnDef::new("is_active", "BOOLEAN").not_null(),
            ColumnDef::new("icon_url", "VARCHAR(500)"),
            ColumnDef::new("created_at", "TIMESTAMP").not_null(),
            ColumnDef::new("updated_at", "TIMESTAMP").not_null(),
        ],
    );
    legacy.primary_key = vec!["id".into()];

    let create_legacy = ChangeUnit::new(id("20240101000000_event_categories"), "legacy")
        .up(Operation::CreateTable(legacy.clone()))
        .down(Operation::DropTable {
            table: legacy.table.clone(),
        });
    let fold = ChangeUnit::new(id("20251227034100_unify_reference_values"), "fold")
        .up(Operation::ReferenceValues(
            ReferenceValueOp::FoldLegacyTable {
                legacy_table: legacy.table.clone(),
                enum_type: EnumType::new("EventCategory"),
                mapping: [("Religious".to_string(), 0), ("Cultural".to_string(), 1)]
                    .into_iter()
                    .collect(),
                metadata_columns: vec![crate::reference_value::FoldedColumn {
                    column: "icon_url".into(),
                    key: "iconUrl".into(),
                }],
                table: store(),
            },
        ))
        .down(Operation::ReferenceValues(
            ReferenceValueOp::RestoreLegacyTable {
                legacy: legacy.clone(),
                enum_type: EnumType::new("EventCategory"),
                metadata_columns: vec![crate::reference_value::FoldedColumn {
                    column: "icon_url".into(),
                    key: "iconUrl".into(),
                }],
                table: store(),
            },
        ));
    let findings = lint_units(&[create_legacy, create_store_unit(), fold]);
    assert!(errors(&findings).is_empty(), "{findings:?}");

    // Restoring a different shape is caught.
    let mut narrower = legacy.clone();
    narrower.columns.retain(|c| c.name != "icon_url");
    let mut bad = ChangeUnit::new(id("20251227034100_unify_reference_values"), "fold");
    bad.forward = vec![Operation::ReferenceValues(
        ReferenceValueOp::FoldLegacyTable {
            legacy_table: legacy.table.clone(),
            enum_type: EnumType::new("EventCategory"),
            mapping: [("Religious".to_string(), 0)].into_iter().collect(),
            metadata_columns: vec![],
            table: store(),
        },
    )];
    bad.inverse = vec![Operation::ReferenceValues(
        ReferenceValueOp::RestoreLegacyTable {
            legacy: narrower,
            enum_type: EnumType::new("EventCategory"),
            metadata_columns: vec![],
            table: store(),
        },
    )];
    let create_legacy = ChangeUnit::new(id("20240101000000_event_categories"), "legacy")
        .up(Operation::CreateTable(legacy.clone()))
        .down(Operation::DropTable {
            table: legacy.table.clone(),
        });
    let findings = lint_units(&[create_legacy, create_store_unit(), bad]);
    assert_eq!(
        errors(&findings),
        vec!["inverse does not restore schema: column main.event_categories.icon_url is missing"]
    );
}
