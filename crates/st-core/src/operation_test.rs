use super::*;

fn table(s: &str) -> TableName {
    TableName::from(s)
}

#[test]
fn test_create_table_renders_constraints() {
    let mut ct = CreateTable::new(
        "events.event_tickets",
        vec![
            ColumnDef::new("id", "UUID").not_null(),
            ColumnDef::new("event_id", "UUID").not_null(),
            ColumnDef::new("price", "DECIMAL(10, 2)").default_value(0),
            ColumnDef::new("created_at", "TIMESTAMP").default_value(SqlValue::expr("now()")),
        ],
    );
    ct.primary_key = vec!["id".into()];
    ct.unique = vec![vec!["event_id".into(), "price".into()]];
    ct.checks = vec!["price >= 0".into()];

    let stmts = Operation::CreateTable(ct).to_sql().unwrap();
    assert_eq!(
        stmts,
        vec![concat!(
            "CREATE TABLE \"events\".\"event_tickets\" (\n",
            "    \"id\" UUID NOT NULL,\n",
            "    \"event_id\" UUID NOT NULL,\n",
            "    \"price\" DECIMAL(10, 2) DEFAULT 0,\n",
            "    \"created_at\" TIMESTAMP DEFAULT now(),\n",
            "    PRIMARY KEY (\"id\"),\n",
            "    UNIQUE (\"event_id\", \"price\"),\n",
            "    CHECK (price >= 0)\n",
            ")"
        )]
    );
}

#[test]
fn test_create_table_rejects_bad_type() {
    let ct = CreateTable::new("t", vec![ColumnDef::new("a", "INT; DROP TABLE x")]);
    assert!(Operation::CreateTable(ct).validate().is_err());
    let empty = CreateTable::new("t", vec![]);
    assert!(Operation::CreateTable(empty).validate().is_err());
}

#[test]
fn test_add_column_not_null_is_split() {
    let op = Operation::AddColumn {
        table: table("events.events"),
        column: ColumnDef::new("is_free", "BOOLEAN")
            .not_null()
            .default_value(false),
    };
    assert_eq!(
        op.to_sql().unwrap(),
        vec![
            r#"ALTER TABLE "events"."events" ADD COLUMN "is_free" BOOLEAN DEFAULT FALSE"#,
            r#"ALTER TABLE "events"."events" ALTER COLUMN "is_free" SET NOT NULL"#,
        ]
    );
}

#[test]
fn test_alter_column_orders_type_default_nullability() {
    let op = Operation::AlterColumn {
        table: table("users"),
        column: "bio".into(),
        data_type: Some("VARCHAR(2000)".into()),
        nullable: Some(true),
        default: Some(DefaultChange::Drop),
    };
    assert_eq!(
        op.to_sql().unwrap(),
        vec![
            r#"ALTER TABLE "users" ALTER COLUMN "bio" SET DATA TYPE VARCHAR(2000)"#,
            r#"ALTER TABLE "users" ALTER COLUMN "bio" DROP DEFAULT"#,
            r#"ALTER TABLE "users" ALTER COLUMN "bio" DROP NOT NULL"#,
        ]
    );

    let noop = Operation::AlterColumn {
        table: table("users"),
        column: "bio".into(),
        data_type: None,
        nullable: None,
        default: None,
    };
    assert!(noop.validate().is_err());
}

#[test]
fn test_rename_and_index_statements() {
    let rename = Operation::RenameTable {
        table: table("events.event_images"),
        new_name: "event_media".into(),
    };
    assert_eq!(
        rename.to_sql().unwrap(),
        vec![r#"ALTER TABLE "events"."event_images" RENAME TO "event_media""#]
    );

    let idx = Operation::CreateIndex(IndexDef {
        name: "ix_events_status".into(),
        table: table("events.events"),
        columns: vec!["status".into()],
        unique: false,
    });
    assert_eq!(
        idx.to_sql().unwrap(),
        vec![r#"CREATE INDEX "ix_events_status" ON "events"."events" ("status")"#]
    );

    let drop = Operation::DropIndex {
        table: table("events.events"),
        name: "ix_events_status".into(),
    };
    assert_eq!(
        drop.to_sql().unwrap(),
        vec![r#"DROP INDEX "events"."ix_events_status""#]
    );
}

#[test]
fn test_foreign_key_ops_are_flagged() {
    let add = Operation::AddForeignKey {
        table: table("events.registrations"),
        foreign_key: ForeignKeyDef {
            name: "fk_registrations_events".into(),
            columns: vec!["event_id".into()],
            references: table("events.events"),
            referenced_columns: vec!["id".into()],
            on_delete: Some(FkAction::Cascade),
        },
    };
    assert!(add.alters_foreign_keys());
    assert!(add.to_sql().unwrap()[0].ends_with(
        r#"FOREIGN KEY ("event_id") REFERENCES "events"."events" ("id") ON DELETE CASCADE"#
    ));
    assert!(!Operation::DropTable {
        table: table("x")
    }
    .alters_foreign_keys());
}

#[test]
fn test_insert_rows_plain_and_guarded() {
    let plain = Operation::InsertRows {
        table: table("t"),
        columns: vec!["id".into(), "label".into()],
        rows: vec![vec![1.into(), "a".into()], vec![2.into(), SqlValue::Null]],
        key: vec![],
    };
    assert_eq!(
        plain.to_sql().unwrap(),
        vec!["INSERT INTO \"t\" (\"id\", \"label\")\nVALUES\n    (1, 'a'),\n    (2, NULL)"]
    );

    let guarded = Operation::InsertRows {
        table: table("t"),
        columns: vec!["id".into(), "label".into()],
        rows: vec![vec![1.into(), "a".into()]],
        key: vec!["id".into()],
    };
    assert_eq!(
        guarded.to_sql().unwrap(),
        vec!["INSERT INTO \"t\" (\"id\", \"label\")\nSELECT 1, 'a'\nWHERE NOT EXISTS (SELECT 1 FROM \"t\" WHERE \"id\" = 1)"]
    );
}

#[test]
fn test_insert_rows_validates_shape() {
    let ragged = Operation::InsertRows {
        table: table("t"),
        columns: vec!["id".into(), "label".into()],
        rows: vec![vec![1.into()]],
        key: vec![],
    };
    assert!(ragged.validate().is_err());

    let bad_key = Operation::InsertRows {
        table: table("t"),
        columns: vec!["id".into()],
        rows: vec![vec![1.into()]],
        key: vec!["code".into()],
    };
    assert!(bad_key.validate().is_err());
}

#[test]
fn test_update_and_delete_require_filters() {
    let mut set = BTreeMap::new();
    set.insert("is_active".to_string(), SqlValue::Bool(false));
    let unfiltered = Operation::UpdateRows {
        table: table("t"),
        set: set.clone(),
        filter: Filter::new(),
    };
    assert!(unfiltered.validate().is_err());

    let mut filter = Filter::new();
    filter.insert("code".to_string(), "Preferred".into());
    filter.insert("deleted_at".to_string(), SqlValue::Null);
    let update = Operation::UpdateRows {
        table: table("t"),
        set,
        filter: filter.clone(),
    };
    assert_eq!(
        update.to_sql().unwrap(),
        vec![r#"UPDATE "t" SET "is_active" = FALSE WHERE "code" = 'Preferred' AND "deleted_at" IS NULL"#]
    );

    assert!(Operation::DeleteRows {
        table: table("t"),
        filter: Filter::new()
    }
    .validate()
    .is_err());
}

#[test]
fn test_sql_value_yaml_forms() {
    let values: Vec<SqlValue> =
        serde_yaml::from_str("[null, true, 3, 1.5, text, {sql: 'now()'}, {a: 1}]").unwrap();
    let rendered: Vec<String> = values.iter().map(SqlValue::to_sql).collect();
    assert_eq!(
        rendered,
        vec!["NULL", "TRUE", "3", "1.5", "'text'", "now()", r#"'{"a":1}'"#]
    );
}

#[test]
fn test_operation_yaml_tagging() {
    let yaml = r#"
- op: create_schema
  name: reference_data
  if_not_exists: true
- op: add_column
  table: events.events
  column:
    name: is_free
    type: BOOLEAN
    nullable: false
    default: false
- op: reference_values
  action: deprecate
  enum_type: RegistrationMethod
  code: Preferred
- op: email_templates
  action: rename
  from: event-approved
  to: template-event-approval
"#;
    let ops: Vec<Operation> = serde_yaml::from_str(yaml).unwrap();
    let kinds: Vec<&str> = ops.iter().map(Operation::kind).collect();
    assert_eq!(
        kinds,
        vec!["create_schema", "add_column", "reference_values", "email_templates"]
    );
    assert_eq!(
        ops[2].summary(),
        "reference_values deprecate RegistrationMethod.Preferred"
    );
    assert_eq!(
        ops[3].summary(),
        "email_templates rename event-approved -> template-event-approval"
    );
}

#[test]
fn test_sql_summary_truncates() {
    let op = Operation::Sql {
        sql: format!("UPDATE t SET a = '{}'", "x".repeat(100)),
        affects: vec![],
    };
    let summary = op.summary();
    assert!(summary.starts_with("sql: UPDATE t SET a = 'xxx"));
    assert!(summary.ends_with("..."));
}
