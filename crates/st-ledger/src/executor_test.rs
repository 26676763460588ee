use super::*;
use st_core::operation::{ForeignKeyDef, FkAction};
use st_core::{ColumnDef, CreateTable, Operation, Reversibility};
use st_db::DuckDbBackend;

fn id(s: &str) -> ChangeUnitId {
    ChangeUnitId::parse(s).unwrap()
}

fn create_events() -> ChangeUnit {
    ChangeUnit::new(id("20251101120000_create_events"), "create events")
        .up(Operation::CreateTable(CreateTable::new(
            "events",
            vec![
                ColumnDef::new("id", "INTEGER").not_null(),
                ColumnDef::new("title", "VARCHAR"),
            ],
        )))
        .up(Operation::Sql {
            sql: "INSERT INTO events VALUES (1, 'launch')".to_string(),
            affects: vec![],
        })
        .down(Operation::DropTable {
            table: "events".into(),
        })
}

async fn setup() -> (DuckDbBackend, Ledger) {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = Ledger::new("strata");
    ledger.bootstrap(&db).await.unwrap();
    (db, ledger)
}

#[tokio::test]
async fn test_forward_records_ledger_row() {
    let (db, ledger) = setup().await;
    let unit = create_events();
    let report = execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap();
    assert_eq!(report.operations, 2);
    assert_eq!(report.direction, Direction::Forward);
    assert_eq!(db.query_count("SELECT * FROM events").await.unwrap(), 1);

    let entries = ledger.entries(&db).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, unit.id);
}

#[tokio::test]
async fn test_inverse_removes_ledger_row() {
    let (db, ledger) = setup().await;
    let unit = create_events();
    execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap();
    execute_unit(&db, &ledger, &unit, Direction::Inverse)
        .await
        .unwrap();
    assert!(!db.relation_exists("events").await.unwrap());
    assert!(ledger.entries(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failure_at_last_op_leaves_no_trace() {
    let (db, ledger) = setup().await;
    let unit = create_events().up(Operation::Sql {
        sql: "INSERT INTO missing_table VALUES (1)".to_string(),
        affects: vec![],
    });
    let before = db.schema_snapshot().await.unwrap();

    let err = execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap_err();
    match &err {
        LedgerError::OperationFailure {
            unit: failed,
            direction,
            index,
            summary,
            error,
        } => {
            assert_eq!(failed, &unit.id);
            assert_eq!(*direction, Direction::Forward);
            assert_eq!(*index, 2);
            assert!(summary.starts_with("sql: INSERT INTO missing_table"), "{summary}");
            assert!(error.contains("missing_table"), "{error}");
        }
        other => panic!("expected OperationFailure, got {other}"),
    }

    assert!(!db.relation_exists("events").await.unwrap());
    assert_eq!(db.schema_snapshot().await.unwrap(), before);
    assert!(ledger.entries(&db).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_inverse_runs_in_authored_order() {
    let (db, ledger) = setup().await;
    db.execute_batch("CREATE TABLE archived_events (id INTEGER)")
        .await
        .unwrap();
    // Archiving reads the table the next operation drops, so this only
    // succeeds when the inverse list runs as written.
    let unit = create_events();
    let unit = ChangeUnit {
        inverse: vec![
            Operation::Sql {
                sql: "INSERT INTO archived_events SELECT id FROM events".to_string(),
                affects: vec![],
            },
            Operation::DropTable {
                table: "events".into(),
            },
        ],
        ..unit
    };
    execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap();
    execute_unit(&db, &ledger, &unit, Direction::Inverse)
        .await
        .unwrap();
    assert!(!db.relation_exists("events").await.unwrap());
    assert_eq!(
        db.query_count("SELECT * FROM archived_events").await.unwrap(),
        1
    );
}

#[tokio::test]
async fn test_foreign_key_alter_is_rejected_before_running() {
    let (db, ledger) = setup().await;
    let unit = ChangeUnit::new(id("20251101120000_link_events"), "fk")
        .up(Operation::CreateTable(CreateTable::new(
            "venues",
            vec![ColumnDef::new("id", "INTEGER")],
        )))
        .up(Operation::AddForeignKey {
            table: "events".into(),
            foreign_key: ForeignKeyDef {
                name: "fk_events_venue".to_string(),
                columns: vec!["venue_id".to_string()],
                references: "venues".into(),
                referenced_columns: vec!["id".to_string()],
                on_delete: Some(FkAction::Restrict),
            },
        })
        .with_reversibility(Reversibility::None {
            reason: "test".to_string(),
        });

    let err = execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap_err();
    match err {
        LedgerError::OperationFailure { index, error, .. } => {
            assert_eq!(index, 1);
            assert!(error.contains("[D005]"), "{error}");
        }
        other => panic!("expected OperationFailure, got {other}"),
    }
    assert!(!db.relation_exists("venues").await.unwrap());
}

#[tokio::test]
async fn test_bookkeeping_failure_rolls_back() {
    let (db, ledger) = setup().await;
    let unit = create_events();
    db.execute(&ledger.insert_sql(&unit, 0)).await.unwrap();

    let err = execute_unit(&db, &ledger, &unit, Direction::Forward)
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::Bookkeeping { .. }), "{err}");
    assert!(!db.relation_exists("events").await.unwrap());
}
