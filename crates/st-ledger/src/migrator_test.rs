use super::*;
use st_core::{ColumnDef, Config, CreateTable, Operation};
use st_db::DuckDbBackend;
use std::path::PathBuf;

fn id(s: &str) -> ChangeUnitId {
    ChangeUnitId::parse(s).unwrap()
}

fn table_unit(unit_id: &str, table: &str) -> ChangeUnit {
    ChangeUnit::new(id(unit_id), format!("create {table}"))
        .up(Operation::CreateTable(CreateTable::new(
            table,
            vec![ColumnDef::new("id", "INTEGER")],
        )))
        .down(Operation::DropTable {
            table: table.into(),
        })
}

fn project(units: Vec<ChangeUnit>) -> Project {
    let mut config: Config = serde_yaml::from_str("name: test").unwrap();
    config.lock.timeout_secs = 0;
    Project::from_units(PathBuf::from("/tmp/strata-test"), config, units).unwrap()
}

fn three_units() -> Vec<ChangeUnit> {
    vec![
        table_unit("20250101000000_a", "a"),
        table_unit("20250102000000_b", "b"),
        table_unit("20250103000000_c", "c"),
    ]
}

#[derive(Default)]
struct Recorder {
    planned: Option<usize>,
    started: Vec<String>,
    finished: usize,
    notices: Vec<String>,
}

impl MigrationObserver for Recorder {
    fn planned(&mut self, total: usize) {
        self.planned = Some(total);
    }
    fn unit_started(&mut self, unit: &ChangeUnit, direction: Direction) {
        self.started.push(format!("{direction} {}", unit.id));
    }
    fn unit_finished(&mut self, _report: &ExecutionReport) {
        self.finished += 1;
    }
    fn notice(&mut self, message: &str) {
        self.notices.push(message.to_string());
    }
}

#[tokio::test]
async fn test_apply_all_in_order_then_nothing_pending() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);

    let mut recorder = Recorder::default();
    let reports = migrator.apply_pending(None, &mut recorder).await.unwrap();
    assert_eq!(reports.len(), 3);
    assert_eq!(recorder.planned, Some(3));
    assert_eq!(
        recorder.started,
        vec![
            "forward 20250101000000_a",
            "forward 20250102000000_b",
            "forward 20250103000000_c"
        ]
    );
    assert_eq!(recorder.finished, 3);

    let again = migrator.apply_pending(None, &mut ()).await.unwrap();
    assert!(again.is_empty());
    assert_eq!(migrator.entries().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_apply_to_is_inclusive() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);

    migrator
        .apply_pending(Some(&id("20250102000000_b")), &mut ())
        .await
        .unwrap();
    let applied: Vec<String> = migrator
        .entries()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id.to_string())
        .collect();
    assert_eq!(applied, vec!["20250101000000_a", "20250102000000_b"]);
    assert!(!db.relation_exists("c").await.unwrap());
}

#[tokio::test]
async fn test_apply_to_unknown_unit() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);
    assert!(matches!(
        migrator
            .apply_pending(Some(&id("20250109000000_zzz")), &mut ())
            .await,
        Err(LedgerError::UnknownTarget { .. })
    ));
}

#[tokio::test]
async fn test_rollback_steps_newest_first() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);
    migrator.apply_pending(None, &mut ()).await.unwrap();

    let mut recorder = Recorder::default();
    migrator
        .rollback(&RollbackTarget::Steps(2), false, &mut recorder)
        .await
        .unwrap();
    assert_eq!(
        recorder.started,
        vec!["inverse 20250103000000_c", "inverse 20250102000000_b"]
    );
    assert!(db.relation_exists("a").await.unwrap());
    assert!(!db.relation_exists("b").await.unwrap());
    assert_eq!(migrator.entries().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_rollback_to_is_exclusive() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);
    migrator.apply_pending(None, &mut ()).await.unwrap();

    migrator
        .rollback(&RollbackTarget::To(id("20250101000000_a")), false, &mut ())
        .await
        .unwrap();
    let entries = migrator.entries().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id("20250101000000_a"));

    assert!(matches!(
        migrator
            .rollback(&RollbackTarget::To(id("20250103000000_c")), false, &mut ())
            .await,
        Err(LedgerError::UnknownTarget { .. })
    ));
}

#[tokio::test]
async fn test_rollback_refuses_irreversible_unit() {
    let db = DuckDbBackend::in_memory().unwrap();
    let hotfix = ChangeUnit::new(id("20250104000000_hotfix"), "hotfix")
        .up(Operation::Sql {
            sql: "CREATE TABLE scratch (id INTEGER)".to_string(),
            affects: vec![],
        })
        .with_reversibility(Reversibility::None {
            reason: "one-way data fix".to_string(),
        });
    let mut units = three_units();
    units.push(hotfix);
    let project = project(units);
    let migrator = Migrator::new(&db, &project);
    migrator.apply_pending(None, &mut ()).await.unwrap();

    let err = migrator
        .rollback(&RollbackTarget::Steps(2), false, &mut ())
        .await
        .unwrap_err();
    assert!(matches!(err, LedgerError::NonReversible { .. }), "{err}");
    assert_eq!(migrator.entries().await.unwrap().len(), 4);

    let mut recorder = Recorder::default();
    migrator
        .rollback(&RollbackTarget::Steps(2), true, &mut recorder)
        .await
        .unwrap();
    assert_eq!(migrator.entries().await.unwrap().len(), 2);
    assert!(db.relation_exists("scratch").await.unwrap());
    assert_eq!(recorder.notices.len(), 1);
    assert!(recorder.notices[0].starts_with("20250104000000_hotfix has none reversibility (one-way data fix)"));
}

#[tokio::test]
async fn test_partial_rollback_notifies_observer() {
    let db = DuckDbBackend::in_memory().unwrap();
    let lossy = table_unit("20250104000000_lossy", "d").with_reversibility(Reversibility::Partial {
        reason: "drops rows added after the upgrade".to_string(),
    });
    let mut units = three_units();
    units.push(lossy);
    let project = project(units);
    let migrator = Migrator::new(&db, &project);

    let mut recorder = Recorder::default();
    migrator.apply_pending(None, &mut recorder).await.unwrap();
    assert!(recorder.notices.is_empty());

    let mut recorder = Recorder::default();
    migrator
        .rollback(&RollbackTarget::Steps(2), false, &mut recorder)
        .await
        .unwrap();
    assert_eq!(
        recorder.notices,
        vec![
            "20250104000000_lossy has partial reversibility (drops rows added after the \
             upgrade); rolling it back will not restore its data exactly"
                .to_string()
        ]
    );
    assert_eq!(recorder.finished, 2);
}

#[tokio::test]
async fn test_apply_and_rollback_in_file_named_after_ledger_schema() {
    let dir = tempfile::tempdir().unwrap();
    let db = DuckDbBackend::from_path(&dir.path().join("strata.duckdb")).unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);

    migrator.apply_pending(None, &mut ()).await.unwrap();
    assert_eq!(migrator.entries().await.unwrap().len(), 3);
    migrator.verify().await.unwrap();

    migrator
        .rollback(&RollbackTarget::Steps(1), false, &mut ())
        .await
        .unwrap();
    assert_eq!(migrator.entries().await.unwrap().len(), 2);
    assert!(migrator.status().await.unwrap().lock_holder.is_none());
    assert!(!migrator.force_unlock().await.unwrap());
}

#[tokio::test]
async fn test_status_and_drift() {
    let db = DuckDbBackend::in_memory().unwrap();
    let applied_project = project(three_units());
    Migrator::new(&db, &applied_project)
        .apply_pending(Some(&id("20250102000000_b")), &mut ())
        .await
        .unwrap();

    let mut edited = three_units();
    edited[0].description = "edited after apply".to_string();
    let edited = project(edited);
    let migrator = Migrator::new(&db, &edited);
    let status = migrator.status().await.unwrap();

    assert_eq!(status.units.len(), 3);
    assert!(status.units[0].applied && status.units[0].checksum_drift);
    assert!(status.units[1].applied && !status.units[1].checksum_drift);
    assert!(status.units[0].applied_at.is_some());
    assert_eq!(status.pending().count(), 1);
    assert!(status.orphaned.is_empty());
    assert!(status.lock_holder.is_none());

    let err = migrator.apply_pending(None, &mut ()).await.unwrap_err();
    assert!(matches!(err, LedgerError::LedgerInconsistency { .. }));
    assert!(err.to_string().contains("20250101000000_a changed after it was applied"));
}

#[tokio::test]
async fn test_status_reports_orphaned_entries() {
    let db = DuckDbBackend::in_memory().unwrap();
    let full = project(three_units());
    Migrator::new(&db, &full)
        .apply_pending(None, &mut ())
        .await
        .unwrap();

    let mut units = three_units();
    units.pop();
    let partial = project(units);
    let status = Migrator::new(&db, &partial).status().await.unwrap();
    assert_eq!(status.orphaned.len(), 1);
    assert_eq!(status.orphaned[0].id, id("20250103000000_c"));
}

#[tokio::test]
async fn test_status_on_fresh_database() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let status = Migrator::new(&db, &project).status().await.unwrap();
    assert_eq!(status.pending().count(), 3);
    assert!(!db.relation_exists("strata.schema_ledger").await.unwrap());
}

#[tokio::test]
async fn test_gap_is_inconsistent() {
    let db = DuckDbBackend::in_memory().unwrap();
    let mut units = three_units();
    let late = units.remove(1);
    let without_b = project(units.clone());
    Migrator::new(&db, &without_b)
        .apply_pending(None, &mut ())
        .await
        .unwrap();

    units.push(late);
    let with_b = project(units);
    let err = Migrator::new(&db, &with_b).verify().await.unwrap_err();
    assert!(
        err.to_string()
            .contains("20250102000000_b is pending but sorts before"),
        "{err}"
    );
}

#[tokio::test]
async fn test_verify_detects_missing_objects() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);
    migrator.apply_pending(None, &mut ()).await.unwrap();
    migrator.verify().await.unwrap();

    db.execute_batch("DROP TABLE b").await.unwrap();
    let err = migrator.verify().await.unwrap_err();
    assert!(err.to_string().contains("table main.b is missing"), "{err}");
}

#[tokio::test]
async fn test_held_lock_blocks_apply() {
    let db = DuckDbBackend::in_memory().unwrap();
    let project = project(three_units());
    let migrator = Migrator::new(&db, &project);
    migrator.ledger().bootstrap(&db).await.unwrap();
    db.execute(
        "INSERT INTO strata.migration_lock VALUES ('strata_migrate', 'other host', TIMESTAMP '2025-01-01 00:00:00')",
    )
    .await
    .unwrap();

    let err = migrator.apply_pending(None, &mut ()).await.unwrap_err();
    assert!(matches!(err, LedgerError::LockContention { .. }), "{err}");
    assert!(migrator.entries().await.unwrap().is_empty());
    assert!(migrator
        .status()
        .await
        .unwrap()
        .lock_holder
        .is_some_and(|h| h.contains("other host")));

    assert!(migrator.force_unlock().await.unwrap());
    migrator.apply_pending(None, &mut ()).await.unwrap();
}

#[tokio::test]
async fn test_lock_released_after_failure() {
    let db = DuckDbBackend::in_memory().unwrap();
    let broken = ChangeUnit::new(id("20250104000000_broken"), "broken").up(Operation::Sql {
        sql: "SELECT * FROM nowhere".to_string(),
        affects: vec![],
    });
    let mut units = three_units();
    units.push(broken);
    let project = project(units);
    let migrator = Migrator::new(&db, &project);

    let err = migrator.apply_pending(None, &mut ()).await.unwrap_err();
    assert!(matches!(err, LedgerError::OperationFailure { index: 0, .. }));
    assert_eq!(migrator.entries().await.unwrap().len(), 3);
    assert!(migrator.status().await.unwrap().lock_holder.is_none());
}
