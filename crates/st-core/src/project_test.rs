use super::*;
use std::fs;

const UNIT: &str = r#"
description: test
forward:
  - op: create_table
    table: t
    columns:
      - name: id
        type: INTEGER
inverse:
  - op: drop_table
    table: t
"#;

fn write_project(root: &Path) {
    fs::write(root.join("strata.yml"), "name: test_project\n").unwrap();
    fs::create_dir_all(root.join("migrations/2025")).unwrap();
}

#[test]
fn test_load_discovers_nested_units_in_order() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    fs::write(
        dir.path().join("migrations/2025/20250301000000_b.yml"),
        UNIT.replace("table: t", "table: b"),
    )
    .unwrap();
    fs::write(
        dir.path().join("migrations/20250101000000_a.yaml"),
        UNIT,
    )
    .unwrap();
    fs::write(dir.path().join("migrations/README.md"), "notes").unwrap();

    let project = Project::load(dir.path()).unwrap();
    let ids: Vec<&str> = project.units().iter().map(|u| u.id.as_str()).collect();
    assert_eq!(ids, vec!["20250101000000_a", "20250301000000_b"]);

    let a = ChangeUnitId::parse("20250101000000_a").unwrap();
    assert!(project.unit(&a).is_some());
    let missing = ChangeUnitId::parse("20250101000000_z").unwrap();
    assert!(project.unit(&missing).is_none());
    assert_eq!(project.primary_migration_dir(), dir.path().join("migrations"));
}

#[test]
fn test_duplicate_ids_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    fs::write(dir.path().join("migrations/20250101000000_a.yml"), UNIT).unwrap();
    fs::write(dir.path().join("migrations/2025/20250101000000_a.yml"), UNIT).unwrap();

    let err = Project::load(dir.path()).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateUnit { .. }));
    assert!(err.to_string().contains("20250101000000_a"));
}

#[test]
fn test_bad_file_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path());
    fs::write(dir.path().join("migrations/add_things.yml"), UNIT).unwrap();
    assert!(matches!(
        Project::load(dir.path()),
        Err(CoreError::InvalidUnitId { .. })
    ));
}

#[test]
fn test_missing_migration_dir_is_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("strata.yml"), "name: test_project\n").unwrap();
    let project = Project::load(dir.path()).unwrap();
    assert!(project.units().is_empty());
}

#[test]
fn test_missing_project_dir() {
    let err = Project::load(Path::new("/definitely/not/here")).unwrap_err();
    assert!(matches!(err, CoreError::ProjectNotFound { .. }));
}
