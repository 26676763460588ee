use super::*;
use st_db::{DbError, DuckDbBackend};

fn config(timeout_secs: u64) -> LockConfig {
    LockConfig {
        timeout_secs,
        initial_backoff_ms: 10,
        max_backoff_ms: 40,
        ..LockConfig::default()
    }
}

async fn setup() -> (DuckDbBackend, Ledger) {
    let db = DuckDbBackend::in_memory().unwrap();
    let ledger = Ledger::new("strata");
    ledger.bootstrap(&db).await.unwrap();
    (db, ledger)
}

#[tokio::test]
async fn test_acquire_and_release() {
    let (db, ledger) = setup().await;
    let lock = MigrationLock::acquire(&db, &ledger, &config(1)).await.unwrap();
    let holder = current_holder(&db, &ledger.lock_table(), "strata_migrate")
        .await
        .unwrap()
        .unwrap();
    assert!(holder.starts_with(lock.owner()));

    lock.release(&db).await.unwrap();
    assert_eq!(
        current_holder(&db, &ledger.lock_table(), "strata_migrate")
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn test_held_lock_times_out_with_holder() {
    let (db, ledger) = setup().await;
    db.execute(
        "INSERT INTO strata.migration_lock VALUES ('strata_migrate', 'deploy-bot', TIMESTAMP '2025-01-01 00:00:00')",
    )
    .await
    .unwrap();

    let started = std::time::Instant::now();
    let err = MigrationLock::acquire(&db, &ledger, &config(1))
        .await
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_secs(1));
    match err {
        LedgerError::LockContention { name, holder, .. } => {
            assert_eq!(name, "strata_migrate");
            assert!(holder.contains("deploy-bot"), "{holder}");
        }
        other => panic!("expected LockContention, got {other}"),
    }
}

#[tokio::test]
async fn test_zero_timeout_tries_once() {
    let (db, ledger) = setup().await;
    let _first = MigrationLock::acquire(&db, &ledger, &config(0)).await.unwrap();
    assert!(matches!(
        MigrationLock::acquire(&db, &ledger, &config(0)).await,
        Err(LedgerError::LockContention { .. })
    ));
}

#[tokio::test]
async fn test_lock_freed_while_waiting_is_taken() {
    let (db, ledger) = setup().await;
    let db = std::sync::Arc::new(db);
    let first = MigrationLock::acquire(db.as_ref(), &ledger, &config(0))
        .await
        .unwrap();

    let releaser = {
        let db = db.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            first.release(db.as_ref()).await.unwrap();
        })
    };

    let second = MigrationLock::acquire(db.as_ref(), &ledger, &config(5))
        .await
        .unwrap();
    releaser.await.unwrap();
    second.release(db.as_ref()).await.unwrap();
}

#[tokio::test]
async fn test_release_does_not_remove_foreign_lock() {
    let (db, ledger) = setup().await;
    let lock = MigrationLock::acquire(&db, &ledger, &config(0)).await.unwrap();
    assert!(force_unlock(&db, &ledger, "strata_migrate").await.unwrap());
    db.execute(
        "INSERT INTO strata.migration_lock VALUES ('strata_migrate', 'someone-else', TIMESTAMP '2025-01-01 00:00:00')",
    )
    .await
    .unwrap();

    lock.release(&db).await.unwrap();
    let holder = current_holder(&db, &ledger.lock_table(), "strata_migrate")
        .await
        .unwrap()
        .unwrap();
    assert!(holder.starts_with("someone-else"));
}

#[tokio::test]
async fn test_force_unlock_without_lock() {
    let (db, ledger) = setup().await;
    assert!(!force_unlock(&db, &ledger, "strata_migrate").await.unwrap());
}

fn file_locked() -> DbError {
    DbError::FileLocked("Could not set lock on file \"strata.duckdb\"".to_string())
}

#[tokio::test]
async fn test_open_retries_while_file_is_locked() {
    let mut attempts = 0;
    let opened = open_when_free(&config(5), || {
        attempts += 1;
        if attempts < 3 {
            Err(file_locked())
        } else {
            Ok("db")
        }
    })
    .await
    .unwrap();
    assert_eq!(opened, "db");
    assert_eq!(attempts, 3);
}

#[tokio::test]
async fn test_open_gives_up_as_lock_contention() {
    let started = std::time::Instant::now();
    let err = open_when_free(&config(1), || Err::<(), _>(file_locked()))
        .await
        .unwrap_err();
    assert!(started.elapsed() >= Duration::from_secs(1));
    match err {
        LedgerError::LockContention { name, holder, .. } => {
            assert_eq!(name, "strata_migrate");
            assert!(holder.contains("database file"), "{holder}");
        }
        other => panic!("expected LockContention, got {other}"),
    }
}

#[tokio::test]
async fn test_open_does_not_retry_other_errors() {
    let mut attempts = 0;
    let err = open_when_free(&config(5), || {
        attempts += 1;
        Err::<(), _>(DbError::ConnectionError("no such directory".to_string()))
    })
    .await
    .unwrap_err();
    assert!(matches!(err, LedgerError::Db(DbError::ConnectionError(_))), "{err}");
    assert_eq!(attempts, 1);
}
