// Exercises the persistent state store against a real on-disk SQLite
// file, including the cross-connection write-lock contention path.

use chrono::{Duration, Utc};
use tempfile::TempDir;

use tabber_core::types::{JobError, JobRunRecord};
use tabber_store::{db, JobStateStore, RunLog, StoreError};

fn store_fixture() -> (TempDir, String, JobStateStore) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("tabber.db").to_str().unwrap().to_string();
    let conn = db::open(&path).unwrap();
    db::init_db(&conn).unwrap();
    (dir, path, JobStateStore::new(conn))
}

#[test]
fn get_returns_none_for_unknown_job() {
    let (_dir, _path, store) = store_fixture();
    assert_eq!(store.get("nothing").unwrap(), None);
}

#[test]
fn set_then_get_round_trips_every_field() {
    let (_dir, _path, store) = store_fixture();
    let now = Utc::now();
    let record = JobRunRecord {
        next_run: Some(now + Duration::hours(1)),
        first_run: Some(now - Duration::days(3)),
        last_run: Some(now),
        last_success: Some(now),
        depends_on: vec!["upstream".to_string(), "other".to_string()],
        error_count: 2,
        last_error: Some(
            JobError::new("io", "connection refused").with_trace("at fetch()\nat main()"),
        ),
        ongoing: Some(now),
    };
    store.set("scraper", &record).unwrap();

    let read = store.get("scraper").unwrap().unwrap();
    assert_eq!(read, record);
}

#[test]
fn set_updates_existing_record_in_place() {
    let (_dir, _path, store) = store_fixture();
    let mut record = JobRunRecord {
        error_count: 1,
        last_error: Some(JobError::new("http", "503")),
        ..JobRunRecord::default()
    };
    store.set("sync", &record).unwrap();

    record.error_count = 0;
    record.last_error = None;
    record.last_success = Some(Utc::now());
    store.set("sync", &record).unwrap();

    let read = store.get("sync").unwrap().unwrap();
    assert_eq!(read.error_count, 0);
    assert_eq!(read.last_error, None);
    assert!(read.last_success.is_some());
    assert_eq!(store.list().unwrap().len(), 1);
}

#[test]
fn delete_removes_record_and_reports_missing() {
    let (_dir, _path, store) = store_fixture();
    store.set("gone", &JobRunRecord::default()).unwrap();
    store.delete("gone").unwrap();
    assert_eq!(store.get("gone").unwrap(), None);

    match store.delete("gone") {
        Err(StoreError::NotFound { name }) => assert_eq!(name, "gone"),
        other => panic!("expected NotFound, got {other:?}"),
    }
}

#[test]
fn list_and_names_are_name_ordered() {
    let (_dir, _path, store) = store_fixture();
    for name in ["zeta", "alpha", "mid"] {
        store.set(name, &JobRunRecord::default()).unwrap();
    }
    assert_eq!(store.names().unwrap(), vec!["alpha", "mid", "zeta"]);
    let listed: Vec<String> = store.list().unwrap().into_iter().map(|(n, _)| n).collect();
    assert_eq!(listed, vec!["alpha", "mid", "zeta"]);
}

#[test]
fn concurrent_writer_gets_lock_contention_and_no_partial_write() {
    let (_dir, path, store) = store_fixture();
    let record = JobRunRecord {
        error_count: 7,
        last_error: Some(JobError::new("seed", "initial")),
        ..JobRunRecord::default()
    };
    store.set("contended", &record).unwrap();

    // A second connection takes the write lock and holds it across
    // our set attempt, as a concurrent scheduler process would.
    let rival = db::open(&path).unwrap();
    rival.execute_batch("BEGIN IMMEDIATE;").unwrap();
    rival
        .execute(
            "UPDATE crontab SET error_count = 99 WHERE app_name = 'contended'",
            [],
        )
        .unwrap();

    let mut update = record.clone();
    update.error_count = 0;
    update.last_error = None;
    match store.set("contended", &update) {
        Err(StoreError::LockContention { name }) => assert_eq!(name, "contended"),
        other => panic!("expected LockContention, got {other:?}"),
    }

    rival.execute_batch("ROLLBACK;").unwrap();

    // The losing write left nothing behind; after the rival releases
    // the lock the same write goes through.
    assert_eq!(store.get("contended").unwrap().unwrap().error_count, 7);
    store.set("contended", &update).unwrap();
    assert_eq!(store.get("contended").unwrap().unwrap().error_count, 0);
}

#[test]
fn run_log_records_successes_and_failures() {
    let (_dir, path, _store) = store_fixture();
    let log = RunLog::new(db::open(&path).unwrap());
    let first = Utc::now();
    let second = first + Duration::seconds(30);

    log.remember_success("batch", first, 1.25).unwrap();
    log.remember_success("batch", second, 0.5).unwrap();
    log.remember_failure(
        "batch",
        2.0,
        &JobError::new("http", "timeout").with_trace("at poll()"),
    )
    .unwrap();
    log.remember_success("other", first, 0.1).unwrap();

    let recent = log.recent("batch", 10).unwrap();
    assert_eq!(recent.len(), 3);

    // Newest first: the failure, then the two checkpoints.
    let failure = &recent[0];
    assert_eq!(failure.success, None);
    assert_eq!(failure.duration, 2.0);
    let error = failure.error.as_ref().unwrap();
    assert_eq!(error.kind, "http");
    assert_eq!(error.trace.as_deref(), Some("at poll()"));

    assert_eq!(recent[1].success, Some(second));
    assert_eq!(recent[2].success, Some(first));
    assert_eq!(recent[2].error, None);

    assert_eq!(log.recent("batch", 2).unwrap().len(), 2);
    assert_eq!(log.recent("nothing", 10).unwrap().len(), 0);
}
