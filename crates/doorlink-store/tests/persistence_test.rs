//! On-disk store tests: SQLite table, daily log, and restart seeding.

use chrono::Local;
use doorlink_protocol::DoorState;
use doorlink_store::{DoorStatus, HistoryEntry, SqliteHistory, StateStore, StoreConfig};

fn config(dir: &tempfile::TempDir) -> StoreConfig {
    StoreConfig {
        db_path: dir.path().join("door_events.db"),
        log_dir: Some(dir.path().join("logs")),
    }
}

#[test]
fn test_fresh_store_is_unknown() {
    let dir = tempfile::tempdir().unwrap();
    let store = StateStore::open(&config(&dir)).unwrap();

    assert_eq!(*store.current(), DoorStatus::default());
    assert_eq!(store.sink_count(), 2);
}

#[test]
fn test_record_writes_table_and_daily_log() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let mut store = StateStore::open(&cfg).unwrap();

    store
        .record(HistoryEntry::new(
            DoorState::Unlocked,
            "stm32",
            "2025-06-08T10:25:00Z",
        ))
        .unwrap();

    let db = SqliteHistory::open(&cfg.db_path).unwrap();
    let latest = db.latest().unwrap().unwrap();
    assert_eq!(latest.entry.state, DoorState::Unlocked);
    assert_eq!(latest.entry.source, "stm32");
    assert_eq!(latest.entry.timestamp, "2025-06-08T10:25:00Z");

    let log_file = dir
        .path()
        .join("logs")
        .join(format!("{}.txt", Local::now().format("%Y-%m-%d")));
    let text = std::fs::read_to_string(log_file).unwrap();
    assert!(
        text.ends_with("- State: unlocked, Source: stm32, Timestamp: 2025-06-08T10:25:00Z\n"),
        "unexpected log line: {text:?}"
    );
}

#[test]
fn test_reopen_restores_last_state() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);

    {
        let mut store = StateStore::open(&cfg).unwrap();
        store
            .record(HistoryEntry::new(DoorState::Unlocked, "stm32", "T1"))
            .unwrap();
        store
            .record(HistoryEntry::new(DoorState::Locked, "stm32", "T2"))
            .unwrap();
    }

    let store = StateStore::open(&cfg).unwrap();
    assert_eq!(store.current().state, DoorState::Locked);
    assert_eq!(store.current().last_source, "stm32");
    assert_eq!(store.current().last_timestamp, "T2");
}

#[test]
fn test_history_is_append_only() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = StoreConfig {
        log_dir: None,
        ..config(&dir)
    };
    let mut store = StateStore::open(&cfg).unwrap();
    assert_eq!(store.sink_count(), 1);

    for (i, state) in [DoorState::Locked, DoorState::Unlocked, DoorState::Locked]
        .into_iter()
        .enumerate()
    {
        store
            .record(HistoryEntry::new(state, "stm32", format!("T{i}")))
            .unwrap();
    }

    let db = SqliteHistory::open(&cfg.db_path).unwrap();
    let recent = db.recent(10).unwrap();
    let ids: Vec<i64> = recent.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![3, 2, 1]);
    assert_eq!(db.count().unwrap(), 3);
}

#[test]
fn test_entry_serializes_flat() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let mut store = StateStore::open(&cfg).unwrap();
    store
        .record(HistoryEntry::new(DoorState::Locked, "stm32", "T"))
        .unwrap();

    let db = SqliteHistory::open(&cfg.db_path).unwrap();
    let json = serde_json::to_value(db.latest().unwrap().unwrap()).unwrap();
    assert_eq!(json["state"], "locked");
    assert_eq!(json["source"], "stm32");
    assert_eq!(json["timestamp"], "T");
    assert_eq!(json["id"], 1);
}

/// Make every insert into `door_events` fail until the trigger is dropped.
fn reject_inserts(db_path: &std::path::Path) -> rusqlite::Connection {
    let conn = rusqlite::Connection::open(db_path).unwrap();
    conn.execute_batch(
        "CREATE TRIGGER reject_insert BEFORE INSERT ON door_events
         BEGIN SELECT RAISE(ABORT, 'inserts disabled'); END;",
    )
    .unwrap();
    conn
}

#[test]
fn test_failed_commit_is_not_restored() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let mut store = StateStore::open(&cfg).unwrap();
    store
        .record(HistoryEntry::new(DoorState::Locked, "stm32", "T1"))
        .unwrap();

    let blocker = reject_inserts(&cfg.db_path);
    let result = store.record(HistoryEntry::new(DoorState::Unlocked, "stm32", "T2"));
    assert!(result.is_err());
    assert_eq!(store.current().state, DoorState::Locked);

    blocker
        .execute_batch("DROP TRIGGER reject_insert;")
        .unwrap();
    drop(store);

    let db = SqliteHistory::open(&cfg.db_path).unwrap();
    assert_eq!(db.count().unwrap(), 1);

    let log_file = dir
        .path()
        .join("logs")
        .join(format!("{}.txt", Local::now().format("%Y-%m-%d")));
    let text = std::fs::read_to_string(log_file).unwrap();
    assert_eq!(text.lines().count(), 1);
    assert!(!text.contains("unlocked"));

    let reopened = StateStore::open(&cfg).unwrap();
    assert_eq!(reopened.current().state, DoorState::Locked);
    assert_eq!(reopened.current().last_timestamp, "T1");
}

#[test]
fn test_daily_log_failure_keeps_committed_state() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = config(&dir);
    let mut store = StateStore::open(&cfg).unwrap();

    std::fs::remove_dir_all(dir.path().join("logs")).unwrap();
    let recorded = store
        .record(HistoryEntry::new(DoorState::Unlocked, "stm32", "T1"))
        .unwrap();
    assert_eq!(recorded.mirror_failures, 1);
    assert_eq!(store.current().state, DoorState::Unlocked);
    drop(store);

    let reopened = StateStore::open(&cfg).unwrap();
    assert_eq!(
        *reopened.current(),
        DoorStatus::new(DoorState::Unlocked, "stm32", "T1"),
        "restart agrees with what was acknowledged"
    );
}
