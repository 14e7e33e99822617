//! SQLite history table.
//!
//! Schema:
//!
//! ```sql
//! CREATE TABLE door_events (
//!     id          INTEGER PRIMARY KEY AUTOINCREMENT,
//!     state       TEXT NOT NULL,
//!     source      TEXT NOT NULL,
//!     timestamp   TEXT NOT NULL,
//!     recorded_at TEXT NOT NULL
//! );
//! ```
//!
//! Rows are only ever inserted. `timestamp` is the controller's string;
//! `recorded_at` is the relay's local time of the write.

use std::path::{Path, PathBuf};

use chrono::Local;
use doorlink_protocol::DoorState;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::entry::{HistoryEntry, PersistedEntry};
use crate::error::{StoreError, StoreResult};
use crate::HistorySink;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS door_events (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    state       TEXT NOT NULL,
    source      TEXT NOT NULL,
    timestamp   TEXT NOT NULL,
    recorded_at TEXT NOT NULL
)";

const SELECT_COLUMNS: &str = "SELECT id, state, source, timestamp, recorded_at FROM door_events";

/// Format of the `recorded_at` column.
pub(crate) const RECORDED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Raw column values, before the state string is parsed.
type RawRow = (i64, String, String, String, String);

/// History sink writing to the `door_events` table.
pub struct SqliteHistory {
    conn: Connection,
    location: PathBuf,
}

impl SqliteHistory {
    /// Open (creating if needed) the database file and its table.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLE)?;
        info!(path = %path.display(), "history database opened");
        Ok(SqliteHistory {
            conn,
            location: path.to_path_buf(),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLE)?;
        Ok(SqliteHistory {
            conn,
            location: PathBuf::from(":memory:"),
        })
    }

    pub fn location(&self) -> &Path {
        &self.location
    }

    /// The most recently inserted entry, if any.
    pub fn latest(&self) -> StoreResult<Option<PersistedEntry>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT 1");
        let raw = self
            .conn
            .query_row(&sql, [], read_raw)
            .optional()?;
        raw.map(into_entry).transpose()
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> StoreResult<Vec<PersistedEntry>> {
        let sql = format!("{SELECT_COLUMNS} ORDER BY id DESC LIMIT ?1");
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([limit], read_raw)?;

        let mut out = Vec::new();
        for row in rows {
            out.push(into_entry(row?)?);
        }
        Ok(out)
    }

    /// Number of rows in the table.
    pub fn count(&self) -> StoreResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM door_events", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }
}

impl HistorySink for SqliteHistory {
    fn append(&mut self, entry: &HistoryEntry) -> StoreResult<()> {
        let recorded_at = Local::now().format(RECORDED_AT_FORMAT).to_string();
        self.conn.execute(
            "INSERT INTO door_events (state, source, timestamp, recorded_at) VALUES (?1, ?2, ?3, ?4)",
            params![entry.state.as_str(), entry.source, entry.timestamp, recorded_at],
        )?;
        debug!(
            id = self.conn.last_insert_rowid(),
            state = %entry.state,
            "history row inserted"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

fn read_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn into_entry((id, state, source, timestamp, recorded_at): RawRow) -> StoreResult<PersistedEntry> {
    let state: DoorState = state.parse().map_err(|e| StoreError::CorruptRow {
        id,
        reason: format!("{e}"),
    })?;
    Ok(PersistedEntry {
        id,
        entry: HistoryEntry {
            state,
            source,
            timestamp,
        },
        recorded_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(state: DoorState, ts: &str) -> HistoryEntry {
        HistoryEntry::new(state, "stm32", ts)
    }

    #[test]
    fn test_empty_table() {
        let db = SqliteHistory::open_in_memory().unwrap();
        assert!(db.latest().unwrap().is_none());
        assert!(db.recent(10).unwrap().is_empty());
        assert_eq!(db.count().unwrap(), 0);
    }

    #[test]
    fn test_append_and_latest() {
        let mut db = SqliteHistory::open_in_memory().unwrap();
        db.append(&entry(DoorState::Locked, "1000")).unwrap();
        db.append(&entry(DoorState::Unlocked, "2000")).unwrap();

        let latest = db.latest().unwrap().unwrap();
        assert_eq!(latest.entry, entry(DoorState::Unlocked, "2000"));
        assert_eq!(latest.id, 2);
        assert_eq!(latest.recorded_at.len(), "2026-01-01 00:00:00".len());
        assert_eq!(db.count().unwrap(), 2);
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let mut db = SqliteHistory::open_in_memory().unwrap();
        for i in 0..5 {
            db.append(&entry(DoorState::Locked, &i.to_string())).unwrap();
        }

        let recent = db.recent(3).unwrap();
        let stamps: Vec<_> = recent.iter().map(|e| e.entry.timestamp.as_str()).collect();
        assert_eq!(stamps, vec!["4", "3", "2"]);
    }

    #[test]
    fn test_corrupt_state_is_reported() {
        let db = SqliteHistory::open_in_memory().unwrap();
        db.conn
            .execute(
                "INSERT INTO door_events (state, source, timestamp, recorded_at) VALUES ('ajar', 's', 't', 'r')",
                [],
            )
            .unwrap();

        let err = db.latest().unwrap_err();
        assert!(matches!(err, StoreError::CorruptRow { id: 1, .. }));
    }
}
