//! Plain-text daily history log.
//!
//! One file per local calendar date, named `YYYY-MM-DD.txt`, one line per
//! entry:
//!
//! ```text
//! 2026-03-14 09:26:53 - State: unlocked, Source: stm32, Timestamp: 1710408413
//! ```

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};

use crate::entry::HistoryEntry;
use crate::error::{StoreError, StoreResult};
use crate::sqlite::RECORDED_AT_FORMAT;
use crate::HistorySink;

/// History sink appending to `<dir>/<YYYY-MM-DD>.txt`.
#[derive(Debug, Clone)]
pub struct DailyLog {
    dir: PathBuf,
}

impl DailyLog {
    /// Log into `dir`, creating it if missing.
    pub fn new(dir: impl Into<PathBuf>) -> StoreResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| StoreError::LogFile {
            path: dir.clone(),
            source,
        })?;
        Ok(DailyLog { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that holds entries for `date`.
    pub fn path_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.txt", date.format("%Y-%m-%d")))
    }

    /// Append `entry` as if written at `now`.
    pub fn append_at(&self, entry: &HistoryEntry, now: DateTime<Local>) -> StoreResult<()> {
        let path = self.path_for(now.date_naive());
        let line = format_line(entry, &now);

        let write = || -> std::io::Result<()> {
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(line.as_bytes())?;
            file.sync_data()
        };
        write().map_err(|source| StoreError::LogFile {
            path: path.clone(),
            source,
        })
    }
}

impl HistorySink for DailyLog {
    fn append(&mut self, entry: &HistoryEntry) -> StoreResult<()> {
        self.append_at(entry, Local::now())
    }

    fn name(&self) -> &str {
        "daily-log"
    }
}

fn format_line(entry: &HistoryEntry, now: &DateTime<Local>) -> String {
    format!(
        "{} - State: {}, Source: {}, Timestamp: {}\n",
        now.format(RECORDED_AT_FORMAT),
        entry.state,
        entry.source,
        entry.timestamp
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use doorlink_protocol::DoorState;

    fn at(y: i32, m: u32, d: u32, hh: u32, mm: u32, ss: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(y, m, d, hh, mm, ss).unwrap()
    }

    #[test]
    fn test_line_format() {
        let entry = HistoryEntry::new(DoorState::Unlocked, "stm32", "1710408413");
        assert_eq!(
            format_line(&entry, &at(2026, 3, 14, 9, 26, 53)),
            "2026-03-14 09:26:53 - State: unlocked, Source: stm32, Timestamp: 1710408413\n"
        );
    }

    #[test]
    fn test_entries_split_by_date() {
        let dir = tempfile::tempdir().unwrap();
        let log = DailyLog::new(dir.path()).unwrap();
        let entry = HistoryEntry::new(DoorState::Locked, "stm32", "t");

        log.append_at(&entry, at(2026, 1, 1, 10, 0, 0)).unwrap();
        log.append_at(&entry, at(2026, 1, 1, 11, 0, 0)).unwrap();
        log.append_at(&entry, at(2026, 1, 2, 0, 0, 1)).unwrap();

        let first = fs::read_to_string(dir.path().join("2026-01-01.txt")).unwrap();
        let second = fs::read_to_string(dir.path().join("2026-01-02.txt")).unwrap();
        assert_eq!(first.lines().count(), 2);
        assert_eq!(second.lines().count(), 1);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("logs").join("door");
        let log = DailyLog::new(&nested).unwrap();
        assert!(nested.is_dir());
        assert_eq!(log.dir(), nested.as_path());
    }
}
