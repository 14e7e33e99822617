//! The authoritative door state and its write-through history.

use std::path::PathBuf;

use doorlink_protocol::DoorStatus;
use tracing::{error, info};

use crate::daily_log::DailyLog;
use crate::entry::HistoryEntry;
use crate::error::StoreResult;
use crate::sqlite::SqliteHistory;
use crate::HistorySink;

/// Where the relay keeps its history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Directory for the daily text logs. `None` disables them.
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            db_path: PathBuf::from("door_events.db"),
            log_dir: Some(PathBuf::from(".")),
        }
    }
}

/// Outcome of a committed [`StateStore::record`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    /// The new current state.
    pub status: DoorStatus,
    /// Mirrors that failed to take the entry after it was committed.
    pub mirror_failures: usize,
}

/// Current door state plus the sinks that record every change to it.
///
/// One sink is the primary: an entry is committed once the primary holds it
/// and only then becomes visible through [`StateStore::current`]. Mirrors
/// (the daily text log) are written after the commit and never undo it; a
/// mirror failure is logged and reported in [`Recorded::mirror_failures`].
pub struct StateStore {
    primary: Option<Box<dyn HistorySink>>,
    mirrors: Vec<Box<dyn HistorySink>>,
    current: DoorStatus,
}

impl StateStore {
    /// A store with no sinks, starting `unknown`.
    pub fn new() -> Self {
        StateStore {
            primary: None,
            mirrors: Vec::new(),
            current: DoorStatus::default(),
        }
    }

    /// Open the on-disk store described by `config`.
    ///
    /// The database is the primary; the daily log, if enabled, is a mirror.
    /// The snapshot is seeded from the newest row in the database, so a
    /// restarted relay answers sync requests with the last confirmed state.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let db = SqliteHistory::open(&config.db_path)?;
        let seeded = db.latest()?;

        let mut store = StateStore::new().with_primary(db);
        if let Some(dir) = &config.log_dir {
            store = store.with_mirror(DailyLog::new(dir)?);
        }

        if let Some(latest) = seeded {
            info!(
                state = %latest.entry.state,
                source = %latest.entry.source,
                "restored door state from history"
            );
            store.current = DoorStatus::from(latest.entry);
        }
        Ok(store)
    }

    /// Set the sink whose append commits an entry.
    pub fn with_primary(mut self, sink: impl HistorySink + 'static) -> Self {
        self.primary = Some(Box::new(sink));
        self
    }

    /// Add a best-effort sink written after each commit, in the order added.
    pub fn with_mirror(mut self, sink: impl HistorySink + 'static) -> Self {
        self.mirrors.push(Box::new(sink));
        self
    }

    /// Replace the snapshot without writing history.
    pub fn with_status(mut self, status: DoorStatus) -> Self {
        self.current = status;
        self
    }

    /// Commit `entry` to the primary, make it the current state, then copy
    /// it to every mirror.
    ///
    /// A primary failure is returned with nothing changed.
    pub fn record(&mut self, entry: HistoryEntry) -> StoreResult<Recorded> {
        if let Some(primary) = self.primary.as_mut() {
            if let Err(e) = primary.append(&entry) {
                error!(sink = primary.name(), state = %entry.state, "history append failed: {e}");
                return Err(e);
            }
        }

        let mut mirror_failures = 0;
        for mirror in &mut self.mirrors {
            if let Err(e) = mirror.append(&entry) {
                error!(
                    sink = mirror.name(),
                    state = %entry.state,
                    "mirror append failed after commit: {e}"
                );
                mirror_failures += 1;
            }
        }

        self.current = DoorStatus::from(entry);
        Ok(Recorded {
            status: self.current.clone(),
            mirror_failures,
        })
    }

    /// Latest committed state.
    pub fn current(&self) -> &DoorStatus {
        &self.current
    }

    /// Primary plus mirrors.
    pub fn sink_count(&self) -> usize {
        usize::from(self.primary.is_some()) + self.mirrors.len()
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
