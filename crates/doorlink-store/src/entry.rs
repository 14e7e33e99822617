use doorlink_protocol::{DoorState, DoorStatus};
use serde::{Deserialize, Serialize};

/// One confirmed transition, as reported by the lock controller.
///
/// `timestamp` is the controller's own timestamp string, stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub state: DoorState,
    pub source: String,
    pub timestamp: String,
}

impl HistoryEntry {
    pub fn new(state: DoorState, source: impl Into<String>, timestamp: impl Into<String>) -> Self {
        HistoryEntry {
            state,
            source: source.into(),
            timestamp: timestamp.into(),
        }
    }
}

/// A history entry read back from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedEntry {
    pub id: i64,
    #[serde(flatten)]
    pub entry: HistoryEntry,
    /// Local wall-clock time the relay wrote the row.
    pub recorded_at: String,
}

impl From<HistoryEntry> for DoorStatus {
    fn from(entry: HistoryEntry) -> Self {
        DoorStatus::new(entry.state, entry.source, entry.timestamp)
    }
}
