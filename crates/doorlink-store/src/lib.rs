//! Door state store.
//!
//! Holds the single authoritative [`DoorStatus`] and the append-only history
//! of confirmed transitions. History is written through one or more
//! [`HistorySink`]s:
//!
//! - [`SqliteHistory`]: the `door_events` table, the primary record
//! - [`DailyLog`]: a plain-text file per local date (`YYYY-MM-DD.txt`)
//! - [`MemoryHistory`]: vector-backed sink for tests
//!
//! [`StateStore::record`] commits to the primary sink before the new state
//! becomes visible through [`StateStore::current`], so a reader can never see
//! a state whose history entry has not been written. The daily log is a
//! mirror: it is written after the commit and a failure there is logged but
//! does not roll the state back.

mod daily_log;
mod entry;
mod error;
mod memory;
mod sqlite;
mod store;

pub use daily_log::DailyLog;
pub use doorlink_protocol::DoorStatus;
pub use entry::{HistoryEntry, PersistedEntry};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryHistory;
pub use sqlite::SqliteHistory;
pub use store::{Recorded, StateStore, StoreConfig};

/// Destination for history entries.
pub trait HistorySink: Send {
    /// Durably append one entry. Must not return before the entry is
    /// written (or has definitively failed).
    fn append(&mut self, entry: &HistoryEntry) -> StoreResult<()>;

    /// Short name used in logs.
    fn name(&self) -> &str;
}
