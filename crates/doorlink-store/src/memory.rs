use std::sync::Arc;

use parking_lot::Mutex;

use crate::entry::HistoryEntry;
use crate::error::{StoreError, StoreResult};
use crate::HistorySink;

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<HistoryEntry>,
    failing: bool,
}

/// Vector-backed history sink.
///
/// Clones share the same storage, so a test can keep one handle while the
/// store owns another. [`MemoryHistory::set_failing`] makes every append
/// fail until cleared.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_failing(&self, failing: bool) {
        self.inner.lock().failing = failing;
    }
}

impl HistorySink for MemoryHistory {
    fn append(&mut self, entry: &HistoryEntry) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.failing {
            return Err(StoreError::Unavailable("memory history set to fail".into()));
        }
        inner.entries.push(entry.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
