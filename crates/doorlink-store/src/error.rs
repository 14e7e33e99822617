//! Error types for the state store.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting or reading history.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Failure writing the daily text log.
    #[error("log file error on {}: {source}", path.display())]
    LogFile {
        /// File being written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A stored row could not be interpreted.
    #[error("corrupt history row {id}: {reason}")]
    CorruptRow {
        /// Row id.
        id: i64,
        /// What was wrong with it.
        reason: String,
    },

    /// The sink refused the write.
    #[error("history sink unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
