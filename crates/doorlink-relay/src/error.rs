//! Error types for the relay service.

use doorlink_channel::ChannelError;
use doorlink_store::StoreError;
use thiserror::Error;

/// Errors that stop the relay (startup failures and loss of the device).
///
/// Per-message problems never surface here; the loop logs them and moves on.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The device channel could not be opened.
    #[error("device channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The state store could not be opened.
    #[error("state store error: {0}")]
    Store(#[from] StoreError),

    /// The control-client listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested listen address.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Listener failure after startup.
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),

    /// The device stayed unreachable after every reconnect attempt.
    #[error("device {device} lost after {attempts} reconnect attempts")]
    DeviceLost {
        /// Device label.
        device: String,
        /// Consecutive failed attempts.
        attempts: u32,
    },

    /// Installing the shutdown signal handler failed.
    #[error("signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    /// The relay thread panicked.
    #[error("relay thread panicked")]
    Panicked,
}

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;
