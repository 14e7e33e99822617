//! Error types for line channels.

use thiserror::Error;

/// Errors raised by a [`LineChannel`](crate::LineChannel).
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The channel was already closed locally or by an earlier failure.
    #[error("channel to {0} is closed")]
    Closed(String),

    /// The remote end went away (end of stream or dropped pipe).
    #[error("{0} disconnected")]
    Disconnected(String),

    /// I/O failure on the underlying stream.
    #[error("I/O error on {peer}: {source}")]
    Io {
        /// Channel the failure happened on.
        peer: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The serial device could not be opened or configured.
    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),
}

impl ChannelError {
    pub(crate) fn io(peer: &str, source: std::io::Error) -> Self {
        ChannelError::Io {
            peer: peer.to_string(),
            source,
        }
    }
}

/// Result type alias for channel operations.
pub type ChannelResult<T> = Result<T, ChannelError>;
