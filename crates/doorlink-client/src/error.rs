//! Error types for the control client.

use doorlink_channel::ChannelError;
use thiserror::Error;

/// Errors returned by [`DoorClient`](crate::DoorClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connecting to or talking with the relay failed.
    #[error("relay connection error: {0}")]
    Channel(#[from] ChannelError),

    /// The connection was lost; call `reconnect` first.
    #[error("not connected to the relay")]
    NotConnected,

    /// The receiver thread could not be started.
    #[error("failed to start receiver thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
