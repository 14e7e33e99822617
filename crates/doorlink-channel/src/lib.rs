//! Line channels.
//!
//! A [`LineChannel`] is a bidirectional byte stream framed on `\n`
//! boundaries. The relay talks to the lock controller through a
//! [`SerialChannel`] and to the control client through a [`TcpChannel`];
//! tests and embedders can wire endpoints together with [`MemoryChannel`].
//!
//! Reads are always bounded by a timeout so a single thread can service
//! several channels in turn without any of them stalling the others.

mod error;
mod memory;
mod serial;
mod stream;
mod tcp;

use std::time::Duration;

pub use error::{ChannelError, ChannelResult};
pub use memory::MemoryChannel;
pub use serial::{SerialChannel, SerialSettings, DEFAULT_BAUD_RATE};
pub use tcp::TcpChannel;

/// A newline-framed, bidirectional message channel.
pub trait LineChannel: Send {
    /// Wait up to `timeout` for one complete line.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a full line. A
    /// line that was already buffered is returned without touching the
    /// underlying device. Errors mean the channel is now closed.
    fn read_line(&mut self, timeout: Duration) -> ChannelResult<Option<String>>;

    /// Write `line` followed by a single `\n`.
    ///
    /// A failed write closes the channel and is reported to the caller; it
    /// is never retried.
    fn write_line(&mut self, line: &str) -> ChannelResult<()>;

    /// Whether the channel is still usable.
    fn is_open(&self) -> bool;

    /// Close the channel. Further reads and writes fail with
    /// [`ChannelError::Closed`].
    fn close(&mut self);

    /// Human-readable name of the remote end, for logs.
    fn describe(&self) -> &str;
}
