//! Shared read/write plumbing for byte-stream backed channels.

use std::io::{self, ErrorKind, Read, Write};

use doorlink_protocol::LineBuffer;
use tracing::warn;

use crate::error::{ChannelError, ChannelResult};

const READ_CHUNK: usize = 512;

/// Outcome of one bounded read.
pub(crate) enum Fill {
    /// New bytes were appended to the line buffer.
    Data,
    /// The read timed out with nothing to show.
    Idle,
    /// The remote end closed the stream.
    Eof,
}

/// Perform at most one read from `reader` into `lines`.
pub(crate) fn fill_from<R: Read + ?Sized>(
    reader: &mut R,
    lines: &mut LineBuffer,
    peer: &str,
) -> io::Result<Fill> {
    let mut chunk = [0u8; READ_CHUNK];
    match reader.read(&mut chunk) {
        Ok(0) => Ok(Fill::Eof),
        Ok(n) => {
            if let Err(e) = lines.push(&chunk[..n]) {
                warn!(peer = %peer, "discarding oversized input: {e}");
            }
            Ok(Fill::Data)
        }
        Err(e) if is_idle(&e) => Ok(Fill::Idle),
        Err(e) => Err(e),
    }
}

/// Read-side state machine shared by the serial and TCP channels.
///
/// `read` is the raw bounded read; on end of stream or error the channel is
/// marked closed.
pub(crate) fn read_line_with<F>(
    open: &mut bool,
    lines: &mut LineBuffer,
    peer: &str,
    read: F,
) -> ChannelResult<Option<String>>
where
    F: FnOnce(&mut LineBuffer) -> io::Result<Fill>,
{
    if !*open {
        return Err(ChannelError::Closed(peer.to_string()));
    }
    if let Some(line) = lines.next_line() {
        return Ok(Some(line));
    }

    match read(lines) {
        Ok(Fill::Data) => Ok(lines.next_line()),
        Ok(Fill::Idle) => Ok(None),
        Ok(Fill::Eof) => {
            *open = false;
            Err(ChannelError::Disconnected(peer.to_string()))
        }
        Err(e) => {
            *open = false;
            Err(ChannelError::io(peer, e))
        }
    }
}

/// Write one framed line, closing the channel on failure.
pub(crate) fn write_line_to<W: Write + ?Sized>(
    writer: &mut W,
    open: &mut bool,
    peer: &str,
    line: &str,
) -> ChannelResult<()> {
    if !*open {
        return Err(ChannelError::Closed(peer.to_string()));
    }

    let frame = LineBuffer::encode_line(line);
    let result = writer.write_all(&frame).and_then(|_| writer.flush());
    result.map_err(|e| {
        *open = false;
        ChannelError::io(peer, e)
    })
}

fn is_idle(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}
