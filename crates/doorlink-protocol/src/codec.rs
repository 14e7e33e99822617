//! Newline framing for byte streams.
//!
//! Serial links and sockets both deliver arbitrary chunks of bytes. The
//! [`LineBuffer`] accumulates them and hands out complete lines, one at a
//! time, with the `\n` terminator (and an optional `\r` before it) removed.

use bytes::{Buf, BytesMut};

use crate::error::{ProtocolError, ProtocolResult};

/// Default maximum line length in bytes.
pub const MAX_LINE_LENGTH: usize = 1024;

/// Line terminator byte.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Accumulates raw bytes and splits them into lines.
#[derive(Debug)]
pub struct LineBuffer {
    /// Buffer for accumulating incoming data.
    buffer: BytesMut,
    /// Longest line accepted before the buffer is discarded.
    max_line_length: usize,
    /// Set after an overflow: input is skipped through the next terminator.
    discarding: bool,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl LineBuffer {
    /// Create a new line buffer with the default length limit.
    pub fn new() -> Self {
        Self::with_max_line_length(MAX_LINE_LENGTH)
    }

    /// Create a line buffer that rejects lines longer than `max_line_length`.
    pub fn with_max_line_length(max_line_length: usize) -> Self {
        LineBuffer {
            buffer: BytesMut::with_capacity(max_line_length * 2),
            max_line_length,
            discarding: false,
        }
    }

    /// Add received data to the buffer.
    ///
    /// Complete lines are kept. If the unterminated tail grows past the
    /// length limit it is dropped and [`ProtocolError::LineTooLong`] is
    /// returned; lines already framed stay available. The rest of the
    /// dropped line, up to and including its terminator, is skipped as it
    /// arrives.
    pub fn push(&mut self, data: &[u8]) -> ProtocolResult<()> {
        let data = if self.discarding {
            match data.iter().position(|&b| b == LINE_TERMINATOR) {
                Some(pos) => {
                    self.discarding = false;
                    &data[pos + 1..]
                }
                None => return Ok(()),
            }
        } else {
            data
        };
        self.buffer.extend_from_slice(data);

        let tail_start = self
            .buffer
            .iter()
            .rposition(|&b| b == LINE_TERMINATOR)
            .map(|pos| pos + 1)
            .unwrap_or(0);
        let tail_len = self.buffer.len() - tail_start;

        if tail_len > self.max_line_length {
            self.buffer.truncate(tail_start);
            self.discarding = true;
            return Err(ProtocolError::LineTooLong {
                max: self.max_line_length,
                actual: tail_len,
            });
        }

        Ok(())
    }

    /// Take the next complete, non-empty line out of the buffer.
    ///
    /// Returns `None` when more data is needed.
    pub fn next_line(&mut self) -> Option<String> {
        loop {
            let end = self.buffer.iter().position(|&b| b == LINE_TERMINATOR)?;

            let mut line = self.buffer.split_to(end);
            self.buffer.advance(1);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }

            if line.is_empty() {
                continue;
            }
            if line.len() > self.max_line_length {
                log::warn!(
                    "dropping {}-byte line (limit {})",
                    line.len(),
                    self.max_line_length
                );
                continue;
            }

            return Some(String::from_utf8_lossy(&line).into_owned());
        }
    }

    /// Encode a line for transmission by appending the terminator.
    pub fn encode_line(line: &str) -> Vec<u8> {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(LINE_TERMINATOR);
        buf
    }

    /// Get the number of buffered bytes.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.discarding = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_line() {
        assert_eq!(LineBuffer::encode_line(r#"{"type":"SYNC"}"#), b"{\"type\":\"SYNC\"}\n");
    }

    #[test]
    fn test_next_line_strips_crlf() {
        let mut buf = LineBuffer::new();
        buf.push(b"line1\r\nline2\n").unwrap();

        assert_eq!(buf.next_line(), Some("line1".to_string()));
        assert_eq!(buf.next_line(), Some("line2".to_string()));
        assert!(buf.next_line().is_none());
    }

    #[test]
    fn test_partial_line() {
        let mut buf = LineBuffer::new();
        buf.push(b"{\"type\":").unwrap();
        assert!(buf.next_line().is_none());

        buf.push(b"\"SYNC\"}\n").unwrap();
        assert_eq!(buf.next_line(), Some(r#"{"type":"SYNC"}"#.to_string()));
        assert_eq!(buf.buffered_len(), 0);
    }

    #[test]
    fn test_skips_empty_lines() {
        let mut buf = LineBuffer::new();
        buf.push(b"\r\n\n\r\nabc\n").unwrap();
        assert_eq!(buf.next_line(), Some("abc".to_string()));
        assert!(buf.next_line().is_none());
    }

    #[test]
    fn test_overlong_tail_is_dropped() {
        let mut buf = LineBuffer::with_max_line_length(8);
        buf.push(b"ok\n").unwrap();

        let err = buf.push(b"0123456789").unwrap_err();
        assert_eq!(err, ProtocolError::LineTooLong { max: 8, actual: 10 });

        // The complete line survives, the junk tail does not.
        assert_eq!(buf.next_line(), Some("ok".to_string()));
        assert_eq!(buf.buffered_len(), 0);
    }

    #[test]
    fn test_rest_of_overlong_line_is_skipped() {
        let mut buf = LineBuffer::with_max_line_length(16);
        assert!(buf.push(&[b'x'; 20]).is_err());

        // Still the same logical line; it must not surface as a message.
        buf.push(b"xx{\"type\":\"SYNC\"}").unwrap();
        assert!(buf.next_line().is_none());
        buf.push(b"\n{\"type\":\"ack\",\"status\":\"ok\"}\n").unwrap();

        assert_eq!(buf.next_line(), Some(r#"{"type":"ack","status":"ok"}"#.to_string()));
        assert!(buf.next_line().is_none());
        assert_eq!(buf.buffered_len(), 0);
    }

    #[test]
    fn test_clear_ends_discarding() {
        let mut buf = LineBuffer::with_max_line_length(4);
        assert!(buf.push(b"abcdef").is_err());
        buf.clear();
        buf.push(b"ok\n").unwrap();
        assert_eq!(buf.next_line(), Some("ok".to_string()));
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut buf = LineBuffer::new();
        buf.push(&[b'a', 0xFF, b'b', b'\n']).unwrap();
        assert_eq!(buf.next_line(), Some("a\u{FFFD}b".to_string()));
    }
}
