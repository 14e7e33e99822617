//! In-process line channel pair.
//!
//! Two [`MemoryChannel`] endpoints are joined by a pair of unbounded
//! crossbeam channels carrying raw bytes. Each end frames what it receives
//! with its own [`LineBuffer`], so partial writes behave exactly like they
//! would on a serial link.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use doorlink_protocol::LineBuffer;
use tracing::warn;

use crate::error::{ChannelError, ChannelResult};
use crate::LineChannel;

/// One end of an in-memory line channel.
#[derive(Debug)]
pub struct MemoryChannel {
    tx: Option<Sender<Vec<u8>>>,
    rx: Option<Receiver<Vec<u8>>>,
    lines: LineBuffer,
    label: String,
}

impl MemoryChannel {
    /// Create a connected pair. Lines written to one end are read from the
    /// other.
    pub fn pair(a_label: &str, b_label: &str) -> (MemoryChannel, MemoryChannel) {
        let (a_tx, b_rx) = crossbeam_channel::unbounded();
        let (b_tx, a_rx) = crossbeam_channel::unbounded();

        (
            MemoryChannel::new(a_label, a_tx, a_rx),
            MemoryChannel::new(b_label, b_tx, b_rx),
        )
    }

    fn new(label: &str, tx: Sender<Vec<u8>>, rx: Receiver<Vec<u8>>) -> Self {
        MemoryChannel {
            tx: Some(tx),
            rx: Some(rx),
            lines: LineBuffer::new(),
            label: label.to_string(),
        }
    }

    /// Send raw bytes without appending a terminator.
    pub fn write_raw(&mut self, data: &[u8]) -> ChannelResult<()> {
        let Some(tx) = &self.tx else {
            return Err(ChannelError::Closed(self.label.clone()));
        };
        if tx.send(data.to_vec()).is_err() {
            self.close();
            return Err(ChannelError::Disconnected(self.label.clone()));
        }
        Ok(())
    }

    /// Read every line that is already available, without waiting.
    pub fn drain_lines(&mut self) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(Some(line)) = self.read_line(Duration::ZERO) {
            out.push(line);
        }
        out
    }

    fn absorb(&mut self, chunk: Vec<u8>) {
        if let Err(e) = self.lines.push(&chunk) {
            warn!(peer = %self.label, "discarding oversized input: {e}");
        }
    }
}

impl LineChannel for MemoryChannel {
    fn read_line(&mut self, timeout: Duration) -> ChannelResult<Option<String>> {
        let Some(rx) = self.rx.clone() else {
            return Err(ChannelError::Closed(self.label.clone()));
        };

        if let Some(line) = self.lines.next_line() {
            return Ok(Some(line));
        }

        let received = if timeout.is_zero() {
            rx.try_recv().map_err(|e| match e {
                crossbeam_channel::TryRecvError::Empty => RecvTimeoutError::Timeout,
                crossbeam_channel::TryRecvError::Disconnected => RecvTimeoutError::Disconnected,
            })
        } else {
            rx.recv_timeout(timeout)
        };

        match received {
            Ok(chunk) => {
                self.absorb(chunk);
                // Pick up anything else already queued before framing.
                while let Ok(chunk) = rx.try_recv() {
                    self.absorb(chunk);
                }
                Ok(self.lines.next_line())
            }
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                self.close();
                Err(ChannelError::Disconnected(self.label.clone()))
            }
        }
    }

    fn write_line(&mut self, line: &str) -> ChannelResult<()> {
        self.write_raw(&LineBuffer::encode_line(line))
    }

    fn is_open(&self) -> bool {
        self.tx.is_some()
    }

    fn close(&mut self) {
        self.tx = None;
        self.rx = None;
    }

    fn describe(&self) -> &str {
        &self.label
    }
}
