//! Serial device backed line channel.
//!
//! The lock controller is wired to the relay over a UART at 115200 baud,
//! 8 data bits, no parity, 1 stop bit and no flow control.

use std::time::Duration;

use doorlink_protocol::LineBuffer;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::info;

use crate::error::ChannelResult;
use crate::stream::{fill_from, read_line_with, write_line_to};
use crate::LineChannel;

/// Baud rate used by the lock controller firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Initial port timeout; replaced by the caller's timeout on every read.
const OPEN_TIMEOUT: Duration = Duration::from_millis(100);

/// How to open the serial device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialSettings {
    /// Device path, e.g. `/dev/ttyACM0`.
    pub path: String,
    /// Line speed.
    pub baud_rate: u32,
}

impl SerialSettings {
    /// Settings for `path` at the controller's baud rate.
    pub fn new(path: impl Into<String>) -> Self {
        SerialSettings {
            path: path.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Override the baud rate.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }
}

/// A line channel over a serial device.
pub struct SerialChannel {
    port: Box<dyn SerialPort>,
    lines: LineBuffer,
    path: String,
    open: bool,
    read_timeout: Duration,
}

impl SerialChannel {
    /// Open and configure the device (8N1, no flow control).
    pub fn open(settings: &SerialSettings) -> ChannelResult<Self> {
        let port = serialport::new(&settings.path, settings.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(OPEN_TIMEOUT)
            .open()?;

        // Stale bytes from before we attached would only produce half lines.
        port.clear(serialport::ClearBuffer::Input)?;

        info!(path = %settings.path, baud = settings.baud_rate, "serial port opened");

        Ok(SerialChannel {
            port,
            lines: LineBuffer::new(),
            path: settings.path.clone(),
            open: true,
            read_timeout: OPEN_TIMEOUT,
        })
    }
}

impl LineChannel for SerialChannel {
    fn read_line(&mut self, timeout: Duration) -> ChannelResult<Option<String>> {
        if self.open && self.read_timeout != timeout {
            if let Err(e) = self.port.set_timeout(timeout) {
                self.open = false;
                return Err(e.into());
            }
            self.read_timeout = timeout;
        }

        let port = &mut self.port;
        let path = self.path.as_str();
        read_line_with(&mut self.open, &mut self.lines, path, |buf| {
            fill_from(port.as_mut(), buf, path)
        })
    }

    fn write_line(&mut self, line: &str) -> ChannelResult<()> {
        write_line_to(self.port.as_mut(), &mut self.open, &self.path, line)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> &str {
        &self.path
    }
}
