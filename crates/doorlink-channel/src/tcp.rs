//! TCP socket backed line channel.

use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use doorlink_protocol::LineBuffer;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};
use crate::stream::{fill_from, read_line_with, write_line_to};
use crate::LineChannel;

/// Smallest read timeout handed to the socket; a zero timeout is rejected
/// by `set_read_timeout`.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// A line channel over a connected TCP stream.
#[derive(Debug)]
pub struct TcpChannel {
    stream: TcpStream,
    lines: LineBuffer,
    peer: String,
    open: bool,
    read_timeout: Option<Duration>,
}

impl TcpChannel {
    /// Wrap an already connected stream (for example one returned by
    /// `TcpListener::accept`).
    pub fn from_stream(stream: TcpStream) -> ChannelResult<Self> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "tcp peer".to_string());

        stream
            .set_nonblocking(false)
            .map_err(|e| ChannelError::io(&peer, e))?;
        stream
            .set_nodelay(true)
            .map_err(|e| ChannelError::io(&peer, e))?;

        Ok(TcpChannel {
            stream,
            lines: LineBuffer::new(),
            peer,
            open: true,
            read_timeout: None,
        })
    }

    /// Connect to `addr`, giving up after `timeout`.
    pub fn connect<A: ToSocketAddrs>(addr: A, timeout: Duration) -> ChannelResult<Self> {
        let addrs: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| ChannelError::io("address lookup", e))?
            .collect();

        let mut last_err = None;
        for candidate in addrs {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => return Self::from_stream(stream),
                Err(e) => {
                    debug!(addr = %candidate, "connect failed: {e}");
                    last_err = Some(ChannelError::io(&candidate.to_string(), e));
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            ChannelError::io(
                "address lookup",
                std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses resolved"),
            )
        }))
    }

    /// Create a second handle on the same socket with its own read buffer.
    ///
    /// Lets one thread block in `read_line` while another writes.
    pub fn try_clone(&self) -> ChannelResult<Self> {
        let stream = self
            .stream
            .try_clone()
            .map_err(|e| ChannelError::io(&self.peer, e))?;
        Ok(TcpChannel {
            stream,
            lines: LineBuffer::new(),
            peer: self.peer.clone(),
            open: self.open,
            read_timeout: None,
        })
    }

    /// Remote address of the connection.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    fn apply_read_timeout(&mut self, timeout: Duration) -> std::io::Result<()> {
        let timeout = timeout.max(MIN_READ_TIMEOUT);
        if self.read_timeout != Some(timeout) {
            self.stream.set_read_timeout(Some(timeout))?;
            self.read_timeout = Some(timeout);
        }
        Ok(())
    }
}

impl LineChannel for TcpChannel {
    fn read_line(&mut self, timeout: Duration) -> ChannelResult<Option<String>> {
        if self.open {
            if let Err(e) = self.apply_read_timeout(timeout) {
                self.open = false;
                return Err(ChannelError::io(&self.peer, e));
            }
        }

        let stream = &mut self.stream;
        let peer = self.peer.as_str();
        read_line_with(&mut self.open, &mut self.lines, peer, |buf| {
            fill_from(stream, buf, peer)
        })
    }

    fn write_line(&mut self, line: &str) -> ChannelResult<()> {
        write_line_to(&mut self.stream, &mut self.open, &self.peer, line)
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) {
        if self.open {
            let _ = self.stream.shutdown(Shutdown::Both);
            self.open = false;
        }
    }

    fn describe(&self) -> &str {
        &self.peer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::TcpListener;

    fn pair() -> (TcpChannel, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let channel = TcpChannel::connect(addr, Duration::from_secs(1)).unwrap();
        let (server_side, _) = listener.accept().unwrap();
        (channel, server_side)
    }

    #[test]
    fn test_read_times_out_without_data() {
        let (mut channel, _server) = pair();
        let line = channel.read_line(Duration::from_millis(20)).unwrap();
        assert!(line.is_none());
        assert!(channel.is_open());
    }

    #[test]
    fn test_read_assembles_split_line() {
        let (mut channel, mut server) = pair();
        server.write_all(b"{\"type\":").unwrap();
        server.flush().unwrap();
        assert!(channel.read_line(Duration::from_millis(50)).unwrap().is_none());

        server.write_all(b"\"SYNC\"}\r\n").unwrap();
        let line = channel.read_line(Duration::from_millis(500)).unwrap();
        assert_eq!(line.as_deref(), Some(r#"{"type":"SYNC"}"#));
    }

    #[test]
    fn test_peer_hangup_closes_channel() {
        let (mut channel, server) = pair();
        drop(server);

        let err = channel.read_line(Duration::from_millis(500)).unwrap_err();
        assert!(matches!(err, ChannelError::Disconnected(_)));
        assert!(!channel.is_open());
        assert!(matches!(
            channel.write_line("x").unwrap_err(),
            ChannelError::Closed(_)
        ));
    }

    #[test]
    fn test_clone_shares_socket() {
        let (channel, server) = pair();
        let mut writer = channel.try_clone().unwrap();
        writer.write_line(r#"{"command":"lock","source":"laptop"}"#).unwrap();

        let mut server = TcpChannel::from_stream(server).unwrap();
        let line = server.read_line(Duration::from_millis(500)).unwrap();
        assert_eq!(line.as_deref(), Some(r#"{"command":"lock","source":"laptop"}"#));
    }
}
