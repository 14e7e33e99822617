//! Door Control Client
//!
//! [`DoorClient`] holds one TCP connection to the relay. A background
//! receiver thread reads everything the relay pushes and keeps a cached
//! [`DoorStatus`]; callers on any thread issue commands and read the cache.
//!
//! The cache only changes when the relay reports a confirmed device event or
//! answers a sync request. Sending `lock` does not make the cache say
//! `locked`; the lock controller has to confirm it first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use doorlink_channel::{LineChannel, TcpChannel};
use doorlink_protocol::{CommandKind, DoorState, DoorStatus, Message};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ClientError, ClientResult};
use crate::receiver::{receive_loop, ClientEvent, Shared};

// ============================================================================
// Options
// ============================================================================

/// Source id the desktop client reports in commands.
pub const DEFAULT_SOURCE: &str = "laptop";

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// How long to wait for the TCP connection.
    pub connect_timeout: Duration,
    /// Receiver read timeout; bounds how long closing the client takes.
    pub poll_interval: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        ClientOptions {
            connect_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Connection to the relay plus the receiver thread serving it.
struct Connection {
    writer: TcpChannel,
    stop: Arc<AtomicBool>,
    receiver: Option<JoinHandle<()>>,
}

impl Connection {
    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        self.writer.close();
        if let Some(handle) = self.receiver.take() {
            if handle.join().is_err() {
                warn!("receiver thread panicked");
            }
        }
    }
}

/// A control client for the door relay.
pub struct DoorClient {
    addr: String,
    source: String,
    options: ClientOptions,
    shared: Arc<Shared>,
    connection: Mutex<Option<Connection>>,
    events_tx: Sender<ClientEvent>,
    events_rx: Receiver<ClientEvent>,
}

impl DoorClient {
    /// Connect to the relay at `addr` and request the current state.
    ///
    /// `source` identifies this client in the commands it sends.
    pub fn connect(
        addr: impl Into<String>,
        source: impl Into<String>,
        options: ClientOptions,
    ) -> ClientResult<Self> {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let client = DoorClient {
            addr: addr.into(),
            source: source.into(),
            options,
            shared: Arc::new(Shared::default()),
            connection: Mutex::new(None),
            events_tx,
            events_rx,
        };
        client.open()?;
        Ok(client)
    }

    fn open(&self) -> ClientResult<()> {
        let writer = TcpChannel::connect(self.addr.as_str(), self.options.connect_timeout)?;
        let reader = writer.try_clone()?;
        info!(addr = %self.addr, source = %self.source, "connected to relay");

        let stop = Arc::new(AtomicBool::new(false));
        self.shared.connected.store(true, Ordering::SeqCst);

        let receiver = {
            let shared = self.shared.clone();
            let events = self.events_tx.clone();
            let stop = stop.clone();
            let poll = self.options.poll_interval;
            thread::Builder::new()
                .name("doorlink-receiver".into())
                .spawn(move || receive_loop(reader, shared, events, stop, poll))
                .map_err(|e| {
                    self.shared.connected.store(false, Ordering::SeqCst);
                    ClientError::Spawn(e)
                })?
        };

        *self.connection.lock() = Some(Connection {
            writer,
            stop,
            receiver: Some(receiver),
        });
        self.request_sync()
    }

    /// Address of the relay.
    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Ask the lock controller to lock. The cached state changes only once
    /// the controller confirms.
    pub fn lock(&self) -> ClientResult<()> {
        self.send(&Message::command(CommandKind::Lock, &self.source))
    }

    /// Ask the lock controller to unlock.
    pub fn unlock(&self) -> ClientResult<()> {
        self.send(&Message::command(CommandKind::Unlock, &self.source))
    }

    /// Ask the relay for the current state. The answer arrives as
    /// [`ClientEvent::Synced`].
    pub fn request_sync(&self) -> ClientResult<()> {
        self.send(&Message::sync_request())
    }

    fn send(&self, message: &Message) -> ClientResult<()> {
        let mut guard = self.connection.lock();
        let Some(connection) = guard.as_mut() else {
            return Err(ClientError::NotConnected);
        };
        if !self.is_connected() {
            return Err(ClientError::NotConnected);
        }

        let line = message.encode();
        debug!(line = %line, "sending to relay");
        if let Err(e) = connection.writer.write_line(&line) {
            self.shared.connected.store(false, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    /// Cached door state.
    pub fn state(&self) -> DoorState {
        self.shared.status.lock().state
    }

    /// Cached door state with its last source and timestamp.
    pub fn status(&self) -> DoorStatus {
        self.shared.status.lock().clone()
    }

    /// Whether the connection to the relay is up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    /// Drop the current connection (if any), connect again and resync.
    pub fn reconnect(&self) -> ClientResult<()> {
        self.disconnect();
        self.open()
    }

    /// Close the connection and stop the receiver thread.
    pub fn disconnect(&self) {
        let connection = self.connection.lock().take();
        if let Some(mut connection) = connection {
            connection.shutdown();
            info!(addr = %self.addr, "disconnected from relay");
        }
        self.shared.connected.store(false, Ordering::SeqCst);
    }

    /// Every notification received so far, without waiting.
    pub fn events(&self) -> Vec<ClientEvent> {
        self.events_rx.try_iter().collect()
    }

    /// Wait up to `timeout` for the next notification.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<ClientEvent> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// A handle on the notification inbox, e.g. for a UI thread.
    pub fn subscribe(&self) -> Receiver<ClientEvent> {
        self.events_rx.clone()
    }
}

impl Drop for DoorClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}
