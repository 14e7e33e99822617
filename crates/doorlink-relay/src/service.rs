//! The relay's single-threaded event loop.
//!
//! Each iteration:
//!
//! 1. accept a control client if none is connected (non-blocking)
//! 2. reopen the device if it was lost and a retry is due
//! 3. read at most one line from each channel, sharing the poll timeout
//!    between them so one iteration never exceeds it
//! 4. hand each line to [`RelayCore`] and perform the resulting writes
//!
//! The loop checks its `running` flag once per iteration and so observes a
//! stop request within one poll timeout.

use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use doorlink_channel::{ChannelResult, LineChannel, TcpChannel};
use doorlink_store::DoorStatus;
use tracing::{debug, error, info, warn};

use crate::config::RelayConfig;
use crate::counters::metric_defs;
use crate::error::{RelayError, RelayResult};
use crate::routing::{Dispatch, Outgoing, Peer, RelayCore};

// ============================================================================
// Device link
// ============================================================================

/// Reopens the device channel after it was lost.
pub type DeviceOpener = Box<dyn FnMut() -> ChannelResult<Box<dyn LineChannel>> + Send>;

/// The device side of the relay and its reconnect bookkeeping.
struct DeviceLink {
    channel: Option<Box<dyn LineChannel>>,
    label: String,
    opener: Option<DeviceOpener>,
    failures: u32,
    next_attempt: Instant,
}

impl DeviceLink {
    fn is_open(&self) -> bool {
        self.channel.as_ref().is_some_and(|c| c.is_open())
    }

    fn mark_lost(&mut self, retry_after: Duration) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.failures = 0;
        self.next_attempt = Instant::now() + retry_after;
    }

    /// Reopen the device if it is down and a retry is due.
    fn maintain(&mut self, config: &RelayConfig) -> RelayResult<()> {
        if self.is_open() {
            return Ok(());
        }
        if self.channel.is_some() {
            warn!(device = %self.label, "device channel closed");
            self.mark_lost(config.reconnect_interval);
        }

        let Some(opener) = self.opener.as_mut() else {
            error!(device = %self.label, "device lost and no way to reopen it");
            return Err(RelayError::DeviceLost {
                device: self.label.clone(),
                attempts: 0,
            });
        };
        if Instant::now() < self.next_attempt {
            return Ok(());
        }

        match opener() {
            Ok(channel) => {
                info!(device = %channel.describe(), "device reconnected");
                metrics::counter!(metric_defs::DEVICE_RECONNECTS.name).increment(1);
                self.label = channel.describe().to_string();
                self.channel = Some(channel);
                self.failures = 0;
            }
            Err(e) => {
                self.failures += 1;
                warn!(
                    device = %self.label,
                    attempt = self.failures,
                    max = config.max_reconnect_attempts,
                    "device reopen failed: {e}"
                );
                if self.failures >= config.max_reconnect_attempts {
                    error!(device = %self.label, "giving up on device");
                    return Err(RelayError::DeviceLost {
                        device: self.label.clone(),
                        attempts: self.failures,
                    });
                }
                self.next_attempt = Instant::now() + config.reconnect_interval;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Service
// ============================================================================

/// The relay service: listener, device link and routing core.
pub struct RelayService {
    config: RelayConfig,
    core: RelayCore,
    listener: TcpListener,
    local_addr: SocketAddr,
    device: DeviceLink,
    client: Option<TcpChannel>,
    running: Arc<AtomicBool>,
}

impl RelayService {
    /// Bind the control-client listener and take ownership of an already
    /// opened device channel.
    pub fn bind(
        config: RelayConfig,
        core: RelayCore,
        device: Box<dyn LineChannel>,
    ) -> RelayResult<Self> {
        let listener =
            TcpListener::bind(&config.listen_addr).map_err(|source| RelayError::Bind {
                addr: config.listen_addr.clone(),
                source,
            })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(
            addr = %local_addr,
            device = %device.describe(),
            device_id = %core.device_id(),
            "relay listening"
        );

        Ok(RelayService {
            device: DeviceLink {
                label: device.describe().to_string(),
                channel: Some(device),
                opener: None,
                failures: 0,
                next_attempt: Instant::now(),
            },
            config,
            core,
            listener,
            local_addr,
            client: None,
            running: Arc::new(AtomicBool::new(true)),
        })
    }

    /// Allow the device to be reopened after it is lost.
    pub fn with_reopen<F>(mut self, opener: F) -> Self
    where
        F: FnMut() -> ChannelResult<Box<dyn LineChannel>> + Send + 'static,
    {
        self.device.opener = Some(Box::new(opener));
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Flag checked once per iteration; storing `false` stops the loop.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn status(&self) -> &DoorStatus {
        self.core.status()
    }

    pub fn client_connected(&self) -> bool {
        self.client.as_ref().is_some_and(|c| c.is_open())
    }

    pub fn device_connected(&self) -> bool {
        self.device.is_open()
    }

    /// Run until the running flag is cleared or the device is lost for good.
    pub fn run(mut self) -> RelayResult<()> {
        let mut result = Ok(());
        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.poll_once() {
                result = Err(e);
                break;
            }
        }
        self.running.store(false, Ordering::SeqCst);
        self.shutdown();
        result
    }

    /// Run on a background thread.
    pub fn spawn(self) -> RelayResult<RelayHandle> {
        let running = self.running.clone();
        let local_addr = self.local_addr;
        let thread = thread::Builder::new()
            .name("doorlink-relay".into())
            .spawn(move || self.run())?;

        Ok(RelayHandle {
            running,
            thread: Some(thread),
            local_addr,
        })
    }

    /// One loop iteration.
    pub fn poll_once(&mut self) -> RelayResult<()> {
        if self.client.as_ref().is_some_and(|c| !c.is_open()) {
            self.drop_client();
        }
        if self.client.is_none() {
            self.accept_client();
        }
        self.device.maintain(&self.config)?;

        let active = usize::from(self.device.is_open()) + usize::from(self.client.is_some());
        if active == 0 {
            thread::sleep(self.config.poll_timeout);
            return Ok(());
        }
        let slice = self.config.poll_timeout / active as u32;

        if let Some(line) = self.read_device(slice) {
            let dispatch = self.core.on_device_line(&line, self.client_connected());
            self.apply(dispatch);
        }
        if let Some(line) = self.read_client(slice) {
            let dispatch = self.core.on_client_line(&line);
            self.apply(dispatch);
        }
        Ok(())
    }

    fn accept_client(&mut self) {
        match self.listener.accept() {
            Ok((stream, addr)) => match TcpChannel::from_stream(stream) {
                Ok(channel) => {
                    info!(addr = %addr, "client connected");
                    metrics::counter!(metric_defs::CLIENT_CONNECTIONS.name).increment(1);
                    self.client = Some(channel);
                }
                Err(e) => warn!(addr = %addr, "failed to set up client connection: {e}"),
            },
            Err(e) if e.kind() == ErrorKind::WouldBlock => {}
            Err(e) => warn!("accept failed: {e}"),
        }
    }

    fn drop_client(&mut self) {
        if let Some(mut client) = self.client.take() {
            info!(peer = %client.describe(), "client disconnected");
            client.close();
        }
    }

    fn read_device(&mut self, timeout: Duration) -> Option<String> {
        let channel = self.device.channel.as_mut()?;
        match channel.read_line(timeout) {
            Ok(line) => line,
            Err(e) => {
                warn!(device = %self.device.label, "device channel lost: {e}");
                self.device.mark_lost(self.config.reconnect_interval);
                None
            }
        }
    }

    fn read_client(&mut self, timeout: Duration) -> Option<String> {
        let client = self.client.as_mut()?;
        match client.read_line(timeout) {
            Ok(line) => line,
            Err(e) => {
                debug!("client read ended: {e}");
                self.drop_client();
                None
            }
        }
    }

    fn apply(&mut self, dispatch: Dispatch) {
        for action in dispatch {
            match action {
                Outgoing::Send {
                    to: Peer::Device,
                    line,
                } => {
                    self.write_device(&line);
                }
                Outgoing::Send {
                    to: Peer::Client,
                    line,
                } => self.write_client(&line),
                Outgoing::ForwardCommand { line } => {
                    let delivered = self.write_device(&line);
                    self.write_client(&RelayCore::command_ack(delivered));
                }
            }
        }
    }

    /// Returns whether the line was written.
    fn write_device(&mut self, line: &str) -> bool {
        match self.device.channel.as_mut() {
            Some(channel) if channel.is_open() => match channel.write_line(line) {
                Ok(()) => true,
                Err(e) => {
                    warn!(device = %self.device.label, "device write failed: {e}");
                    false
                }
            },
            _ => {
                debug!("device not connected, dropping outgoing line");
                false
            }
        }
    }

    fn write_client(&mut self, line: &str) {
        let Some(client) = self.client.as_mut() else {
            debug!("no client connected, dropping outgoing line");
            return;
        };
        if let Err(e) = client.write_line(line) {
            warn!("client write failed: {e}");
            self.drop_client();
        }
    }

    fn shutdown(&mut self) {
        self.drop_client();
        if let Some(mut device) = self.device.channel.take() {
            device.close();
        }
        info!("relay stopped");
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a relay running on a background thread.
///
/// Dropping the handle stops the relay and waits for the thread.
pub struct RelayHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<RelayResult<()>>>,
    local_addr: SocketAddr,
}

impl RelayHandle {
    /// Address the control-client listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the loop thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Clone of the running flag, e.g. for a signal handler.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    /// Ask the loop to stop and wait for it.
    pub fn stop(mut self) -> RelayResult<()> {
        self.running.store(false, Ordering::SeqCst);
        self.join()
    }

    /// Wait for the loop to end on its own (flag cleared elsewhere or device
    /// lost).
    pub fn wait(mut self) -> RelayResult<()> {
        self.join()
    }

    fn join(&mut self) -> RelayResult<()> {
        match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| RelayError::Panicked)?,
            None => Ok(()),
        }
    }
}

impl Drop for RelayHandle {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Err(e) = self.join() {
            warn!("relay ended with error: {e}");
        }
    }
}
