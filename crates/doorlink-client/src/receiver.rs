//! Receiver thread: reads relay pushes and updates the cached door state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use doorlink_channel::LineChannel;
use doorlink_protocol::{DoorEvent, DoorState, DoorStatus, Message, MessageKind};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

// ============================================================================
// Events
// ============================================================================

/// Notification delivered to the client's inbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// The lock controller confirmed a transition.
    StateChanged(DoorStatus),
    /// The relay answered a sync request.
    Synced(DoorStatus),
    /// The relay acknowledged a command.
    Acked { status: String },
    /// The connection to the relay ended.
    Disconnected,
}

/// State shared between the caller and the receiver thread.
#[derive(Debug, Default)]
pub(crate) struct Shared {
    pub(crate) status: Mutex<DoorStatus>,
    pub(crate) connected: AtomicBool,
}

// ============================================================================
// Receive loop
// ============================================================================

/// Read until the connection drops or `stop` is set.
pub(crate) fn receive_loop(
    mut channel: impl LineChannel,
    shared: Arc<Shared>,
    events: Sender<ClientEvent>,
    stop: Arc<AtomicBool>,
    poll: Duration,
) {
    while !stop.load(Ordering::SeqCst) {
        match channel.read_line(poll) {
            Ok(Some(line)) => {
                if let Some(event) = handle_line(&line, &shared) {
                    // The client may have been dropped; nothing left to notify.
                    let _ = events.send(event);
                }
            }
            Ok(None) => {}
            Err(e) => {
                info!("connection to relay ended: {e}");
                break;
            }
        }
    }

    shared.connected.store(false, Ordering::SeqCst);
    let _ = events.send(ClientEvent::Disconnected);
}

/// Apply one line from the relay. Returns the notification to deliver, if
/// the line meant anything.
pub(crate) fn handle_line(line: &str, shared: &Shared) -> Option<ClientEvent> {
    let kind = match Message::decode(line).and_then(|m| MessageKind::classify(&m)) {
        Ok(kind) => kind,
        Err(e) => {
            warn!(line = %line, "discarding line from relay: {e}");
            return None;
        }
    };

    match kind {
        MessageKind::DeviceEvent {
            source,
            event,
            timestamp,
        } => {
            let Ok(event) = event.parse::<DoorEvent>() else {
                warn!(event = %event, "ignoring unrecognized door event");
                return None;
            };
            let status = DoorStatus::new(event.resulting_state(), source, timestamp);
            *shared.status.lock() = status.clone();
            info!(state = %status.state, source = %status.last_source, "door state changed");
            Some(ClientEvent::StateChanged(status))
        }
        MessageKind::SyncResponse {
            door_state,
            last_source,
            last_timestamp,
        } => {
            let Ok(state) = door_state.parse::<DoorState>() else {
                warn!(door_state = %door_state, "ignoring sync response with unknown state");
                return None;
            };
            let status = DoorStatus::new(state, last_source, last_timestamp);
            *shared.status.lock() = status.clone();
            debug!(state = %status.state, "synced with relay");
            Some(ClientEvent::Synced(status))
        }
        MessageKind::Ack { status } => Some(ClientEvent::Acked { status }),
        other => {
            debug!(kind = other.name(), "ignoring message from relay");
            None
        }
    }
}
