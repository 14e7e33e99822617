//! Routing rules between the lock controller and the control client.
//!
//! [`RelayCore`] never touches a socket or a serial port. Each incoming line
//! produces a [`Dispatch`] describing what to write where; the service loop
//! carries it out. This keeps every routing decision testable without I/O.
//!
//! From the device:
//! - a device event whose `source` is the configured device id is recorded,
//!   acknowledged, and forwarded verbatim to the client if one is connected
//! - anything else is ignored
//!
//! From the client:
//! - `{"type":"SYNC"}` is answered with the current state
//! - a `lock`/`unlock` command is forwarded verbatim to the device and
//!   acknowledged once the write has been attempted
//! - anything else is ignored
//!
//! A command never changes the state by itself. Only the device's own event
//! confirming the transition does.

use doorlink_protocol::{
    CommandKind, DoorEvent, Message, MessageKind, STATUS_ERROR, STATUS_OK,
};
use doorlink_store::{DoorStatus, HistoryEntry, StateStore};
use tracing::{debug, error, info, warn};

use crate::counters::{metric_defs, PEER_LABEL};

// ============================================================================
// Dispatch
// ============================================================================

/// One side of the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Peer {
    /// The lock controller on the serial link.
    Device,
    /// The control client on TCP.
    Client,
}

impl Peer {
    pub fn as_str(&self) -> &'static str {
        match self {
            Peer::Device => "device",
            Peer::Client => "client",
        }
    }
}

/// A single write the service loop must perform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outgoing {
    /// Write `line` to `to`.
    Send { to: Peer, line: String },
    /// Write `line` to the device, then acknowledge the client with `ok` if
    /// the write went through or `error` if it did not.
    ForwardCommand { line: String },
}

/// Writes produced by handling one incoming line, in order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dispatch {
    actions: Vec<Outgoing>,
}

impl Dispatch {
    /// Nothing to send.
    pub fn none() -> Self {
        Dispatch::default()
    }

    fn send(mut self, to: Peer, line: impl Into<String>) -> Self {
        self.actions.push(Outgoing::Send {
            to,
            line: line.into(),
        });
        self
    }

    fn forward_command(mut self, line: impl Into<String>) -> Self {
        self.actions.push(Outgoing::ForwardCommand { line: line.into() });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn actions(&self) -> &[Outgoing] {
        &self.actions
    }

    /// Lines of plain sends addressed to `peer`.
    pub fn lines_to(&self, peer: Peer) -> Vec<&str> {
        self.actions
            .iter()
            .filter_map(|action| match action {
                Outgoing::Send { to, line } if *to == peer => Some(line.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for Dispatch {
    type Item = Outgoing;
    type IntoIter = std::vec::IntoIter<Outgoing>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.into_iter()
    }
}

// ============================================================================
// Core
// ============================================================================

/// The relay's state machine: owns the authoritative door state.
pub struct RelayCore {
    device_id: String,
    store: StateStore,
}

impl RelayCore {
    pub fn new(device_id: impl Into<String>, store: StateStore) -> Self {
        RelayCore {
            device_id: device_id.into(),
            store,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current committed door state.
    pub fn status(&self) -> &DoorStatus {
        self.store.current()
    }

    /// Ack line sent to the client after a command forward.
    pub fn command_ack(delivered: bool) -> String {
        let status = if delivered { STATUS_OK } else { STATUS_ERROR };
        Message::ack(status).encode()
    }

    /// Handle one line read from the device.
    pub fn on_device_line(&mut self, line: &str, client_connected: bool) -> Dispatch {
        let Some(kind) = classify(Peer::Device, line) else {
            return Dispatch::none();
        };

        match kind {
            MessageKind::DeviceEvent {
                source,
                event,
                timestamp,
            } => {
                if source != self.device_id {
                    debug!(source = %source, "ignoring event from unexpected source");
                    return Dispatch::none();
                }
                self.on_device_event(line, source, &event, timestamp, client_connected)
            }
            other => {
                debug!(kind = other.name(), "ignoring message from device");
                Dispatch::none()
            }
        }
    }

    fn on_device_event(
        &mut self,
        line: &str,
        source: String,
        event: &str,
        timestamp: String,
        client_connected: bool,
    ) -> Dispatch {
        let event: DoorEvent = match event.parse() {
            Ok(event) => event,
            Err(_) => {
                warn!(event = %event, "unrecognized device event, state unchanged");
                return Dispatch::none();
            }
        };

        let entry = HistoryEntry::new(event.resulting_state(), source, timestamp);
        let recorded = match self.store.record(entry) {
            Ok(recorded) => recorded,
            Err(e) => {
                metrics::counter!(metric_defs::HISTORY_FAILURES.name).increment(1);
                error!(event = event.as_str(), "dropping device event, history not written: {e}");
                return Dispatch::none();
            }
        };
        metrics::counter!(metric_defs::HISTORY_APPENDS.name).increment(1);
        if recorded.mirror_failures > 0 {
            metrics::counter!(metric_defs::MIRROR_FAILURES.name)
                .increment(recorded.mirror_failures as u64);
        }
        let status = &recorded.status;
        info!(
            state = %status.state,
            source = %status.last_source,
            timestamp = %status.last_timestamp,
            "door state recorded"
        );

        let mut dispatch = Dispatch::none().send(Peer::Device, Message::ack(STATUS_OK).encode());
        if client_connected {
            metrics::counter!(metric_defs::FORWARDS.name, PEER_LABEL => Peer::Client.as_str())
                .increment(1);
            dispatch = dispatch.send(Peer::Client, line);
        }
        dispatch
    }

    /// Handle one line read from the control client.
    pub fn on_client_line(&self, line: &str) -> Dispatch {
        let Some(kind) = classify(Peer::Client, line) else {
            return Dispatch::none();
        };

        match kind {
            MessageKind::SyncRequest => {
                let status = self.store.current();
                debug!(state = %status.state, "answering sync request");
                Dispatch::none().send(
                    Peer::Client,
                    Message::sync_response(status.state, &status.last_source, &status.last_timestamp)
                        .encode(),
                )
            }
            MessageKind::Command { command, source } => match command.parse::<CommandKind>() {
                Ok(command) => {
                    info!(command = command.as_str(), source = %source, "forwarding command to device");
                    metrics::counter!(metric_defs::FORWARDS.name, PEER_LABEL => Peer::Device.as_str())
                        .increment(1);
                    Dispatch::none().forward_command(line)
                }
                Err(_) => {
                    warn!(command = %command, "ignoring unknown command");
                    Dispatch::none()
                }
            },
            other => {
                debug!(kind = other.name(), "ignoring message from client");
                Dispatch::none()
            }
        }
    }
}

/// Decode and classify a line, logging and counting anything unusable.
fn classify(peer: Peer, line: &str) -> Option<MessageKind> {
    metrics::counter!(metric_defs::LINES_RECEIVED.name, PEER_LABEL => peer.as_str()).increment(1);

    let discard = |reason: &dyn std::fmt::Display| {
        metrics::counter!(metric_defs::LINES_DISCARDED.name, PEER_LABEL => peer.as_str())
            .increment(1);
        warn!(peer = peer.as_str(), line = %line, "discarding line: {reason}");
    };

    let message = match Message::decode(line) {
        Ok(message) => message,
        Err(e) => {
            discard(&e);
            return None;
        }
    };
    if message.is_empty() {
        discard(&"no key/value pairs");
        return None;
    }

    match MessageKind::classify(&message) {
        Ok(kind) => Some(kind),
        Err(e) => {
            discard(&e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use doorlink_protocol::DoorState;
    use doorlink_store::MemoryHistory;

    const UNLOCKED_EVENT: &str =
        r#"{"source":"stm32","event":"door_unlocked","timestamp":"2025-06-08T10:25:00Z"}"#;
    const LOCKED_EVENT: &str = r#"{"source":"stm32","event":"door_locked","timestamp":"T"}"#;
    const SYNC: &str = r#"{"type":"SYNC"}"#;
    const ACK_OK: &str = r#"{"type":"ack","status":"ok"}"#;

    fn core() -> (RelayCore, MemoryHistory) {
        let history = MemoryHistory::new();
        let store = StateStore::new().with_primary(history.clone());
        (RelayCore::new("stm32", store), history)
    }

    #[test]
    fn test_device_event_records_acks_and_forwards() {
        let (mut core, history) = core();

        let dispatch = core.on_device_line(UNLOCKED_EVENT, true);

        assert_eq!(dispatch.lines_to(Peer::Device), vec![ACK_OK]);
        assert_eq!(dispatch.lines_to(Peer::Client), vec![UNLOCKED_EVENT]);
        assert_eq!(core.status().state, DoorState::Unlocked);
        assert_eq!(
            history.entries(),
            vec![HistoryEntry::new(
                DoorState::Unlocked,
                "stm32",
                "2025-06-08T10:25:00Z"
            )]
        );
    }

    #[test]
    fn test_device_event_without_client_is_not_forwarded() {
        let (mut core, history) = core();

        let dispatch = core.on_device_line(LOCKED_EVENT, false);

        assert_eq!(dispatch.lines_to(Peer::Device), vec![ACK_OK]);
        assert!(dispatch.lines_to(Peer::Client).is_empty());
        assert_eq!(core.status().state, DoorState::Locked);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_door_locked_sets_latest_entry() {
        let (mut core, history) = core();
        core.on_device_line(UNLOCKED_EVENT, false);

        for ts in ["a", "b", "c"] {
            let line = format!(r#"{{"source":"stm32","event":"door_locked","timestamp":"{ts}"}}"#);
            core.on_device_line(&line, false);
            assert_eq!(core.status().state, DoorState::Locked);
            assert_eq!(
                history.entries().last(),
                Some(&HistoryEntry::new(DoorState::Locked, "stm32", ts))
            );
        }
    }

    #[test]
    fn test_unrecognized_event_changes_nothing() {
        let (mut core, history) = core();
        core.on_device_line(LOCKED_EVENT, false);

        let dispatch = core.on_device_line(
            r#"{"source":"stm32","event":"door_ajar","timestamp":"T2"}"#,
            true,
        );

        assert!(dispatch.is_empty());
        assert_eq!(core.status().state, DoorState::Locked);
        assert_eq!(core.status().last_timestamp, "T");
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_event_from_other_source_is_ignored() {
        let (mut core, history) = core();

        let dispatch = core.on_device_line(
            r#"{"source":"laptop","event":"door_locked","timestamp":"T"}"#,
            true,
        );

        assert!(dispatch.is_empty());
        assert_eq!(core.status().state, DoorState::Unknown);
        assert!(history.is_empty());
    }

    #[test]
    fn test_configurable_device_id() {
        let history = MemoryHistory::new();
        let mut core = RelayCore::new("door-1", StateStore::new().with_primary(history.clone()));

        assert!(core.on_device_line(LOCKED_EVENT, false).is_empty());
        let dispatch = core.on_device_line(
            r#"{"source":"door-1","event":"door_locked","timestamp":"T"}"#,
            false,
        );
        assert_eq!(dispatch.lines_to(Peer::Device), vec![ACK_OK]);
        assert_eq!(core.device_id(), "door-1");
    }

    #[test]
    fn test_non_event_from_device_is_ignored() {
        let (mut core, _) = core();
        assert!(core.on_device_line(SYNC, true).is_empty());
        assert!(core
            .on_device_line(r#"{"command":"lock","source":"stm32"}"#, true)
            .is_empty());
        assert!(core.on_device_line(ACK_OK, true).is_empty());
    }

    #[test]
    fn test_malformed_lines_are_discarded() {
        let (mut core, history) = core();

        for line in [
            r#""source""stm32""#,
            "garbage",
            "{}",
            r#"{"source":"stm32","event":"door_locked"}"#,
        ] {
            assert!(core.on_device_line(line, true).is_empty(), "{line}");
            assert!(core.on_client_line(line).is_empty(), "{line}");
        }
        assert!(history.is_empty());
        assert_eq!(core.status().state, DoorState::Unknown);
    }

    #[test]
    fn test_persistence_failure_skips_event() {
        let (mut core, history) = core();
        core.on_device_line(LOCKED_EVENT, false);

        history.set_failing(true);
        let dispatch = core.on_device_line(UNLOCKED_EVENT, true);

        assert!(dispatch.is_empty(), "no ack and no forward without history");
        assert_eq!(core.status().state, DoorState::Locked);

        history.set_failing(false);
        let dispatch = core.on_device_line(UNLOCKED_EVENT, true);
        assert_eq!(dispatch.lines_to(Peer::Device), vec![ACK_OK]);
        assert_eq!(core.status().state, DoorState::Unlocked);
    }

    #[test]
    fn test_sync_reflects_current_state() {
        let (mut core, _) = core();
        core.on_device_line(LOCKED_EVENT, false);

        let dispatch = core.on_client_line(SYNC);
        assert_eq!(
            dispatch.lines_to(Peer::Client),
            vec![r#"{"type":"sync_response","door_state":"locked","last_source":"stm32","last_timestamp":"T"}"#]
        );
    }

    #[test]
    fn test_sync_before_any_event_reports_unknown() {
        let (core, _) = core();
        let dispatch = core.on_client_line(SYNC);
        let line = dispatch.lines_to(Peer::Client)[0];
        let reply = Message::decode(line).unwrap();
        assert_eq!(reply.get("door_state"), Some("unknown"));
        assert_eq!(reply.get("last_source"), Some(""));
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (mut core, _) = core();
        core.on_device_line(UNLOCKED_EVENT, false);

        let first = core.on_client_line(SYNC);
        let second = core.on_client_line(SYNC);
        assert_eq!(first, second);
    }

    #[test]
    fn test_command_is_forwarded_verbatim_without_state_change() {
        let (mut core, history) = core();
        core.on_device_line(LOCKED_EVENT, false);

        let line = r#"{"command":"unlock","source":"laptop"}"#;
        let dispatch = core.on_client_line(line);

        assert_eq!(
            dispatch.actions(),
            &[Outgoing::ForwardCommand {
                line: line.to_string()
            }]
        );
        assert_eq!(core.status().state, DoorState::Locked);
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_unknown_command_is_ignored() {
        let (core, _) = core();
        assert!(core
            .on_client_line(r#"{"command":"open_sesame","source":"laptop"}"#)
            .is_empty());
        assert!(core.on_client_line(r#"{"command":"lock"}"#).is_empty());
    }

    #[test]
    fn test_device_event_from_client_is_ignored() {
        let (core, _) = core();
        assert!(core.on_client_line(LOCKED_EVENT).is_empty());
        assert_eq!(core.status().state, DoorState::Unknown);
    }

    #[test]
    fn test_command_ack_lines() {
        assert_eq!(RelayCore::command_ack(true), ACK_OK);
        assert_eq!(
            RelayCore::command_ack(false),
            r#"{"type":"ack","status":"error"}"#
        );
    }
}
