//! Message kinds and the door vocabulary.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, ProtocolResult};
use crate::message::Message;

pub const KEY_TYPE: &str = "type";
pub const KEY_STATUS: &str = "status";
pub const KEY_SOURCE: &str = "source";
pub const KEY_EVENT: &str = "event";
pub const KEY_TIMESTAMP: &str = "timestamp";
pub const KEY_COMMAND: &str = "command";
pub const KEY_DOOR_STATE: &str = "door_state";
pub const KEY_LAST_SOURCE: &str = "last_source";
pub const KEY_LAST_TIMESTAMP: &str = "last_timestamp";

pub const TYPE_SYNC: &str = "SYNC";
pub const TYPE_SYNC_RESPONSE: &str = "sync_response";
pub const TYPE_ACK: &str = "ack";

pub const STATUS_OK: &str = "ok";
pub const STATUS_ERROR: &str = "error";

/// Physical state of the door lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DoorState {
    Locked,
    Unlocked,
    #[default]
    Unknown,
}

impl DoorState {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorState::Locked => "locked",
            DoorState::Unlocked => "unlocked",
            DoorState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DoorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DoorState {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "locked" => Ok(DoorState::Locked),
            "unlocked" => Ok(DoorState::Unlocked),
            "unknown" => Ok(DoorState::Unknown),
            other => Err(ProtocolError::UnknownValue {
                field: KEY_DOOR_STATE,
                value: other.to_string(),
            }),
        }
    }
}

/// A door state together with who reported it and when.
///
/// This is what a sync response carries and what the relay and the client
/// each keep as their view of the door.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DoorStatus {
    pub state: DoorState,
    pub last_source: String,
    pub last_timestamp: String,
}

impl DoorStatus {
    pub fn new(
        state: DoorState,
        last_source: impl Into<String>,
        last_timestamp: impl Into<String>,
    ) -> Self {
        DoorStatus {
            state,
            last_source: last_source.into(),
            last_timestamp: last_timestamp.into(),
        }
    }
}

/// Transition reported by the lock controller in the `event` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorEvent {
    /// `door_locked`
    Locked,
    /// `door_unlocked`
    Unlocked,
}

impl DoorEvent {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            DoorEvent::Locked => "door_locked",
            DoorEvent::Unlocked => "door_unlocked",
        }
    }

    /// The door state this event leaves the lock in.
    pub fn resulting_state(&self) -> DoorState {
        match self {
            DoorEvent::Locked => DoorState::Locked,
            DoorEvent::Unlocked => DoorState::Unlocked,
        }
    }
}

impl FromStr for DoorEvent {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "door_locked" => Ok(DoorEvent::Locked),
            "door_unlocked" => Ok(DoorEvent::Unlocked),
            other => Err(ProtocolError::UnknownValue {
                field: KEY_EVENT,
                value: other.to_string(),
            }),
        }
    }
}

/// Request carried in the `command` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Lock,
    Unlock,
}

impl CommandKind {
    /// Wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Lock => "lock",
            CommandKind::Unlock => "unlock",
        }
    }
}

impl FromStr for CommandKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        match s {
            "lock" => Ok(CommandKind::Lock),
            "unlock" => Ok(CommandKind::Unlock),
            other => Err(ProtocolError::UnknownValue {
                field: KEY_COMMAND,
                value: other.to_string(),
            }),
        }
    }
}

/// A message classified by which keys it carries.
///
/// Field values are kept verbatim; `event`, `command` and `door_state` are
/// not validated here so that receivers can log what they did not understand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageKind {
    /// A peer reports a state transition.
    DeviceEvent {
        source: String,
        event: String,
        timestamp: String,
    },
    /// A control client requests lock/unlock.
    Command { command: String, source: String },
    /// A control client asks for the current state.
    SyncRequest,
    /// Reply to a sync request.
    SyncResponse {
        door_state: String,
        last_source: String,
        last_timestamp: String,
    },
    /// Acknowledgement of a command or event.
    Ack { status: String },
    /// Anything that fits none of the above.
    Other,
}

impl MessageKind {
    /// Classify a decoded message.
    ///
    /// `type` takes precedence, then `event`, then `command`. A message whose
    /// discriminating key is present but which lacks another required key is
    /// reported as [`ProtocolError::MissingField`].
    pub fn classify(msg: &Message) -> ProtocolResult<MessageKind> {
        match msg.get(KEY_TYPE) {
            Some(TYPE_SYNC) => return Ok(MessageKind::SyncRequest),
            Some(TYPE_SYNC_RESPONSE) => {
                return Ok(MessageKind::SyncResponse {
                    door_state: require(msg, "sync_response", KEY_DOOR_STATE)?,
                    last_source: require(msg, "sync_response", KEY_LAST_SOURCE)?,
                    last_timestamp: require(msg, "sync_response", KEY_LAST_TIMESTAMP)?,
                });
            }
            Some(TYPE_ACK) => {
                return Ok(MessageKind::Ack {
                    status: require(msg, "ack", KEY_STATUS)?,
                });
            }
            _ => {}
        }

        if msg.contains_key(KEY_EVENT) {
            return Ok(MessageKind::DeviceEvent {
                source: require(msg, "device event", KEY_SOURCE)?,
                event: require(msg, "device event", KEY_EVENT)?,
                timestamp: require(msg, "device event", KEY_TIMESTAMP)?,
            });
        }

        if msg.contains_key(KEY_COMMAND) {
            return Ok(MessageKind::Command {
                command: require(msg, "command", KEY_COMMAND)?,
                source: require(msg, "command", KEY_SOURCE)?,
            });
        }

        Ok(MessageKind::Other)
    }

    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            MessageKind::DeviceEvent { .. } => "device event",
            MessageKind::Command { .. } => "command",
            MessageKind::SyncRequest => "sync request",
            MessageKind::SyncResponse { .. } => "sync response",
            MessageKind::Ack { .. } => "ack",
            MessageKind::Other => "other",
        }
    }
}

fn require(msg: &Message, kind: &'static str, field: &'static str) -> ProtocolResult<String> {
    msg.get(field)
        .map(str::to_string)
        .ok_or(ProtocolError::MissingField { kind, field })
}
