//! Door Link Line Protocol
//!
//! This crate provides the message types and codecs shared by the door relay,
//! the lock controller firmware and remote control clients. Every endpoint
//! speaks the same minimal line protocol over either a serial link or a TCP
//! socket.
//!
//! # Protocol Overview
//!
//! Each message is a single UTF-8 line terminated by `\n` (a preceding `\r`
//! is tolerated). A line is a brace-wrapped, comma-separated list of
//! `"key":"value"` pairs:
//!
//! ```text
//! {"source":"stm32","event":"door_locked","timestamp":"2025-06-08T10:25:00Z"}
//! ```
//!
//! All values are strings. There is no nesting and no escaping, so values
//! must not contain `{`, `}`, `,`, `:` or `"` (timestamps are the one
//! tolerated exception because a pair is split on its *first* colon).
//!
//! # Message Kinds
//!
//! The kind of a message is decided by which keys are present:
//!
//! - **DeviceEvent** (`source`, `event`, `timestamp`): the controller reports a transition
//! - **Command** (`command`, `source`): a client asks for `lock` or `unlock`
//! - **SyncRequest** (`type = SYNC`): a client asks for the current state
//! - **SyncResponse** (`type = sync_response`, `door_state`, `last_source`, `last_timestamp`)
//! - **Ack** (`type = ack`, `status`)
//!
//! # Example
//!
//! ```rust
//! use doorlink_protocol::{Message, MessageKind};
//!
//! let msg = Message::decode(r#"{"type":"SYNC"}"#).unwrap();
//! assert_eq!(MessageKind::classify(&msg).unwrap(), MessageKind::SyncRequest);
//!
//! let ack = Message::ack("ok").encode();
//! assert_eq!(ack, r#"{"type":"ack","status":"ok"}"#);
//! ```

mod codec;
mod error;
mod kinds;
mod message;

pub use codec::*;
pub use error::*;
pub use kinds::*;
pub use message::*;
