//! Flat string-keyed messages and their wire form.
//!
//! The decoder is intentionally lenient: it strips one level of braces,
//! splits on commas, splits each segment on its first colon and trims
//! whitespace plus one layer of quotes from both sides. Segments without a
//! colon are skipped, so garbage decodes to an empty (or partial) message
//! rather than an error. Callers decide what a message means with
//! [`MessageKind::classify`](crate::MessageKind::classify).

use std::fmt;

use crate::error::{ProtocolError, ProtocolResult};
use crate::kinds::*;

/// An ordered mapping of string keys to string values.
///
/// Insertion order is kept so encoded lines read naturally, but it is not
/// part of the protocol: equality ignores order.
#[derive(Debug, Clone, Default, Eq)]
pub struct Message {
    fields: Vec<(String, String)>,
}

impl Message {
    /// Create an empty message.
    pub fn new() -> Self {
        Message { fields: Vec::new() }
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a field, replacing the value in place if the key already exists.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Look up a field value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Check whether a key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the message has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over `(key, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Serialize to a single line (without the terminator).
    pub fn encode(&self) -> String {
        let mut line = String::with_capacity(2 + self.fields.len() * 24);
        line.push('{');
        for (i, (key, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                line.push(',');
            }
            line.push('"');
            line.push_str(key);
            line.push_str("\":\"");
            line.push_str(value);
            line.push('"');
        }
        line.push('}');
        line
    }

    /// Parse a line into a message.
    ///
    /// Fails only for a line with no content at all. A line with no valid
    /// `key:value` segment yields an empty message.
    pub fn decode(line: &str) -> ProtocolResult<Message> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::EmptyLine);
        }

        let body = trimmed.strip_prefix('{').unwrap_or(trimmed);
        let body = body.strip_suffix('}').unwrap_or(body);

        let mut message = Message::new();
        for segment in body.split(',') {
            let Some((key, value)) = segment.split_once(':') else {
                if !segment.trim().is_empty() {
                    log::trace!("skipping segment without colon: {segment:?}");
                }
                continue;
            };

            let key = unquote(key);
            if key.is_empty() {
                log::trace!("skipping segment with empty key: {segment:?}");
                continue;
            }
            message.insert(key, unquote(value));
        }

        Ok(message)
    }

    /// `{"type":"ack","status":<status>}`
    pub fn ack(status: &str) -> Self {
        Message::new().with(KEY_TYPE, TYPE_ACK).with(KEY_STATUS, status)
    }

    /// `{"type":"SYNC"}`
    pub fn sync_request() -> Self {
        Message::new().with(KEY_TYPE, TYPE_SYNC)
    }

    /// A sync response carrying the relay's current view of the door.
    pub fn sync_response(state: DoorState, last_source: &str, last_timestamp: &str) -> Self {
        Message::new()
            .with(KEY_TYPE, TYPE_SYNC_RESPONSE)
            .with(KEY_DOOR_STATE, state.as_str())
            .with(KEY_LAST_SOURCE, last_source)
            .with(KEY_LAST_TIMESTAMP, last_timestamp)
    }

    /// A lock/unlock request from a control client.
    pub fn command(command: CommandKind, source: &str) -> Self {
        Message::new()
            .with(KEY_COMMAND, command.as_str())
            .with(KEY_SOURCE, source)
    }

    /// A transition report as sent by the lock controller.
    pub fn device_event(source: &str, event: &str, timestamp: &str) -> Self {
        Message::new()
            .with(KEY_SOURCE, source)
            .with(KEY_EVENT, event)
            .with(KEY_TIMESTAMP, timestamp)
    }
}

impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Message {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut message = Message::new();
        for (k, v) in iter {
            message.insert(k, v);
        }
        message
    }
}

/// Trim surrounding whitespace, then one layer of quotes on each side.
/// Whitespace inside the quotes is kept.
fn unquote(raw: &str) -> &str {
    let s = raw.trim();
    let s = s.strip_prefix('"').unwrap_or(s);
    s.strip_suffix('"').unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_simple_object() {
        let msg = Message::decode(r#"{"key1":"value1","key2":"value2"}"#).unwrap();
        assert_eq!(msg.len(), 2);
        assert_eq!(msg.get("key1"), Some("value1"));
        assert_eq!(msg.get("key2"), Some("value2"));
    }

    #[test]
    fn test_decode_with_whitespace() {
        let msg = Message::decode(
            r#"{ "source" : "stm32", "event" : "door_locked" , "timestamp" : "2025-06-08T10:25:00Z" }"#,
        )
        .unwrap();
        assert_eq!(msg.get("source"), Some("stm32"));
        assert_eq!(msg.get("event"), Some("door_locked"));
        assert_eq!(msg.get("timestamp"), Some("2025-06-08T10:25:00Z"));
    }

    #[test]
    fn test_decode_splits_on_first_colon() {
        let msg = Message::decode(r#"{"timestamp":"10:25:00"}"#).unwrap();
        assert_eq!(msg.get("timestamp"), Some("10:25:00"));
    }

    #[test]
    fn test_decode_empty_object() {
        let msg = Message::decode("{}").unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_decode_empty_line_fails() {
        assert_eq!(Message::decode(""), Err(ProtocolError::EmptyLine));
        assert_eq!(Message::decode("  \t "), Err(ProtocolError::EmptyLine));
    }

    #[test]
    fn test_decode_missing_colon_is_empty() {
        let msg = Message::decode(r#""source""stm32""#).unwrap();
        assert!(msg.is_empty());
    }

    #[test]
    fn test_decode_keeps_valid_segments() {
        let msg = Message::decode(r#"{"source""stm32","event":"door_locked"}"#).unwrap();
        assert_eq!(msg.len(), 1);
        assert_eq!(msg.get("event"), Some("door_locked"));
    }

    #[test]
    fn test_decode_preserves_unknown_keys() {
        let msg = Message::decode(r#"{"type":"ack","status":"ok","battery":"87"}"#).unwrap();
        assert_eq!(msg.get("battery"), Some("87"));
    }

    #[test]
    fn test_decode_unquoted_and_unbraced() {
        let msg = Message::decode("type: SYNC").unwrap();
        assert_eq!(msg.get("type"), Some("SYNC"));
    }

    #[test]
    fn test_encode_keeps_insertion_order() {
        assert_eq!(Message::ack("ok").encode(), r#"{"type":"ack","status":"ok"}"#);
        assert_eq!(Message::new().encode(), "{}");
    }

    #[test]
    fn test_round_trip_is_order_independent() {
        let cases: Vec<Message> = vec![
            Message::new(),
            Message::new().with("type", "SYNC"),
            [
                ("door_state", "locked"),
                ("type", "sync_response"),
                ("last_source", "stm32"),
                ("last_timestamp", "2025-06-08T10:25:00Z"),
            ]
            .into_iter()
            .collect(),
            Message::new().with("at", "12:00:01").with("window", "10:00-18:00"),
            Message::new()
                .with("source", "stm32")
                .with("battery", "87")
                .with("x-firmware", "1.4.2"),
        ];

        for original in cases {
            let line = original.encode();
            let decoded = Message::decode(&line).unwrap();
            assert_eq!(decoded, original, "{line}");

            let reversed: Message = original.iter().collect::<Vec<_>>().into_iter().rev().collect();
            assert_eq!(decoded, reversed, "{line}");
        }
    }

    #[test]
    fn test_decode_keeps_whitespace_inside_quotes() {
        let msg = Message::decode(r#"{ "note" : " a " }"#).unwrap();
        assert_eq!(msg.get("note"), Some(" a "));
    }

    #[test]
    fn test_insert_replaces_existing() {
        let mut msg = Message::new().with("a", "1").with("b", "2");
        msg.insert("a", "3");
        assert_eq!(msg.encode(), r#"{"a":"3","b":"2"}"#);
    }

    #[test]
    fn test_duplicate_keys_last_wins() {
        let msg = Message::decode(r#"{"event":"door_locked","event":"door_unlocked"}"#).unwrap();
        assert_eq!(msg.len(), 1);
        assert_eq!(msg.get("event"), Some("door_unlocked"));
    }
}
