//! Error types for the line protocol.

use thiserror::Error;

/// Errors that can occur when decoding or classifying protocol lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line had no content to split into segments.
    #[error("empty line")]
    EmptyLine,

    /// A message was recognized as a kind but lacks one of its required keys.
    #[error("{kind} message is missing required field `{field}`")]
    MissingField {
        /// Kind the message was classified as.
        kind: &'static str,
        /// The absent key.
        field: &'static str,
    },

    /// A field carried a value outside its vocabulary.
    #[error("unrecognized {field} value: {value:?}")]
    UnknownValue {
        /// Key whose value was not recognized.
        field: &'static str,
        /// The offending value.
        value: String,
    },

    /// An unterminated line grew past the configured limit.
    #[error("line too long: max {max} bytes, got {actual}")]
    LineTooLong {
        /// Maximum line length.
        max: usize,
        /// Length that was buffered when the limit was hit.
        actual: usize,
    },
}

/// Result type alias for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
