//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors that can occur during framing or message decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed header line: {0:?}")]
    MalformedLine(String),

    #[error("field {0:?} contains a line break")]
    InvalidField(String),

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("invalid UTF-8 in header block")]
    InvalidUtf8,

    #[error("frame is neither a response nor an event")]
    UnrecognizedFrame,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unexpected banner: {0:?}")]
    UnexpectedBanner(String),
}
