//! Event decoding errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("cannot decode {event} event: {source}")]
    Decode {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}
