//! Client error types.

use callmgr_protocol::ProtocolError;
use std::io;
use thiserror::Error;

/// Client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("server is not an AMI endpoint (banner {0:?})")]
    NotAmi(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed")]
    ConnectionClosed,

    #[error("operation timed out")]
    Timeout,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("response for unknown action id {id:?}")]
    UnmatchedResponse { id: String },

    #[error("{queue} queue overflow ({limit} pending)")]
    QueueOverflow { queue: &'static str, limit: usize },

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("TLS handshake failed: {0}")]
    TlsHandshake(String),
}

impl ClientError {
    /// Returns whether the connection must be considered dead after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::UnexpectedEof
            ),
            ClientError::ConnectionClosed => true,
            ClientError::QueueOverflow { .. } => true,
            _ => false,
        }
    }

    /// Returns whether retrying (usually after a reconnect) may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Io(_) => true,
            ClientError::Timeout => true,
            ClientError::ConnectionClosed => true,
            ClientError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<tokio::time::error::Elapsed> for ClientError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ClientError::Timeout
    }
}
