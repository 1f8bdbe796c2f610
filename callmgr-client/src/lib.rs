//! # callmgr-client
//!
//! Async client engine for the Asterisk Manager Interface.
//!
//! This crate provides:
//! - Plain TCP or TLS transport with banner verification
//! - Concurrent actions correlated to their responses by ActionID
//! - Ordered event, error and fatal streams fed by a background dispatcher
//! - Session lifecycle: login, close, reconnect with login replay
//! - Configuration from code, YAML files and environment variables
//!
//! ```no_run
//! use callmgr_client::{Session, SessionConfig};
//! use callmgr_protocol::Action;
//!
//! # async fn run() -> Result<(), callmgr_client::ClientError> {
//! let config = SessionConfig::new("127.0.0.1:5038").with_credentials("admin", "secret");
//! let (session, mut streams) = Session::connect(config).await?;
//!
//! let status = session.call(Action::new("CoreStatus")).await?;
//! println!("{:?}", status.get("CoreCurrentCalls"));
//!
//! while let Some(event) = streams.events.recv().await {
//!     println!("{}", event.name);
//! }
//! session.close().await
//! # }
//! ```

pub mod config;
pub mod correlation;
pub(crate) mod dispatch;
pub mod error;
pub(crate) mod poll;
pub mod session;
pub mod stream;
pub mod tls;
pub mod transport;

pub use config::{Config, ConfigError, Credentials, SessionConfig};
pub use correlation::{ActionIds, CorrelationTable};
pub use error::ClientError;
pub use poll::MAX_CONSECUTIVE_IO_ERRORS;
pub use session::{PendingResponse, Session, SessionStreams};
pub use stream::ClientStream;
pub use tls::TlsClientConfig;
pub use transport::{ActionWriter, CloseState, FrameReader, Transport};
