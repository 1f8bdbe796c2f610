//! # callmgr-protocol
//!
//! Wire protocol implementation for the Asterisk Manager Interface (AMI).
//!
//! This crate provides:
//! - Header-block framing (`Key: Value` lines terminated by a blank line)
//! - Action encoding with correlation identifiers
//! - Response and event decoding from raw frames
//! - Banner verification and protocol constants

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{check_banner, Decoder, Encoder};
pub use error::ProtocolError;
pub use frame::Frame;
pub use message::{Action, Event, FrameKind, Params, Response};

/// Substring every AMI greeting line carries.
pub const BANNER: &str = "Asterisk Call Manager";

/// Default AMI port.
pub const DEFAULT_PORT: u16 = 5038;

/// Maximum size of a single header block (1 MiB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Header naming the action on an outgoing block.
pub const FIELD_ACTION: &str = "Action";

/// Correlation identifier header, injected into every action.
pub const FIELD_ACTION_ID: &str = "ActionID";

/// Header marking a block as a response; its value is the status.
pub const FIELD_RESPONSE: &str = "Response";

/// Header marking a block as an event; its value is the event name.
pub const FIELD_EVENT: &str = "Event";

/// Comma-separated privilege tags carried by events.
pub const FIELD_PRIVILEGE: &str = "Privilege";

/// Human-readable message carried by responses.
pub const FIELD_MESSAGE: &str = "Message";

/// Response status signaling failure.
pub const STATUS_ERROR: &str = "Error";
