//! # callmgr-events
//!
//! Typed views over AMI events.
//!
//! This crate provides:
//! - Typed shapes for common manager events, keyed by their wire field names
//! - An explicit [`EventRegistry`] mapping event names to decoders
//! - A passthrough fallback for events nobody registered

pub mod catalog;
pub mod error;
pub mod registry;

pub use catalog::{
    ExtensionStatus, FullyBooted, Join, Leave, Masquerade, PeerEntry, Rename, Shape, Shutdown,
    TypedEvent, UserEvent,
};
pub use error::EventError;
pub use registry::EventRegistry;
