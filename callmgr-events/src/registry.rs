//! Name-to-decoder registry.
//!
//! Built explicitly at startup; nothing registers itself.

use crate::catalog::{
    ExtensionStatus, FullyBooted, Join, Leave, Masquerade, PeerEntry, Rename, Shape, Shutdown,
    TypedEvent, UserEvent,
};
use crate::error::EventError;
use callmgr_protocol::Event;
use std::collections::HashMap;
use std::fmt;
use tracing::warn;

type DecodeFn = Box<dyn Fn(&Event) -> Result<TypedEvent, EventError> + Send + Sync>;

/// Maps event names to decoders.
#[derive(Default)]
pub struct EventRegistry {
    decoders: HashMap<String, DecodeFn>,
}

impl EventRegistry {
    /// Creates an empty registry; every event decodes to `Unknown`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding every shape in the catalog.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry
            .register_shape::<FullyBooted>()
            .register_shape::<Join>()
            .register_shape::<Leave>()
            .register_shape::<Masquerade>()
            .register_shape::<PeerEntry>()
            .register_shape::<Rename>()
            .register_shape::<Shutdown>()
            .register_shape::<UserEvent>()
            .register_shape::<ExtensionStatus>();
        registry
    }

    /// Registers `decoder` for events named `name`, replacing any previous one.
    pub fn register<F>(&mut self, name: impl Into<String>, decoder: F) -> &mut Self
    where
        F: Fn(&Event) -> Result<TypedEvent, EventError> + Send + Sync + 'static,
    {
        self.decoders.insert(name.into(), Box::new(decoder));
        self
    }

    /// Registers a catalog shape under its own name.
    pub fn register_shape<T: Shape>(&mut self) -> &mut Self {
        self.register_shape_as::<T>(T::NAME)
    }

    /// Registers a catalog shape under another event name.
    pub fn register_shape_as<T: Shape>(&mut self, name: impl Into<String>) -> &mut Self {
        self.register(name, |event| T::decode(event).map(T::into_typed))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Decodes `event` into its registered shape.
    ///
    /// Unregistered names, and events the registered decoder rejects, come
    /// back as [`TypedEvent::Unknown`].
    pub fn decode(&self, event: &Event) -> TypedEvent {
        let Some(decoder) = self.decoders.get(&event.name) else {
            return TypedEvent::Unknown(event.clone());
        };
        match decoder(event) {
            Ok(typed) => typed,
            Err(e) => {
                warn!("Passing {} through untyped: {}", event.name, e);
                TypedEvent::Unknown(event.clone())
            }
        }
    }
}

impl fmt::Debug for EventRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.decoders.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("EventRegistry").field("events", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, params: &[(&str, &str)]) -> Event {
        let mut event = Event::new(name);
        for (k, v) in params {
            event.params.insert(k.to_string(), v.to_string());
        }
        event
    }

    #[test]
    fn test_builtin_covers_catalog() {
        let registry = EventRegistry::builtin();
        assert_eq!(registry.len(), 9);
        for name in [
            "FullyBooted",
            "Join",
            "Leave",
            "Masquerade",
            "PeerEntry",
            "Rename",
            "Shutdown",
            "UserEvent",
            "ExtensionStatus",
        ] {
            assert!(registry.contains(name), "{} not registered", name);
        }
    }

    #[test]
    fn test_decode_registered() {
        let registry = EventRegistry::builtin();
        let mut raw = event("FullyBooted", &[("Status", "Fully Booted")]);
        raw.privilege = vec!["system".into(), "all".into()];

        match registry.decode(&raw) {
            TypedEvent::FullyBooted(booted) => {
                assert_eq!(booted.status, "Fully Booted");
                assert_eq!(booted.privilege, vec!["system", "all"]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_unregistered_passes_through() {
        let registry = EventRegistry::builtin();
        let raw = event("Newexten", &[("Channel", "SIP/100-1"), ("Application", "Dial")]);

        assert_eq!(registry.decode(&raw), TypedEvent::Unknown(raw.clone()));
        assert!(EventRegistry::new().decode(&raw).is_unknown());
    }

    #[test]
    fn test_alias_shape() {
        let mut registry = EventRegistry::builtin();
        registry.register_shape_as::<Join>("QueueCallerJoin");

        let raw = event("QueueCallerJoin", &[("Queue", "support"), ("Position", "2")]);
        match registry.decode(&raw) {
            TypedEvent::Join(join) => {
                assert_eq!(join.queue, "support");
                assert_eq!(join.position, "2");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_failing_decoder_falls_back() {
        let mut registry = EventRegistry::new();
        registry.register("VarSet", |event| {
            let source = serde_json::from_str::<u32>("not a number").unwrap_err();
            Err(EventError::Decode {
                event: event.name.clone(),
                source,
            })
        });

        let raw = event("VarSet", &[("Variable", "X"), ("Value", "1")]);
        assert_eq!(registry.decode(&raw), TypedEvent::Unknown(raw.clone()));
    }

    #[test]
    fn test_debug_lists_names() {
        let mut registry = EventRegistry::new();
        registry.register_shape::<Shutdown>().register_shape::<Rename>();
        assert_eq!(
            format!("{:?}", registry),
            r#"EventRegistry { events: ["Rename", "Shutdown"] }"#
        );
    }
}
