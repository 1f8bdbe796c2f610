//! Typed event shapes.
//!
//! Each shape names the wire key of every field it consumes; keys are matched
//! case-sensitively, as sent. Missing keys decode to empty strings and extra
//! keys are ignored.

use crate::error::EventError;
use callmgr_protocol::Event;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A typed view of one event name.
pub trait Shape: DeserializeOwned + Send + Sync + 'static {
    /// Event name the shape is registered under.
    const NAME: &'static str;

    fn set_privilege(&mut self, privilege: Vec<String>);

    fn into_typed(self) -> TypedEvent;

    /// Maps the event's parameters onto the shape.
    fn decode(event: &Event) -> Result<Self, EventError> {
        let decode_err = |source| EventError::Decode {
            event: event.name.clone(),
            source,
        };
        let value = serde_json::to_value(&event.params).map_err(decode_err)?;
        let mut shape: Self = serde_json::from_value(value).map_err(decode_err)?;
        shape.set_privilege(event.privilege.clone());
        Ok(shape)
    }
}

macro_rules! shape {
    ($ty:ident) => {
        impl Shape for $ty {
            const NAME: &'static str = stringify!($ty);

            fn set_privilege(&mut self, privilege: Vec<String>) {
                self.privilege = privilege;
            }

            fn into_typed(self) -> TypedEvent {
                TypedEvent::$ty(self)
            }
        }
    };
}

/// Raised when the switch has finished booting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FullyBooted {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Status")]
    pub status: String,
}

/// Raised when a channel joins a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Join {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Queue")]
    pub queue: String,
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "Count")]
    pub count: String,
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "CallerIDNum")]
    pub caller_id_num: String,
    #[serde(rename = "CallerIDName")]
    pub caller_id_name: String,
    #[serde(rename = "ConnectedLineNum")]
    pub connected_line_num: String,
    #[serde(rename = "ConnectedLineName")]
    pub connected_line_name: String,
    #[serde(rename = "Uniqueid")]
    pub unique_id: String,
}

/// Raised when a channel leaves a queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Leave {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Queue")]
    pub queue: String,
    #[serde(rename = "Count")]
    pub count: String,
    #[serde(rename = "Position")]
    pub position: String,
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "Uniqueid")]
    pub unique_id: String,
}

/// Raised when one channel takes over another's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Masquerade {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Clone")]
    pub clone: String,
    #[serde(rename = "CloneState")]
    pub clone_state: String,
    #[serde(rename = "Original")]
    pub original: String,
    #[serde(rename = "OriginalState")]
    pub original_state: String,
}

/// One row of a peer listing.
///
/// Keys follow the mixed casing the switch sends; the all-lowercase-tail
/// spellings are accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerEntry {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Channeltype", alias = "ChannelType")]
    pub channel_type: String,
    #[serde(rename = "ObjectName", alias = "Objectname")]
    pub object_name: String,
    #[serde(rename = "ChanObjectType", alias = "Chanobjecttype")]
    pub channel_object_type: String,
    #[serde(rename = "IPaddress", alias = "Ipaddress")]
    pub ip_address: String,
    #[serde(rename = "IPport", alias = "Ipport")]
    pub ip_port: String,
    #[serde(rename = "Dynamic")]
    pub dynamic: String,
    #[serde(rename = "Natsupport", alias = "NatSupport")]
    pub nat_support: String,
    #[serde(rename = "VideoSupport", alias = "Videosupport")]
    pub video_support: String,
    #[serde(rename = "TextSupport", alias = "Textsupport")]
    pub text_support: String,
    #[serde(rename = "ACL", alias = "Acl")]
    pub acl: String,
    #[serde(rename = "Status")]
    pub status: String,
    #[serde(rename = "RealtimeDevice", alias = "Realtimedevice")]
    pub realtime_device: String,
}

/// Raised when a channel is renamed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rename {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Channel")]
    pub channel: String,
    #[serde(rename = "Newname")]
    pub new_name: String,
    #[serde(rename = "Uniqueid")]
    pub unique_id: String,
}

/// Raised when the switch is shutting down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shutdown {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Shutdown")]
    pub shutdown: String,
    #[serde(rename = "Restart")]
    pub restart: String,
}

/// User-defined event raised from the dialplan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserEvent {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "UserEvent")]
    pub user_event: String,
    #[serde(rename = "Uniqueid")]
    pub unique_id: String,
}

/// Raised when a hinted extension changes state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtensionStatus {
    #[serde(skip_deserializing)]
    pub privilege: Vec<String>,
    #[serde(rename = "Exten")]
    pub exten: String,
    #[serde(rename = "Context")]
    pub context: String,
    #[serde(rename = "Hint")]
    pub hint: String,
    #[serde(rename = "Status")]
    pub status: String,
}

shape!(FullyBooted);
shape!(Join);
shape!(Leave);
shape!(Masquerade);
shape!(PeerEntry);
shape!(Rename);
shape!(Shutdown);
shape!(UserEvent);
shape!(ExtensionStatus);

/// Result of decoding an event through the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum TypedEvent {
    FullyBooted(FullyBooted),
    Join(Join),
    Leave(Leave),
    Masquerade(Masquerade),
    PeerEntry(PeerEntry),
    Rename(Rename),
    Shutdown(Shutdown),
    UserEvent(UserEvent),
    ExtensionStatus(ExtensionStatus),
    /// No shape registered for the name; the event as received.
    Unknown(Event),
}

impl TypedEvent {
    /// Name of the shape, or of the raw event for `Unknown`.
    pub fn name(&self) -> &str {
        match self {
            TypedEvent::FullyBooted(_) => FullyBooted::NAME,
            TypedEvent::Join(_) => Join::NAME,
            TypedEvent::Leave(_) => Leave::NAME,
            TypedEvent::Masquerade(_) => Masquerade::NAME,
            TypedEvent::PeerEntry(_) => PeerEntry::NAME,
            TypedEvent::Rename(_) => Rename::NAME,
            TypedEvent::Shutdown(_) => Shutdown::NAME,
            TypedEvent::UserEvent(_) => UserEvent::NAME,
            TypedEvent::ExtensionStatus(_) => ExtensionStatus::NAME,
            TypedEvent::Unknown(event) => &event.name,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypedEvent::Unknown(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callmgr_protocol::Params;

    fn event(name: &str, fixture: &[(&str, &str)]) -> Event {
        let mut event = Event::new(name);
        event.privilege = vec!["all".to_string()];
        event.params = fixture
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<Params>();
        event
    }

    /// Every fixture key must come back out under its wire name.
    fn assert_fields<T: Shape + Serialize>(fixture: &[(&str, &str)]) -> T {
        let shape = T::decode(&event(T::NAME, fixture)).unwrap();
        let value = serde_json::to_value(&shape).unwrap();
        for (key, expected) in fixture {
            assert_eq!(value[*key], *expected, "field {} of {}", key, T::NAME);
        }
        assert_eq!(value["privilege"], serde_json::json!(["all"]));
        shape
    }

    #[test]
    fn test_fully_booted() {
        let shape: FullyBooted = assert_fields(&[("Status", "Fully Booted")]);
        assert_eq!(shape.status, "Fully Booted");
    }

    #[test]
    fn test_join() {
        let shape: Join = assert_fields(&[
            ("Queue", "Queue"),
            ("Position", "Position"),
            ("Count", "Count"),
            ("Channel", "Channel"),
            ("CallerIDNum", "CallerIDNum"),
            ("CallerIDName", "CallerIDName"),
            ("ConnectedLineNum", "ConnectedLineNum"),
            ("ConnectedLineName", "ConnectedLineName"),
            ("Uniqueid", "UniqueID"),
        ]);
        assert_eq!(shape.unique_id, "UniqueID");
    }

    #[test]
    fn test_leave() {
        assert_fields::<Leave>(&[
            ("Queue", "Queue"),
            ("Count", "Count"),
            ("Position", "Position"),
            ("Channel", "Channel"),
            ("Uniqueid", "UniqueID"),
        ]);
    }

    #[test]
    fn test_masquerade() {
        assert_fields::<Masquerade>(&[
            ("Clone", "Clone"),
            ("CloneState", "CloneState"),
            ("Original", "Original"),
            ("OriginalState", "OriginalState"),
        ]);
    }

    #[test]
    fn test_peer_entry() {
        let shape: PeerEntry = assert_fields(&[
            ("Channeltype", "SIP"),
            ("ObjectName", "1001"),
            ("ChanObjectType", "peer"),
            ("IPaddress", "192.168.1.20"),
            ("IPport", "5060"),
            ("Dynamic", "yes"),
            ("Natsupport", "no"),
            ("VideoSupport", "no"),
            ("TextSupport", "no"),
            ("ACL", "no"),
            ("Status", "OK (12 ms)"),
            ("RealtimeDevice", "no"),
        ]);
        assert_eq!(shape.object_name, "1001");
        assert_eq!(shape.ip_address, "192.168.1.20");
        assert_eq!(shape.acl, "no");
    }

    #[test]
    fn test_peer_entry_lowercase_tail_keys() {
        let raw = event(
            "PeerEntry",
            &[
                ("Objectname", "1002"),
                ("Chanobjecttype", "peer"),
                ("Ipaddress", "10.0.0.7"),
                ("Ipport", "5061"),
                ("Acl", "yes"),
                ("Realtimedevice", "yes"),
            ],
        );
        let shape = PeerEntry::decode(&raw).unwrap();
        assert_eq!(shape.object_name, "1002");
        assert_eq!(shape.channel_object_type, "peer");
        assert_eq!(shape.ip_address, "10.0.0.7");
        assert_eq!(shape.ip_port, "5061");
        assert_eq!(shape.acl, "yes");
        assert_eq!(shape.realtime_device, "yes");
    }

    #[test]
    fn test_rename() {
        assert_fields::<Rename>(&[
            ("Channel", "Channel"),
            ("Newname", "NewName"),
            ("Uniqueid", "UniqueID"),
        ]);
    }

    #[test]
    fn test_shutdown() {
        assert_fields::<Shutdown>(&[("Shutdown", "Cleanly"), ("Restart", "True")]);
    }

    #[test]
    fn test_user_event() {
        assert_fields::<UserEvent>(&[("UserEvent", "UserEvent"), ("Uniqueid", "UniqueID")]);
    }

    #[test]
    fn test_extension_status() {
        assert_fields::<ExtensionStatus>(&[
            ("Exten", "Extension"),
            ("Context", "Context"),
            ("Hint", "Hint"),
            ("Status", "Status"),
        ]);
    }

    #[test]
    fn test_keys_are_case_sensitive_and_optional() {
        let shape =
            Rename::decode(&event("Rename", &[("channel", "SIP/100-1"), ("Extra", "x")])).unwrap();
        assert_eq!(shape.channel, "");
        assert_eq!(shape.new_name, "");
    }

    #[test]
    fn test_typed_name() {
        let typed = FullyBooted::default().into_typed();
        assert_eq!(typed.name(), "FullyBooted");
        assert!(!typed.is_unknown());

        let unknown = TypedEvent::Unknown(Event::new("Newexten"));
        assert_eq!(unknown.name(), "Newexten");
        assert!(unknown.is_unknown());
    }
}
