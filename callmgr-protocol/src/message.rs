//! Actions, responses and events.

use crate::error::ProtocolError;
use crate::frame::Frame;
use crate::{
    FIELD_ACTION_ID, FIELD_EVENT, FIELD_MESSAGE, FIELD_PRIVILEGE, FIELD_RESPONSE, STATUS_ERROR,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Flat parameter set of an action, response or event.
pub type Params = BTreeMap<String, String>;

fn lookup<'a>(params: &'a Params, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .or_else(|| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
        .map(String::as_str)
}

/// A client-issued request: a name plus a flat parameter set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub params: Params,
}

impl Action {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Params::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: Params) -> Self {
        self.params.extend(params);
        self
    }

    /// Returns the caller-supplied correlation identifier, if any.
    pub fn action_id(&self) -> Option<&str> {
        lookup(&self.params, FIELD_ACTION_ID)
    }

    /// Returns the correlation identifier, assigning `id` when the action
    /// does not carry one yet.
    pub fn ensure_action_id(&mut self, id: impl FnOnce() -> String) -> String {
        if let Some(existing) = self.action_id() {
            return existing.to_string();
        }
        let id = id();
        self.params.insert(FIELD_ACTION_ID.to_string(), id.clone());
        id
    }
}

/// Classification of an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Response,
    Event,
}

impl FrameKind {
    /// Classifies a frame by field presence. `Response` takes precedence.
    pub fn of(frame: &Frame) -> Result<Self, ProtocolError> {
        if frame.contains(FIELD_RESPONSE) {
            Ok(FrameKind::Response)
        } else if frame.contains(FIELD_EVENT) {
            Ok(FrameKind::Event)
        } else {
            Err(ProtocolError::UnrecognizedFrame)
        }
    }
}

/// Reply correlated to exactly one action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    /// Correlation identifier of the originating action.
    pub id: String,
    /// Value of the `Response` field (`Success`, `Error`, `Follows`, ...).
    pub status: String,
    /// Every other field, first value only.
    pub params: Params,
}

impl Response {
    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let status = frame
            .get(FIELD_RESPONSE)
            .ok_or(ProtocolError::MissingField(FIELD_RESPONSE))?;
        let id = frame
            .get(FIELD_ACTION_ID)
            .ok_or(ProtocolError::MissingField(FIELD_ACTION_ID))?;

        let mut params = Params::new();
        for (k, v) in frame.iter() {
            if k.eq_ignore_ascii_case(FIELD_RESPONSE) || k.eq_ignore_ascii_case(FIELD_ACTION_ID) {
                continue;
            }
            params.entry(k.to_string()).or_insert_with(|| v.to_string());
        }

        Ok(Self {
            id: id.to_string(),
            status: status.to_string(),
            params,
        })
    }

    /// Returns whether the switch rejected the action.
    pub fn is_error(&self) -> bool {
        self.status.eq_ignore_ascii_case(STATUS_ERROR)
    }

    pub fn is_success(&self) -> bool {
        !self.is_error()
    }

    /// Returns the `Message` field.
    pub fn message(&self) -> Option<&str> {
        self.get(FIELD_MESSAGE)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }
}

/// Unsolicited notification pushed by the switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event name (`FullyBooted`, `Newchannel`, ...).
    pub name: String,
    /// Tags from the `Privilege` field.
    #[serde(default)]
    pub privilege: Vec<String>,
    /// Every field except `Event` and `Privilege`, first value only.
    pub params: Params,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            privilege: Vec::new(),
            params: Params::new(),
        }
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, ProtocolError> {
        let name = frame
            .get(FIELD_EVENT)
            .ok_or(ProtocolError::MissingField(FIELD_EVENT))?;

        let privilege = frame
            .get(FIELD_PRIVILEGE)
            .map(|p| {
                p.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let mut params = Params::new();
        for (k, v) in frame.iter() {
            if k.eq_ignore_ascii_case(FIELD_EVENT) || k.eq_ignore_ascii_case(FIELD_PRIVILEGE) {
                continue;
            }
            params.entry(k.to_string()).or_insert_with(|| v.to_string());
        }

        Ok(Self {
            name: name.to_string(),
            privilege,
            params,
        })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        lookup(&self.params, name)
    }
}
