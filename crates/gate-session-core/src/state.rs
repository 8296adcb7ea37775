//! Serializable session record.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{TraceContext, traits::StateError};

/// Session-scoped key/value data.
pub type Settings = HashMap<String, String>;

/// Last-known state of one client connection.
///
/// The live connection belongs to the gate named by `server_id`; this record
/// is only a mirror of it. Field names on the wire are PascalCase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct SessionState {
    #[serde(rename = "IP")]
    pub ip: String,
    pub network: String,
    pub topic: String,
    /// Empty means no user is bound (a guest).
    pub user_id: String,
    pub session_id: String,
    /// Gate node owning the live connection.
    pub server_id: String,
    pub trace_id: String,
    pub span_id: String,
    #[serde(deserialize_with = "settings_or_empty")]
    pub settings: Settings,
}

fn settings_or_empty<'de, D>(deserializer: D) -> Result<Settings, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Settings>::deserialize(deserializer)?.unwrap_or_default())
}

impl SessionState {
    /// Decode a MessagePack payload.
    ///
    /// # Errors
    /// Returns `StateError::Format` if the payload is malformed.
    pub fn decode(data: &[u8]) -> Result<Self, StateError> {
        rmp_serde::from_slice(data).map_err(|e| StateError::Format(e.to_string()))
    }

    /// Encode as a named MessagePack map.
    ///
    /// # Errors
    /// Returns `StateError::Encode` if the encoder fails.
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        rmp_serde::to_vec_named(self).map_err(|e| StateError::Encode(e.to_string()))
    }

    /// Build a record from a loosely-typed map.
    ///
    /// Recognized keys are `Userid`, `IP`, `Topic`, `Network`, `Sessionid`,
    /// `Serverid` and `Settings`. Absent or null keys keep their defaults and
    /// unknown keys are ignored.
    ///
    /// # Errors
    /// Returns `StateError::Type` when a recognized key holds the wrong type.
    pub fn from_loose_map(map: &HashMap<String, Value>) -> Result<Self, StateError> {
        let mut state = Self::default();

        if let Some(v) = loose_string(map, "Userid")? {
            state.user_id = v;
        }
        if let Some(v) = loose_string(map, "IP")? {
            state.ip = v;
        }
        if let Some(v) = loose_string(map, "Topic")? {
            state.topic = v;
        }
        if let Some(v) = loose_string(map, "Network")? {
            state.network = v;
        }
        if let Some(v) = loose_string(map, "Sessionid")? {
            state.session_id = v;
        }
        if let Some(v) = loose_string(map, "Serverid")? {
            state.server_id = v;
        }
        if let Some(v) = loose_settings(map, "Settings")? {
            state.settings = v;
        }

        Ok(state)
    }

    /// Trace context of this record.
    #[must_use]
    pub fn trace(&self) -> TraceContext {
        TraceContext::new(self.trace_id.clone(), self.span_id.clone())
    }

    /// Take over an authoritative record returned by the owning gate.
    ///
    /// Every session field is replaced; the trace context stays local
    /// because it names this proxy's span, not the gate's.
    pub fn adopt(&mut self, reply: Self) {
        let Self {
            ip,
            network,
            topic,
            user_id,
            session_id,
            server_id,
            trace_id: _,
            span_id: _,
            settings,
        } = reply;

        self.ip = ip;
        self.network = network;
        self.topic = topic;
        self.user_id = user_id;
        self.session_id = session_id;
        self.server_id = server_id;
        self.settings = settings;
    }
}

fn loose_string(map: &HashMap<String, Value>, key: &'static str) -> Result<Option<String>, StateError> {
    match map.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(StateError::Type {
            key,
            expected: "string",
            found: value_kind(other),
        }),
    }
}

fn loose_settings(
    map: &HashMap<String, Value>,
    key: &'static str,
) -> Result<Option<Settings>, StateError> {
    let entries = match map.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Object(entries)) => entries,
        Some(other) => {
            return Err(StateError::Type {
                key,
                expected: "string map",
                found: value_kind(other),
            });
        }
    };

    entries
        .iter()
        .map(|(k, v)| match v {
            Value::String(s) => Ok((k.clone(), s.clone())),
            other => Err(StateError::Type {
                key,
                expected: "string map",
                found: value_kind(other),
            }),
        })
        .collect::<Result<Settings, _>>()
        .map(Some)
}

const fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
