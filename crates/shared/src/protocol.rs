use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{CommandId, RunState};

pub const STATE_UPDATE_EVENT: &str = "state-update";
pub const CLIENT_UPDATE_EVENT: &str = "client-update";
pub const ACTION_UPDATE_EVENT: &str = "action-update";
pub const COMMAND_EVENT_PREFIX: &str = "command/";

/// Header carried by a command that the core has not resolved yet.
pub const PRELIM_HEADER: &str = "_PRELIM";

/// One named event on the push channel, in either direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl PushFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultMessage<T> {
    pub result: T,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub message: ResultMessage<RunState>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub message: ResultMessage<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionUpdate {
    pub id: CommandId,
    pub header: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<ActionMessage>,
}

/// Body of an `action-update`. A key sent as `null` is kept as `Some(Value::Null)`
/// so it can overwrite; only a missing key is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionMessage {
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub result: Option<Value>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub metadata: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Correlated command body: `{id, params}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub id: CommandId,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OutboundCommand {
    pub name: String,
    pub envelope: CommandEnvelope,
}

impl OutboundCommand {
    pub fn new(name: impl Into<String>, envelope: CommandEnvelope) -> Self {
        Self {
            name: name.into(),
            envelope,
        }
    }

    pub fn event_name(&self) -> String {
        format!("{COMMAND_EVENT_PREFIX}{}", self.name)
    }

    pub fn to_frame(&self) -> serde_json::Result<PushFrame> {
        Ok(PushFrame::new(
            self.event_name(),
            serde_json::to_value(&self.envelope)?,
        ))
    }
}

/// Option chosen from a select-style trigger, e.g. a routine and its parameter names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionDescriptor {
    pub name: String,
    #[serde(default)]
    pub params: Vec<String>,
}

impl OptionDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
        }
    }
}

/// Body of `GET /command/actionid/:id` on the HTTP surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResultResponse {
    pub result: Value,
}
