//! Message protocol between a host and the worker.
//!
//! Every frame is a JSON object `{ "type": ..., "payload": ... }`. Inbound frames are
//! parsed leniently: an unknown `type` maps to [`Inbound::Unknown`] and a payload of the
//! wrong shape is treated as absent.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::ModelTier;

/// Messages sent from the host to the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    LoadTinyModel,
    LoadFullModel,
    Infer { text: Option<String> },
    AgentStart { goal: Option<String> },
    AgentCancel,
    /// Anything the worker does not understand; dropped without a reply.
    Unknown(String),
}

/// Envelope used only for parsing; the payload is interpreted per type.
#[derive(Debug, Deserialize)]
struct RawInbound {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    payload: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
struct InferPayload {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentStartPayload {
    #[serde(default)]
    goal: Option<String>,
}

impl Inbound {
    /// Parse a JSON frame. Only frames that are not JSON objects at all fail.
    pub fn from_json(frame: &str) -> Result<Self> {
        let raw: RawInbound = serde_json::from_str(frame)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: RawInbound) -> Self {
        match raw.kind.as_str() {
            "load-tiny-model" => Inbound::LoadTinyModel,
            "load-full-model" => Inbound::LoadFullModel,
            "infer" => {
                let payload: InferPayload =
                    serde_json::from_value(raw.payload).unwrap_or_default();
                Inbound::Infer { text: payload.text }
            }
            "agent-start" => {
                let payload: AgentStartPayload =
                    serde_json::from_value(raw.payload).unwrap_or_default();
                Inbound::AgentStart { goal: payload.goal }
            }
            "agent-cancel" => Inbound::AgentCancel,
            _ => Inbound::Unknown(raw.kind),
        }
    }

    /// Message type as it appears on the wire
    pub fn kind(&self) -> &str {
        match self {
            Inbound::LoadTinyModel => "load-tiny-model",
            Inbound::LoadFullModel => "load-full-model",
            Inbound::Infer { .. } => "infer",
            Inbound::AgentStart { .. } => "agent-start",
            Inbound::AgentCancel => "agent-cancel",
            Inbound::Unknown(kind) => kind.as_str(),
        }
    }
}

/// Messages sent from the worker back to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Outbound {
    ModelStatus(ModelStatus),
    Error(String),
    InferResult(InferResult),
    AgentStatus(AgentStatus),
    AgentPlan(AgentPlan),
    AgentResult(AgentResult),
}

impl Outbound {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelStatus {
    pub tiny: bool,
    pub full: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferResult {
    /// Wall-clock milliseconds from accepting the request to replying
    pub latency: u64,
    pub model: ModelTier,
    pub intent: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Planning,
    Executing,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    pub state: AgentState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// 1-based index of the step being executed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AgentStatus {
    pub fn planning(goal: &str) -> Self {
        Self {
            state: AgentState::Planning,
            goal: Some(goal.to_string()),
            step: None,
            total: None,
            description: None,
        }
    }

    pub fn executing(step: usize, total: usize, description: &str) -> Self {
        Self {
            state: AgentState::Executing,
            goal: None,
            step: Some(step),
            total: Some(total),
            description: Some(description.to_string()),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            state: AgentState::Cancelled,
            goal: None,
            step: None,
            total: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentPlan {
    pub steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentResult {
    pub summary: String,
    pub tokens: u32,
    pub time_ms: u64,
}
