//! Data models that flow through the relay.
//!
//! An [`InboundMessage`] arrives from a webhook caller, is validated into a
//! [`ForwardRequest`], sent to the agent as an [`AgentRunPayload`], and the
//! outcome is reported back as a [`ForwardEnvelope`] or [`DiagnosticEnvelope`].

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body accepted by `POST /webhook` and `POST /send`.
///
/// All fields are optional at the parsing stage so that a missing message
/// produces a validation error instead of a deserialization failure.
/// Unknown fields, including any caller-supplied `webhook_url`, are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub metadata: Option<Map<String, Value>>,
}

/// A validated message ready to be forwarded.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardRequest {
    /// Non-empty message text.
    pub message: String,
    /// Caller's user id, or `[relay].default_user_id`.
    pub user_id: String,
    /// Caller metadata plus `source` and `received_at` when not already set.
    pub metadata: Map<String, Value>,
}

/// JSON body of `POST {agent}/agents/{name}/run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentRunPayload {
    pub message: String,
    pub user_id: String,
    /// Always `[callback].url`, never a caller-supplied value.
    pub webhook_url: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    pub stream: bool,
}

/// Which acknowledgement shape a forward is reported with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// `POST /webhook`: acknowledgement only.
    Webhook,
    /// `POST /send`: acknowledgement plus the agent's `content` field.
    Send,
}

impl ResponseMode {
    /// Value recorded in `metadata.source` for forwards made in this mode.
    pub fn source(self) -> &'static str {
        match self {
            ResponseMode::Webhook => "webhook",
            ResponseMode::Send => "send",
        }
    }
}

/// Acknowledgement returned by `POST /webhook` and `POST /send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwardEnvelope {
    /// Whether the forward succeeded; says nothing about the agent's answer.
    pub success: bool,
    /// Echo of the forwarded user id.
    pub user_id: String,
    /// Echo of the forwarded message.
    pub message: String,
    /// Agent's `content` field (`/send` only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// When the forward finished, RFC 3339 UTC.
    pub timestamp: String,
    /// The callback URL the agent will post its answer to.
    pub response_webhook: String,
    /// Human-readable failure description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// `timeout`, `connection_error`, `http_error` or `unexpected`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}

/// Full result returned by `GET /test` and `relay test`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEnvelope {
    /// Always `true`; marks a diagnostic result.
    pub test: bool,
    pub success: bool,
    pub message: String,
    pub user_id: String,
    /// The agent's full JSON reply, or `null` on failure.
    pub agent_response: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub response_webhook: String,
    pub timestamp: String,
}
