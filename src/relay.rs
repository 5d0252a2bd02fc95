//! Forwarding pipeline: validate an inbound message, forward it to the
//! agent once, and shape the outcome into an acknowledgement.
//!
//! [`Relay`] is built once at startup and shared by every handler. It owns
//! the read-only [`Config`] and the [`AgentClient`]; nothing in it is mutated
//! after construction, so concurrent forwards never affect one another.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use crate::agent::{AgentClient, ForwardError};
use crate::config::Config;
use crate::models::{
    DiagnosticEnvelope, ForwardEnvelope, ForwardRequest, InboundMessage, ResponseMode,
};

/// Why an inbound request was rejected before any outbound call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("no JSON data provided")]
    MissingBody,
    #[error("invalid JSON body: {0}")]
    InvalidBody(String),
    #[error("message is required")]
    EmptyMessage,
}

/// Outcome of one forward. Derived from the outbound call and never stored.
#[derive(Debug, Clone)]
pub struct ForwardResult {
    pub request: ForwardRequest,
    pub outcome: Result<Value, ForwardError>,
    pub timestamp: DateTime<Utc>,
}

impl ForwardResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    fn error_fields(&self) -> (Option<String>, Option<String>) {
        match &self.outcome {
            Ok(_) => (None, None),
            Err(e) => (Some(e.to_string()), Some(e.kind().to_string())),
        }
    }

    /// The acknowledgement returned by `/webhook` (and, with the agent's
    /// `content` added, by `/send`).
    pub fn envelope(&self, mode: ResponseMode, callback_url: &str) -> ForwardEnvelope {
        let (error, error_kind) = self.error_fields();
        let response = match (mode, &self.outcome) {
            (ResponseMode::Send, Ok(reply)) => reply.get("content").cloned(),
            _ => None,
        };

        ForwardEnvelope {
            success: self.is_success(),
            user_id: self.request.user_id.clone(),
            message: self.request.message.clone(),
            response,
            timestamp: rfc3339(self.timestamp),
            response_webhook: callback_url.to_string(),
            error,
            error_kind,
        }
    }

    /// The full result returned by `/test`.
    pub fn diagnostic(&self, callback_url: &str) -> DiagnosticEnvelope {
        let (error, error_kind) = self.error_fields();
        DiagnosticEnvelope {
            test: true,
            success: self.is_success(),
            message: self.request.message.clone(),
            user_id: self.request.user_id.clone(),
            agent_response: self.outcome.as_ref().ok().cloned(),
            error,
            error_kind,
            response_webhook: callback_url.to_string(),
            timestamp: rfc3339(self.timestamp),
        }
    }
}

pub fn rfc3339(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parses a raw request body into an [`InboundMessage`].
///
/// An empty body, malformed JSON, or a non-object value are validation
/// errors, reported as a client error rather than a forward failure.
pub fn parse_inbound(body: &[u8]) -> Result<InboundMessage, ValidationError> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(ValidationError::MissingBody);
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| ValidationError::InvalidBody(e.to_string()))?;
    match value {
        Value::Null => Err(ValidationError::MissingBody),
        Value::Object(_) => serde_json::from_value(value)
            .map_err(|e| ValidationError::InvalidBody(e.to_string())),
        _ => Err(ValidationError::InvalidBody(
            "expected a JSON object".to_string(),
        )),
    }
}

/// Shared relay state: configuration plus the agent client.
#[derive(Debug, Clone)]
pub struct Relay {
    config: Arc<Config>,
    agent: AgentClient,
}

impl Relay {
    pub fn new(config: Arc<Config>) -> Result<Self> {
        let agent = AgentClient::new(&config)?;
        Ok(Self { config, agent })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn callback_url(&self) -> &str {
        self.agent.callback_url()
    }

    /// Validates an inbound message into a [`ForwardRequest`].
    ///
    /// `source` is recorded in `metadata.source` unless the caller set it.
    pub fn prepare(
        &self,
        inbound: InboundMessage,
        source: &str,
    ) -> Result<ForwardRequest, ValidationError> {
        let message = inbound.message.unwrap_or_default();
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage);
        }

        let user_id = inbound
            .user_id
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| self.config.relay.default_user_id.clone());

        let mut metadata = inbound.metadata.unwrap_or_default();
        metadata
            .entry("source")
            .or_insert_with(|| Value::String(source.to_string()));
        metadata
            .entry("received_at")
            .or_insert_with(|| Value::String(rfc3339(Utc::now())));

        Ok(ForwardRequest {
            message,
            user_id,
            metadata,
        })
    }

    /// Performs exactly one outbound call for `request`.
    pub async fn forward(&self, request: ForwardRequest) -> ForwardResult {
        let source = request
            .metadata
            .get("source")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("");
        tracing::info!(
            user_id = %request.user_id,
            source = source,
            "forwarding message to agent"
        );

        let outcome = self.agent.run(&request).await;
        match &outcome {
            Ok(_) => tracing::info!(
                user_id = %request.user_id,
                callback = %self.callback_url(),
                "message forwarded, agent will reply to callback"
            ),
            Err(e) => tracing::warn!(
                user_id = %request.user_id,
                kind = e.kind(),
                error = %e,
                "forward to agent failed"
            ),
        }

        ForwardResult {
            request,
            outcome,
            timestamp: Utc::now(),
        }
    }

    /// Validates then forwards; the single entry point for `/webhook` and `/send`.
    pub async fn relay(
        &self,
        inbound: InboundMessage,
        mode: ResponseMode,
    ) -> Result<ForwardEnvelope, ValidationError> {
        let request = self.prepare(inbound, mode.source())?;
        let result = self.forward(request).await;
        Ok(result.envelope(mode, self.callback_url()))
    }

    /// Forwards the configured diagnostic message.
    pub async fn diagnose(&self) -> DiagnosticEnvelope {
        let request = ForwardRequest {
            message: self.config.relay.test_message.clone(),
            user_id: self.config.relay.test_user_id.clone(),
            metadata: Map::from_iter([("source".to_string(), Value::from("test"))]),
        };
        let result = self.forward(request).await;
        result.diagnostic(self.callback_url())
    }
}
