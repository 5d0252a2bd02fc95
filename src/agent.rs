//! HTTP client for the hosted agent API.
//!
//! A forward is a single `POST {base_url}/agents/{name}/run` call bounded by
//! `[agent].timeout_secs`. There is no retry: any failure is classified into
//! a [`ForwardError`] and reported once.

use std::time::Duration;

use anyhow::Result;
use serde_json::Value;

use crate::config::Config;
use crate::models::{AgentRunPayload, ForwardRequest};

/// Longest agent error body kept in a [`ForwardError::Http`].
const MAX_ERROR_BODY_CHARS: usize = 2048;

/// Why a forward to the agent failed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ForwardError {
    #[error("timed out after {secs}s waiting for the agent")]
    Timeout { secs: u64 },
    #[error("could not connect to the agent: {0}")]
    Connection(String),
    #[error("agent returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl ForwardError {
    /// Stable machine-readable name, reported as `error_kind`.
    pub fn kind(&self) -> &'static str {
        match self {
            ForwardError::Timeout { .. } => "timeout",
            ForwardError::Connection(_) => "connection_error",
            ForwardError::Http { .. } => "http_error",
            ForwardError::Unexpected(_) => "unexpected",
        }
    }

    /// Maps a transport-level reqwest error onto the closed error kinds.
    pub fn from_reqwest(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            ForwardError::Timeout { secs: timeout_secs }
        } else if err.is_connect() {
            ForwardError::Connection(root_cause(&err))
        } else {
            ForwardError::Unexpected(root_cause(&err))
        }
    }
}

/// reqwest wraps the interesting part (e.g. "Connection refused") a few
/// sources deep; surface the innermost message.
fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current.to_string()
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        return body.to_string();
    }
    let mut out: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
    out.push('…');
    out
}

/// Client for the agent run endpoint.
///
/// Holds one pooled `reqwest::Client`; cloning is cheap and shares the pool.
#[derive(Debug, Clone)]
pub struct AgentClient {
    http: reqwest::Client,
    run_url: String,
    health_url: String,
    callback_url: String,
    timeout_secs: u64,
}

impl AgentClient {
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.agent.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            run_url: config.agent_run_url(),
            health_url: format!("{}/health", config.agent.base_url.trim_end_matches('/')),
            callback_url: config.callback.url.clone(),
            timeout_secs: config.agent.timeout_secs,
        })
    }

    pub fn run_url(&self) -> &str {
        &self.run_url
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    /// Builds the outbound payload. The callback URL always comes from
    /// configuration.
    pub fn payload(&self, request: &ForwardRequest) -> AgentRunPayload {
        AgentRunPayload {
            message: request.message.clone(),
            user_id: request.user_id.clone(),
            webhook_url: self.callback_url.clone(),
            metadata: request.metadata.clone(),
            stream: false,
        }
    }

    /// Sends one forward and returns the agent's JSON reply.
    pub async fn run(&self, request: &ForwardRequest) -> Result<Value, ForwardError> {
        let payload = self.payload(request);

        let response = self
            .http
            .post(&self.run_url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ForwardError::from_reqwest(e, self.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ForwardError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ForwardError::from_reqwest(e, self.timeout_secs))?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| ForwardError::Unexpected(format!("agent reply is not valid JSON: {}", e)))
    }

    /// Probes `GET {base_url}/health`. Used by `relay doctor`.
    pub async fn probe(&self, timeout: Duration) -> Result<u16, ForwardError> {
        let response = self
            .http
            .get(&self.health_url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ForwardError::from_reqwest(e, timeout.as_secs()))?;
        let status = response.status();
        if status.is_success() {
            Ok(status.as_u16())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ForwardError::Http {
                status: status.as_u16(),
                body: truncate_body(&body),
            })
        }
    }
}
