//! Relay HTTP server.
//!
//! Decouples an inbound message source from the agent's HTTP API. Every
//! forward failure is folded into a uniform JSON envelope; none of them
//! surfaces as a server error.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Service metadata |
//! | `GET`  | `/health` | Liveness probe |
//! | `POST` | `/webhook` | Forward a message, acknowledge the forward |
//! | `POST` | `/send` | Same as `/webhook`, plus the agent's `content` |
//! | `GET`  | `/test` | Forward a fixed diagnostic message |
//!
//! # Error Contract
//!
//! A body that is missing, not JSON, or has an empty `message` yields `400`:
//!
//! ```json
//! { "success": false, "error": "message is required", "error_kind": "validation" }
//! ```
//!
//! Forward failures yield `200` with `success: false` and an `error_kind` of
//! `timeout`, `connection_error`, `http_error` or `unexpected`.

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::config::Config;
use crate::models::{DiagnosticEnvelope, ForwardEnvelope, ResponseMode};
use crate::relay::{parse_inbound, rfc3339, Relay, ValidationError};

/// Starts the relay server on `bind_addr` and runs until the process exits.
pub async fn run_server(config: Config, bind_addr: &str) -> anyhow::Result<()> {
    let relay = Relay::new(Arc::new(config))?;

    tracing::info!(
        agent = %relay.config().agent_run_url(),
        callback = %relay.callback_url(),
        "relay configured"
    );

    let app = router(relay);
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!("relay listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Builds the router. Exposed so tests can serve it on an ephemeral port.
pub fn router(relay: Relay) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/webhook", post(handle_webhook))
        .route("/send", post(handle_send))
        .route("/test", get(handle_test))
        .layer(cors)
        .with_state(relay)
}

// ============ Error response ============

/// JSON body of a `400` validation response.
#[derive(Serialize)]
struct ErrorBody {
    /// Always `false`.
    success: bool,
    /// Human-readable reason (e.g., `"message is required"`).
    error: String,
    /// Always `"validation"`; forward failures use the other kinds.
    error_kind: &'static str,
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.to_string(),
            error_kind: "validation",
        };
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

// ============ GET / ============

/// Handler for `GET /`.
///
/// Returns static service metadata: name, agent, callback URL and routes.
/// Needs no body and never fails.
async fn handle_root(State(relay): State<Relay>) -> Json<serde_json::Value> {
    let config = relay.config();
    Json(json!({
        "service": config.relay.service_name,
        "status": "online",
        "version": env!("CARGO_PKG_VERSION"),
        "agent": config.agent.name,
        "response_webhook": relay.callback_url(),
        "timestamp": rfc3339(Utc::now()),
        "endpoints": {
            "webhook": "/webhook",
            "send": "/send",
            "health": "/health",
            "test": "/test",
        },
    }))
}

// ============ GET /health ============

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    /// Always `"ok"` when the server is running.
    status: &'static str,
    /// `[relay].service_name` from configuration.
    service: String,
    /// Time of the probe, RFC 3339 UTC.
    timestamp: String,
}

/// Handler for `GET /health`.
///
/// Liveness probe for the deployment platform. Does not contact the agent.
async fn handle_health(State(relay): State<Relay>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: relay.config().relay.service_name.clone(),
        timestamp: rfc3339(Utc::now()),
    })
}

// ============ POST /webhook, POST /send ============

/// Handler for `POST /webhook`.
///
/// Forwards the message and acknowledges the forward only; the agent's
/// answer goes to the callback URL.
async fn handle_webhook(
    State(relay): State<Relay>,
    body: Bytes,
) -> Result<Json<ForwardEnvelope>, ValidationError> {
    forward_with_mode(&relay, &body, ResponseMode::Webhook).await
}

/// Handler for `POST /send`.
///
/// Same forward as `/webhook`; the acknowledgement also carries the agent's
/// `content` field as `response` when present.
async fn handle_send(
    State(relay): State<Relay>,
    body: Bytes,
) -> Result<Json<ForwardEnvelope>, ValidationError> {
    forward_with_mode(&relay, &body, ResponseMode::Send).await
}

/// Shared body of `/webhook` and `/send`. Returns `400` before any
/// outbound call when the body fails validation.
async fn forward_with_mode(
    relay: &Relay,
    body: &[u8],
    mode: ResponseMode,
) -> Result<Json<ForwardEnvelope>, ValidationError> {
    let inbound = parse_inbound(body).inspect_err(|e| {
        tracing::debug!(route = mode.source(), error = %e, "rejected inbound request");
    })?;

    if let Some(message) = inbound.message.as_deref() {
        tracing::info!(
            route = mode.source(),
            user_id = inbound.user_id.as_deref().unwrap_or("-"),
            "message received: {}",
            message
        );
    }

    let envelope = relay.relay(inbound, mode).await.inspect_err(|e| {
        tracing::debug!(route = mode.source(), error = %e, "rejected inbound request");
    })?;
    Ok(Json(envelope))
}

// ============ GET /test ============

/// Handler for `GET /test`.
///
/// Forwards `[relay].test_message` as `[relay].test_user_id` and returns the
/// full result, including the agent's raw reply.
async fn handle_test(State(relay): State<Relay>) -> Json<DiagnosticEnvelope> {
    tracing::info!(
        message = %relay.config().relay.test_message,
        "running diagnostic forward"
    );
    Json(relay.diagnose().await)
}
