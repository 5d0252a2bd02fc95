//! HTTP-level tests: a mock agent and the relay router, both served on
//! ephemeral ports.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_relay::config::Config;
use agent_relay::relay::Relay;
use agent_relay::server::router;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

const CALLBACK: &str = "https://hooks.example.com/agent-replies";

#[derive(Clone, Copy)]
enum AgentBehavior {
    Reply,
    Fail,
    Slow,
}

#[derive(Clone)]
struct MockAgent {
    behavior: AgentBehavior,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

async fn mock_run(
    State(agent): State<MockAgent>,
    Path(name): Path<String>,
    Json(payload): Json<Value>,
) -> (StatusCode, Json<Value>) {
    agent.calls.lock().unwrap().push((name, payload.clone()));
    match agent.behavior {
        AgentBehavior::Reply => (
            StatusCode::OK,
            Json(json!({
                "run_id": "run-1",
                "content": format!("echo: {}", payload["message"].as_str().unwrap_or("")),
            })),
        ),
        AgentBehavior::Fail => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": "model overloaded"})),
        ),
        AgentBehavior::Slow => {
            tokio::time::sleep(Duration::from_secs(3)).await;
            (StatusCode::OK, Json(json!({})))
        }
    }
}

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn spawn_agent(behavior: AgentBehavior) -> (SocketAddr, Arc<Mutex<Vec<(String, Value)>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new()
        .route("/agents/{name}/run", post(mock_run))
        .with_state(MockAgent {
            behavior,
            calls: calls.clone(),
        });
    (serve(app).await, calls)
}

fn relay_config(agent_base: &str, timeout_secs: u64) -> Config {
    let mut cfg = Config::default();
    cfg.agent.base_url = agent_base.to_string();
    cfg.agent.name = "helper".to_string();
    cfg.agent.timeout_secs = timeout_secs;
    cfg.callback.url = CALLBACK.to_string();
    cfg
}

async fn spawn_relay(cfg: Config) -> String {
    cfg.validate().unwrap();
    let relay = Relay::new(Arc::new(cfg)).unwrap();
    let addr = serve(router(relay)).await;
    format!("http://{}", addr)
}

/// A base URL on which nothing is listening.
async fn dead_base_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_webhook_forwards_and_echoes() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({"message": "Where is my order?", "user_id": "alice"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Where is my order?");
    assert_eq!(body["user_id"], "alice");
    assert_eq!(body["response_webhook"], CALLBACK);
    assert!(body.get("error").is_none());
    assert!(body.get("response").is_none());

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (name, payload) = &calls[0];
    assert_eq!(name, "helper");
    assert_eq!(payload["message"], "Where is my order?");
    assert_eq!(payload["user_id"], "alice");
    assert_eq!(payload["stream"], false);
    assert_eq!(payload["metadata"]["source"], "webhook");
}

#[tokio::test]
async fn test_webhook_defaults_user_id() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({"message": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], "webhook_user");
    assert_eq!(calls.lock().unwrap()[0].1["user_id"], "webhook_user");
}

#[tokio::test]
async fn test_missing_message_is_rejected_without_forwarding() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;
    let client = reqwest::Client::new();

    for path in ["/webhook", "/send"] {
        let resp = client
            .post(format!("{}{}", base, path))
            .json(&json!({"user_id": "bob"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error_kind"], "validation");

        let resp = client
            .post(format!("{}{}", base, path))
            .json(&json!({"message": ""}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .post(format!("{}{}", base, path))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .post(format!("{}{}", base, path))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    }

    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_agent_reports_connection_error() {
    let base = spawn_relay(relay_config(&dead_base_url().await, 5)).await;

    let resp = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({"message": "anyone there?"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "connection_error");
    let error = body["error"].as_str().unwrap();
    let cause = error
        .strip_prefix("could not connect to the agent: ")
        .unwrap_or_else(|| panic!("unexpected error text: {}", error));
    assert!(!cause.trim().is_empty(), "root cause missing: {}", error);
    assert_eq!(body["message"], "anyone there?");
}

#[tokio::test]
async fn test_agent_http_error_is_classified() {
    let (agent, calls) = spawn_agent(AgentBehavior::Fail).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/send", base))
        .json(&json!({"message": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "http_error");
    let error = body["error"].as_str().unwrap();
    assert!(error.contains("500"), "{}", error);
    assert!(error.contains("model overloaded"), "{}", error);
    assert!(body.get("response").is_none());
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let (agent, _calls) = spawn_agent(AgentBehavior::Slow).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 1)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({"message": "hi"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], false);
    assert_eq!(body["error_kind"], "timeout");
}

#[tokio::test]
async fn test_caller_cannot_override_callback() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({
            "message": "hi",
            "webhook_url": "https://attacker.example.com/steal",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["response_webhook"], CALLBACK);
    assert_eq!(calls.lock().unwrap()[0].1["webhook_url"], CALLBACK);
}

#[tokio::test]
async fn test_send_surfaces_agent_content() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/send", base))
        .json(&json!({"message": "ping", "metadata": {"channel": "sms"}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["success"], true);
    assert_eq!(body["response"], "echo: ping");

    let calls = calls.lock().unwrap();
    let metadata = &calls[0].1["metadata"];
    assert_eq!(metadata["channel"], "sms");
    assert_eq!(metadata["source"], "send");
    assert!(metadata["received_at"].is_string());
}

#[tokio::test]
async fn test_caller_metadata_reaches_agent_untouched() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::Client::new()
        .post(format!("{}/webhook", base))
        .json(&json!({
            "message": "hi",
            "metadata": {
                "source": "whatsapp",
                "webhook_url": "https://attacker.example.com/steal",
                "thread": {"id": 7},
            },
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["success"], true);

    let calls = calls.lock().unwrap();
    let payload = &calls[0].1;
    assert_eq!(payload["webhook_url"], CALLBACK);
    assert_eq!(payload["metadata"]["source"], "whatsapp");
    assert_eq!(payload["metadata"]["thread"]["id"], 7);
    assert_eq!(
        payload["metadata"]["webhook_url"],
        "https://attacker.example.com/steal"
    );
}

#[tokio::test]
async fn test_repeated_sends_are_independent() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let body: Value = client
            .post(format!("{}/send", base))
            .json(&json!({"message": "same", "user_id": "carol"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["response"], "echo: same");
    }

    assert_eq!(calls.lock().unwrap().len(), 3);
}

#[tokio::test]
async fn test_health_and_root_need_no_backend() {
    let base = spawn_relay(relay_config(&dead_base_url().await, 5)).await;
    let client = reqwest::Client::new();

    let health = client.get(format!("{}/health", base)).send().await.unwrap();
    assert_eq!(health.status(), 200);
    let health: Value = health.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert!(health["timestamp"].is_string());

    let root = client.get(format!("{}/", base)).send().await.unwrap();
    assert_eq!(root.status(), 200);
    let root: Value = root.json().await.unwrap();
    assert_eq!(root["status"], "online");
    assert_eq!(root["response_webhook"], CALLBACK);
    assert_eq!(root["endpoints"]["webhook"], "/webhook");
}

#[tokio::test]
async fn test_diagnostic_forward() {
    let (agent, calls) = spawn_agent(AgentBehavior::Reply).await;
    let base = spawn_relay(relay_config(&format!("http://{}", agent), 30)).await;

    let body: Value = reqwest::get(format!("{}/test", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["test"], true);
    assert_eq!(body["success"], true);
    assert_eq!(body["user_id"], "test_user");
    assert_eq!(body["agent_response"]["run_id"], "run-1");

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].1["metadata"]["source"], "test");
}
