use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable overriding `[agent].base_url`.
pub const ENV_AGENT_API_URL: &str = "RELAY_AGENT_API_URL";
/// Environment variable overriding `[callback].url`.
pub const ENV_CALLBACK_URL: &str = "RELAY_CALLBACK_URL";
/// Environment variable overriding `[server].bind`.
pub const ENV_BIND: &str = "RELAY_BIND";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub callback: CallbackConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Name of the variable holding the chat model key. Only `doctor` reads it.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            name: default_agent_name(),
            timeout_secs: default_timeout_secs(),
            api_key_env: default_api_key_env(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_agent_name() -> String {
    "assistente-niara".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct CallbackConfig {
    /// Where the agent posts its eventual answer. Callers cannot override it.
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_user_id")]
    pub default_user_id: String,
    #[serde(default = "default_test_user_id")]
    pub test_user_id: String,
    #[serde(default = "default_test_message")]
    pub test_message: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            default_user_id: default_user_id(),
            test_user_id: default_test_user_id(),
            test_message: default_test_message(),
        }
    }
}

fn default_service_name() -> String {
    "Agent Relay".to_string()
}
fn default_user_id() -> String {
    "webhook_user".to_string()
}
fn default_test_user_id() -> String {
    "test_user".to_string()
}
fn default_test_message() -> String {
    "Hello, how do I configure the chatbot?".to_string()
}

impl Config {
    /// The full agent run endpoint: `{base_url}/agents/{name}/run`.
    pub fn agent_run_url(&self) -> String {
        format!(
            "{}/agents/{}/run",
            self.agent.base_url.trim_end_matches('/'),
            self.agent.name
        )
    }

    /// Applies `RELAY_*` environment overrides on top of file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_AGENT_API_URL) {
            self.agent.base_url = url;
        }
        if let Some(url) = non_empty(ENV_CALLBACK_URL) {
            self.callback.url = url;
        }
        if let Some(bind) = non_empty(ENV_BIND) {
            self.server.bind = bind;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !is_http_url(&self.agent.base_url) {
            anyhow::bail!(
                "agent.base_url must be an http(s) URL, got '{}'",
                self.agent.base_url
            );
        }

        let name = self.agent.name.trim();
        if name.is_empty() || name.contains('/') {
            anyhow::bail!("agent.name must be non-empty and must not contain '/'");
        }

        if self.agent.timeout_secs == 0 {
            anyhow::bail!("agent.timeout_secs must be > 0");
        }

        if self.callback.url.trim().is_empty() {
            anyhow::bail!(
                "callback.url is not configured (set [callback].url or {})",
                ENV_CALLBACK_URL
            );
        }
        if !is_http_url(&self.callback.url) {
            anyhow::bail!(
                "callback.url must be an http(s) URL, got '{}'",
                self.callback.url
            );
        }

        if self.relay.default_user_id.trim().is_empty() {
            anyhow::bail!("relay.default_user_id must not be empty");
        }

        Ok(())
    }
}

fn is_http_url(s: &str) -> bool {
    let s = s.trim();
    let rest = s
        .strip_prefix("http://")
        .or_else(|| s.strip_prefix("https://"));
    matches!(rest, Some(host) if !host.is_empty())
}

/// Parses a config from TOML text without touching the environment.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    Ok(config)
}

/// Reads, overrides and validates the config file at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Like [`load_config`], but a missing file falls back to defaults plus
/// environment overrides. A file that exists but fails to parse is still an error.
pub fn load_config_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }

    tracing::debug!(path = %path.display(), "config file not found, using defaults");
    let mut config = Config::default();
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}
