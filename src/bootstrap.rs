//! Project bootstrap: `relay init` and `relay doctor`.
//!
//! Both commands run a fixed list of independent steps. Each step checks
//! first, then acts, then reports; a failing step is reported and the rest
//! still run.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::agent::AgentClient;
use crate::config::{self, ENV_AGENT_API_URL, ENV_CALLBACK_URL};

/// Entries `relay init` guarantees are present in `.gitignore`.
pub const GITIGNORE_ENTRIES: &[&str] = &[".env", "target/", "*.log"];

const AGENT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepStatus {
    Created,
    Updated,
    Skipped(String),
    Ok(String),
    Failed(String),
}

impl StepStatus {
    pub fn is_failure(&self) -> bool {
        matches!(self, StepStatus::Failed(_))
    }
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Created => write!(f, "created"),
            StepStatus::Updated => write!(f, "updated"),
            StepStatus::Skipped(why) => write!(f, "skipped ({})", why),
            StepStatus::Ok(detail) => write!(f, "ok ({})", detail),
            StepStatus::Failed(why) => write!(f, "failed: {}", why),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub status: StepStatus,
}

impl StepReport {
    fn new(step: impl Into<String>, status: StepStatus) -> Self {
        Self {
            step: step.into(),
            status,
        }
    }
}

pub fn print_reports(reports: &[StepReport]) {
    println!("{:<28} STATUS", "STEP");
    for r in reports {
        println!("{:<28} {}", r.step, r.status);
    }
}

// ============ relay init ============

/// Template written to `config/relay.toml`.
const CONFIG_TEMPLATE: &str = include_str!("../config/relay.example.toml");

fn env_template(api_key_env: &str) -> String {
    format!(
        "# Local environment for the agent relay. Do not commit this file.\n\
         {}=http://localhost:8000\n\
         {}=https://example.com/agent-replies\n\
         {}=\n",
        ENV_AGENT_API_URL, ENV_CALLBACK_URL, api_key_env
    )
}

fn write_file_step(path: &Path, content: &str, force: bool) -> StepStatus {
    let existed = path.exists();
    if existed && !force {
        return StepStatus::Skipped("exists".to_string());
    }

    let result = (|| -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;
        Ok(())
    })();

    match result {
        Ok(()) if existed => StepStatus::Updated,
        Ok(()) => StepStatus::Created,
        Err(e) => StepStatus::Failed(format!("{:#}", e)),
    }
}

/// Appends any of [`GITIGNORE_ENTRIES`] not already listed. Idempotent.
pub fn ensure_gitignore(path: &Path) -> Result<StepStatus> {
    let existed = path.exists();
    let existing = if existed {
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?
    } else {
        String::new()
    };

    let present: Vec<&str> = existing.lines().map(str::trim).collect();
    let missing: Vec<&str> = GITIGNORE_ENTRIES
        .iter()
        .copied()
        .filter(|entry| !present.contains(entry))
        .collect();

    if missing.is_empty() {
        return Ok(StepStatus::Skipped("up to date".to_string()));
    }

    let mut content = existing.clone();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for entry in &missing {
        content.push_str(entry);
        content.push('\n');
    }
    fs::write(path, content).with_context(|| format!("writing {}", path.display()))?;

    Ok(if existed {
        StepStatus::Updated
    } else {
        StepStatus::Created
    })
}

/// Scaffolds `config/relay.toml`, `.env` and `.gitignore` under `dir`.
pub fn run_init(dir: &Path, force: bool) -> Vec<StepReport> {
    let config_path = dir.join("config").join("relay.toml");
    let env_path = dir.join(".env");
    let gitignore_path = dir.join(".gitignore");

    let mut reports = Vec::new();

    reports.push(StepReport::new(
        "config/relay.toml",
        write_file_step(&config_path, CONFIG_TEMPLATE, force),
    ));

    // .env holds secrets; never overwrite it, even with --force.
    let api_key_env = config::Config::default().agent.api_key_env;
    reports.push(StepReport::new(
        ".env",
        write_file_step(&env_path, &env_template(&api_key_env), false),
    ));

    let gitignore = ensure_gitignore(&gitignore_path)
        .unwrap_or_else(|e| StepStatus::Failed(format!("{:#}", e)));
    reports.push(StepReport::new(".gitignore", gitignore));

    for r in &reports {
        if r.status.is_failure() {
            tracing::warn!(step = %r.step, status = %r.status, "init step failed");
        } else {
            tracing::debug!(step = %r.step, status = %r.status, "init step done");
        }
    }

    reports
}

// ============ relay doctor ============

/// Best-effort view of the config for checks that do not need it to be
/// valid: the file parsed without validation, else the defaults.
fn unvalidated_config(config_path: &Path) -> config::Config {
    let mut cfg = fs::read_to_string(config_path)
        .ok()
        .and_then(|content| config::parse_config(&content).ok())
        .unwrap_or_default();
    cfg.apply_env_overrides();
    cfg
}

fn check_api_key(key_env: &str) -> StepStatus {
    match std::env::var(key_env) {
        Ok(v) if !v.trim().is_empty() => StepStatus::Ok(format!("{} set", key_env)),
        _ => StepStatus::Failed(format!("{} is not set", key_env)),
    }
}

/// Checks the local setup. Returns one report per check.
///
/// A config that fails to load or validate is reported under `config`;
/// the API key check still runs, and the agent check is skipped.
pub async fn run_doctor(config_path: &Path) -> Vec<StepReport> {
    let mut reports = Vec::new();

    let config = match config::load_config_or_default(config_path) {
        Ok(cfg) => {
            let detail = if config_path.exists() {
                config_path.display().to_string()
            } else {
                format!("{} not found, using defaults", config_path.display())
            };
            reports.push(StepReport::new("config", StepStatus::Ok(detail)));
            reports.push(StepReport::new(
                "callback url",
                StepStatus::Ok(cfg.callback.url.clone()),
            ));
            Some(cfg)
        }
        Err(e) => {
            reports.push(StepReport::new(
                "config",
                StepStatus::Failed(format!("{:#}", e)),
            ));
            None
        }
    };

    let key_env = match &config {
        Some(cfg) => cfg.agent.api_key_env.clone(),
        None => unvalidated_config(config_path).agent.api_key_env,
    };
    reports.push(StepReport::new("model api key", check_api_key(&key_env)));

    let agent_status = match &config {
        Some(cfg) => match AgentClient::new(cfg) {
            Ok(client) => match client.probe(AGENT_PROBE_TIMEOUT).await {
                Ok(status) => {
                    StepStatus::Ok(format!("{} answered {}", cfg.agent.base_url, status))
                }
                Err(e) => StepStatus::Failed(e.to_string()),
            },
            Err(e) => StepStatus::Failed(format!("{:#}", e)),
        },
        None => StepStatus::Skipped("config is invalid".to_string()),
    };
    reports.push(StepReport::new("agent api", agent_status));

    reports
}

/// Resolves the directory `relay init` writes into.
pub fn init_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    match dir {
        Some(d) => Ok(d),
        None => std::env::current_dir().context("resolving current directory"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_writes_all_artifacts() {
        let tmp = TempDir::new().unwrap();
        let reports = run_init(tmp.path(), false);

        assert_eq!(reports.len(), 3);
        assert!(reports.iter().all(|r| r.status == StepStatus::Created));

        let cfg = config::parse_config(
            &fs::read_to_string(tmp.path().join("config/relay.toml")).unwrap(),
        )
        .unwrap();
        cfg.validate().unwrap();

        let env = fs::read_to_string(tmp.path().join(".env")).unwrap();
        assert!(env.contains("RELAY_AGENT_API_URL="));
        assert!(env.contains("MISTRAL_API_KEY="));
    }

    #[test]
    fn test_init_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        run_init(tmp.path(), false);
        let second = run_init(tmp.path(), false);
        assert!(second
            .iter()
            .all(|r| matches!(r.status, StepStatus::Skipped(_))));

        let gitignore = fs::read_to_string(tmp.path().join(".gitignore")).unwrap();
        assert_eq!(gitignore.matches(".env").count(), 1);
    }

    #[test]
    fn test_force_rewrites_config_but_not_env() {
        let tmp = TempDir::new().unwrap();
        run_init(tmp.path(), false);
        fs::write(tmp.path().join(".env"), "SECRET=1\n").unwrap();

        let reports = run_init(tmp.path(), true);
        assert_eq!(reports[0].status, StepStatus::Updated);
        assert!(matches!(reports[1].status, StepStatus::Skipped(_)));
        assert_eq!(
            fs::read_to_string(tmp.path().join(".env")).unwrap(),
            "SECRET=1\n"
        );
    }

    #[test]
    fn test_gitignore_appends_missing_entries() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".gitignore");
        fs::write(&path, "node_modules/\n.env").unwrap();

        assert_eq!(ensure_gitignore(&path).unwrap(), StepStatus::Updated);
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "node_modules/\n.env\ntarget/\n*.log\n");
    }

    #[test]
    fn test_gitignore_empty_file_is_updated_not_created() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join(".gitignore");
        fs::write(&path, "").unwrap();

        assert_eq!(ensure_gitignore(&path).unwrap(), StepStatus::Updated);
        assert_eq!(fs::read_to_string(&path).unwrap(), ".env\ntarget/\n*.log\n");
    }

    #[tokio::test]
    async fn test_doctor_keeps_checking_after_invalid_config() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("relay.toml");
        fs::write(
            &path,
            r#"[agent]
timeout_secs = 0
api_key_env = "RELAY_DOCTOR_TEST_KEY"

[callback]
url = "https://hooks.example.com/replies"
"#,
        )
        .unwrap();

        let reports = run_doctor(&path).await;
        let steps: Vec<&str> = reports.iter().map(|r| r.step.as_str()).collect();
        assert_eq!(steps, vec!["config", "model api key", "agent api"]);

        assert!(reports[0].status.is_failure());
        assert!(reports[0].status.to_string().contains("timeout_secs"));
        assert_eq!(
            reports[1].status,
            StepStatus::Failed("RELAY_DOCTOR_TEST_KEY is not set".to_string())
        );
        assert!(matches!(reports[2].status, StepStatus::Skipped(_)));
    }
}
