//! # Agent Relay CLI (`relay`)
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `relay serve` | Start the relay HTTP server |
//! | `relay send "<message>"` | Forward one message and print the acknowledgement |
//! | `relay test` | Forward the diagnostic message and print the full result |
//! | `relay init` | Scaffold `config/relay.toml`, `.env` and `.gitignore` |
//! | `relay doctor` | Check configuration, API key and agent reachability |
//!
//! ## Examples
//!
//! ```bash
//! relay init
//! relay doctor --config ./config/relay.toml
//! relay serve --bind 127.0.0.1:5000
//! relay send "How do I reset my password?" --user-id alice
//! ```

use agent_relay::{bootstrap, config, relay::Relay};
use agent_relay::models::{InboundMessage, ResponseMode};

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Agent relay: forwards webhook messages to a hosted conversational agent.
#[derive(Parser)]
#[command(name = "relay", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// When the file does not exist, `serve`, `send` and `test` run on
    /// defaults plus `RELAY_*` environment overrides.
    #[arg(long, global = true, default_value = "./config/relay.toml")]
    config: PathBuf,

    /// Enable debug logging (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay HTTP server.
    Serve {
        /// Address to bind, overriding `[server].bind`.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Forward a single message and print the acknowledgement as JSON.
    Send {
        /// Message text.
        message: String,

        /// User id to forward with (defaults to `[relay].default_user_id`).
        #[arg(long)]
        user_id: Option<String>,

        /// Extra metadata as a JSON object.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Forward the configured diagnostic message and print the full result.
    Test,

    /// Scaffold config, `.env` and `.gitignore`.
    ///
    /// Existing files are left alone unless `--force` is given; `.env` is
    /// never overwritten.
    Init {
        /// Directory to scaffold into (defaults to the current directory).
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Overwrite an existing `config/relay.toml`.
        #[arg(long)]
        force: bool,
    },

    /// Check configuration, the model API key, and agent reachability.
    Doctor,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Init { dir, force } => {
            let dir = bootstrap::init_dir(dir)?;
            let reports = bootstrap::run_init(&dir, force);
            bootstrap::print_reports(&reports);
            if reports.iter().any(|r| r.status.is_failure()) {
                anyhow::bail!("init finished with failures");
            }
        }
        Commands::Doctor => {
            let reports = bootstrap::run_doctor(&cli.config).await;
            bootstrap::print_reports(&reports);
            if reports.iter().any(|r| r.status.is_failure()) {
                anyhow::bail!("doctor found problems");
            }
        }
        Commands::Serve { bind } => {
            let cfg = config::load_config_or_default(&cli.config)?;
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            agent_relay::server::run_server(cfg, &bind).await?;
        }
        Commands::Send {
            message,
            user_id,
            metadata,
        } => {
            let cfg = config::load_config_or_default(&cli.config)?;
            let metadata = metadata
                .map(|raw| serde_json::from_str(&raw))
                .transpose()
                .context("--metadata must be a JSON object")?;
            let relay = Relay::new(Arc::new(cfg))?;

            let inbound = InboundMessage {
                message: Some(message),
                user_id,
                metadata,
            };
            let request = relay.prepare(inbound, "cli")?;
            let result = relay.forward(request).await;
            let envelope = result.envelope(ResponseMode::Send, relay.callback_url());
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
        }
        Commands::Test => {
            let cfg = config::load_config_or_default(&cli.config)?;
            let relay = Relay::new(Arc::new(cfg))?;
            let envelope = relay.diagnose().await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            if !envelope.success {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
