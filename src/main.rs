use std::env;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facegate::api::{self, AppState};
use facegate::config::{self, Config, PLACEHOLDER_API_KEY};
use facegate::{AccessLog, Db};
use log::{info, warn};

#[derive(Parser)]
#[command(name = "facegate")]
#[command(version, about = "Face identity matching service")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server
    Serve {
        /// Config file path (defaults to the system config)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Delete access log entries older than the retention window
    PruneLogs {
        /// Override the configured retention window in days
        #[arg(long)]
        days: Option<i64>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
    /// Open config file in editor
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => {
            let cfg = config::load_config(config.as_deref())?;
            serve(cfg).await
        }
        Commands::PruneLogs { days, config } => {
            let cfg = config::load_config(config.as_deref())?;
            prune_logs(&cfg, days)
        }
        Commands::Config => open_config(),
    }
}

async fn serve(cfg: Config) -> Result<()> {
    if cfg.api_key == PLACEHOLDER_API_KEY {
        warn!("api_key is still the placeholder value; set a real shared secret");
    }

    let db = Arc::new(Db::open(Path::new(&cfg.db_path))?);
    let addr: SocketAddr = format!("{}:{}", cfg.host, cfg.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", cfg.host, cfg.port))?;
    let state = Arc::new(AppState::new(cfg, db));
    let router = api::build_router(state);

    info!("listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, router).await.context("serving")?;
    Ok(())
}

fn prune_logs(cfg: &Config, days: Option<i64>) -> Result<()> {
    let days = days.unwrap_or(cfg.log_retention_days);
    let db = Arc::new(Db::open(Path::new(&cfg.db_path))?);
    let audit = AccessLog::new(db);

    let deleted = audit.prune_older_than(chrono::Duration::days(days))?;
    info!("pruned {deleted} access log entries older than {days} days");
    Ok(())
}

fn open_config() -> Result<()> {
    let config_path = config::CONFIG_PATH.as_os_str();
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
