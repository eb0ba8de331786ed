//! # askroom
//!
//! Live Q&A room server binary: loads config, opens the store and serves
//! HTTP + WebSocket until Ctrl-C or SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use askroom_server::config::{self, AppConfig};
use askroom_server::shutdown::{self, ShutdownCoordinator};
use askroom_store::{SqliteStore, Store};
use askroom_telemetry::{LogFormat, TelemetryConfig};
use clap::Parser;
use tracing::info;

/// Live Q&A room server.
#[derive(Parser, Debug)]
#[command(name = "askroom", version, about = "Live Q&A room server")]
struct Cli {
    /// JSON config file, deep-merged over the defaults.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file. Without one everything stays in memory.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Default log level (RUST_LOG still wins).
    #[arg(long)]
    log_level: Option<String>,

    /// Emit JSON log lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn apply(self, config: &mut AppConfig) {
        if let Some(host) = self.host {
            config.server.host = host;
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(path) = self.database {
            config.database_path = Some(path);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        if self.log_json {
            config.log_json = true;
        }
    }
}

fn telemetry_config(config: &AppConfig) -> Result<TelemetryConfig> {
    let log_level = askroom_telemetry::parse_level(&config.log_level)
        .with_context(|| format!("invalid log level: {}", config.log_level))?;
    Ok(TelemetryConfig {
        log_level,
        module_levels: Vec::new(),
        format: if config.log_json { LogFormat::Json } else { LogFormat::Pretty },
    })
}

fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
    let store = match &config.database_path {
        Some(path) => SqliteStore::open(path)
            .with_context(|| format!("failed to open database at {}", path.display()))?,
        None => {
            info!("no database path configured, using in-memory store");
            SqliteStore::in_memory().context("failed to open in-memory database")?
        }
    };
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut app_config = config::load_config(cli.config.as_deref()).context("failed to load config")?;
    cli.apply(&mut app_config);
    app_config.server.validate()?;

    askroom_telemetry::init_telemetry(&telemetry_config(&app_config)?)?;

    let store = open_store(&app_config)?;
    let coordinator = ShutdownCoordinator::new();
    let handle = askroom_server::start(&app_config.server, store, &coordinator)
        .await
        .with_context(|| format!("failed to bind {}", app_config.server.bind_addr()))?;
    info!(port = handle.port(), "askroom ready");

    shutdown::wait_for_signal().await;
    info!("shutting down");
    coordinator
        .graceful_shutdown(vec![handle.into_task()], app_config.server.shutdown_timeout())
        .await;
    Ok(())
}
