//! # linkwire
//!
//! Server binary: loads settings, opens the database and serves the HTTP and
//! WebSocket surface until ctrl-c.

#![deny(unsafe_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use linkwire_core::logging::{LogFormat, init_subscriber};
use linkwire_server::{LinkwireServer, OpenDirectory, ServerConfig};
use linkwire_settings::{LinkwireSettings, StoreSettings};
use linkwire_store::{ConnectionConfig, SqliteStore};
use tracing::{info, warn};

/// Database path selecting a private in-memory database.
const IN_MEMORY: &str = ":memory:";

/// linkwire connection server.
#[derive(Parser, Debug)]
#[command(name = "linkwire", about = "Connection network server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// `SQLite` database path, or `:memory:` (overrides settings).
    #[arg(long)]
    db_path: Option<String>,

    /// Settings file (default `~/.linkwire/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log filter when `RUST_LOG` is unset.
    #[arg(long)]
    log_level: Option<String>,

    /// `compact` or `json`.
    #[arg(long)]
    log_format: Option<String>,
}

impl Cli {
    fn load_settings(&self) -> Result<LinkwireSettings> {
        let path = self
            .config
            .clone()
            .unwrap_or_else(linkwire_settings::settings_path);
        let mut settings = linkwire_settings::load_settings_from_path(&path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?;
        self.apply(&mut settings)?;
        settings.validate().context("Invalid settings")?;
        Ok(settings)
    }

    fn apply(&self, settings: &mut LinkwireSettings) -> Result<()> {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(db_path) = &self.db_path {
            settings.store.db_path.clone_from(db_path);
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            let Some(parsed) = LogFormat::parse(format) else {
                bail!("unknown log format: {format}");
            };
            settings.logging.format = parsed;
        }
        Ok(())
    }
}

/// Where the database lives.
#[derive(Debug, PartialEq, Eq)]
enum Database {
    Memory,
    File(PathBuf),
}

/// Relative paths resolve against `home`.
fn resolve_database(db_path: &str, home: &Path) -> Database {
    if db_path == IN_MEMORY {
        return Database::Memory;
    }
    let path = PathBuf::from(db_path);
    if path.is_absolute() {
        Database::File(path)
    } else {
        Database::File(home.join(path))
    }
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    Ok(())
}

fn open_store(settings: &StoreSettings, home: &Path) -> Result<SqliteStore> {
    match resolve_database(&settings.db_path, home) {
        Database::Memory => {
            warn!("using an in-memory database, nothing will be persisted");
            SqliteStore::in_memory().context("Failed to open in-memory database")
        }
        Database::File(path) => {
            ensure_parent_dir(&path)?;
            let config = ConnectionConfig {
                pool_size: settings.pool_size,
                busy_timeout_ms: settings.busy_timeout_ms,
                ..ConnectionConfig::default()
            };
            info!(path = %path.display(), "opening database");
            SqliteStore::open(&path, &config)
                .with_context(|| format!("Failed to open database: {}", path.display()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = cli.load_settings()?;
    init_subscriber(&settings.logging.level, settings.logging.format);

    let store = Arc::new(open_store(&settings.store, &linkwire_settings::linkwire_home())?);
    let metrics = linkwire_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;

    let config = ServerConfig::from_settings(&settings);
    let shutdown_timeout = config.shutdown_timeout();
    let server = LinkwireServer::new(config, store, Arc::new(OpenDirectory), metrics);

    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    info!("linkwire listening on http://{addr}");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    info!("shutting down");
    server.shutdown().shutdown();
    if tokio::time::timeout(shutdown_timeout, handle).await.is_err() {
        warn!(?shutdown_timeout, "server did not stop in time");
    }
    Ok(())
}
