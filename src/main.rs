//! Application entrypoint and state wiring.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use file_ledger::config::{Cli, Config};
use file_ledger::{routes, storage, AppState};

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())
        .context("failed to load config")?
        .with_overrides(&cli);
    init_logging(&config.log.level);

    // 0) dirs
    let upload_dir = config.upload_dir();
    storage::ensure_dir(&upload_dir).context("failed to create upload dir")?;

    // 1) load (or initialize) the ledger
    let ledger_path = config.ledger_path();
    let ledger = storage::load_ledger(&ledger_path)
        .with_context(|| format!("failed to load ledger from {}", ledger_path.display()))?;
    info!(
        path = %ledger_path.display(),
        blocks = ledger.len(),
        "ledger ready"
    );

    // 2) shared state
    let state = AppState {
        ledger: Arc::new(Mutex::new(ledger)),
        ledger_path,
        upload_dir,
    };

    // 3) serve
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("invalid listen address {:?}", config.server.listen_addr))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "listening");
    axum::serve(listener, routes::router(state))
        .await
        .context("server error")?;
    Ok(())
}
