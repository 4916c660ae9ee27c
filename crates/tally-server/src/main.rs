//! tally-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! contact store, and serves the identity API over HTTP.
//!
//! # Integrity repair
//!
//! To scan the store for broken links, fix them, and exit:
//!
//! ```
//! cargo run -p tally-server -- --repair
//! ```

mod settings;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use tally_core::IdentityResolver;
use tally_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Tally identity reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Run the integrity repair pass over the store and exit.
  #[arg(long)]
  repair: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let server_cfg = ServerConfig::load(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = server_cfg.resolved_store_path();
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let resolver = Arc::new(IdentityResolver::new(Arc::new(store)));

  // Maintenance mode: repair and exit.
  if cli.repair {
    let report = resolver.repair().await.context("repair pass failed")?;
    tracing::info!(
      scanned = report.scanned,
      violations = report.violations.len(),
      updated = report.updated,
      "repair complete"
    );
    return Ok(());
  }

  let app = tally_api::api_router(resolver).layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
