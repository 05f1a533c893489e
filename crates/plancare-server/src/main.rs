//! plancare server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, and serves the JSON API over HTTP.
//!
//! # Admin bootstrap
//!
//! Admins cannot sign themselves up. Provision one with:
//!
//! ```
//! cargo run -p plancare-server -- --create-admin ops@example.com
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use plancare_api::AppState;
use plancare_core::{Brokerage, plan::PlanCatalog};
use plancare_server::{expand_tilde, load_config};
use plancare_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "plancare subscription brokerage server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  /// Create an admin account for EMAIL with a password read from stdin, then exit.
  #[arg(long, value_name = "EMAIL")]
  create_admin: Option<String>,
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

  let server_cfg = load_config(&cli.config)
    .with_context(|| format!("failed to load configuration from {:?}", cli.config))?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(parent) = store_path.parent()
    && !parent.as_os_str().is_empty()
  {
    tokio::fs::create_dir_all(parent)
      .await
      .with_context(|| format!("failed to create {parent:?}"))?;
  }

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  let brokerage = Brokerage::new(
    Arc::new(store.clone()),
    PlanCatalog::standard(),
    server_cfg.workflow_settings(),
  );

  if let Some(email) = cli.create_admin {
    let password = read_password()?;
    let session = brokerage
      .create_admin(&store, &email, &password)
      .await
      .context("failed to create admin account")?;
    println!("created admin {} ({})", session.email(), session.uid());
    return Ok(());
  }

  if server_cfg.webhook_secret.is_empty() {
    tracing::warn!("webhook_secret is empty; payment notices will be rejected");
  }

  let state = AppState {
    brokerage,
    identity: Arc::new(store),
    webhook_secret: Arc::from(server_cfg.webhook_secret.as_str()),
  };

  let app = plancare_server::app(state);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  print!("Password: ");
  io::stdout().flush().ok();
  let mut line = String::new();
  io::stdin().lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
