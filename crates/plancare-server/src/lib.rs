//! Configuration and router assembly for the plancare server binary.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use axum::Router;
use config::{ConfigBuilder, ConfigError, builder::DefaultState};
use plancare_api::AppState;
use plancare_core::{
  CommissionAccrual, WorkflowSettings, identity::IdentityProvider, step::StepPolicy,
  store::BrokerageStore,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml` and
/// `PLANCARE_*` environment variables.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  #[serde(default = "default_store_path")]
  pub store_path:         PathBuf,
  /// Shared secret for the payment webhook. Empty disables the webhook.
  #[serde(default)]
  pub webhook_secret:     String,
  #[serde(default = "default_step_timeout_ms")]
  pub step_timeout_ms:    u64,
  #[serde(default = "default_read_retries")]
  pub read_retries:       u32,
  #[serde(default)]
  pub commission_accrual: CommissionAccrual,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/plancare/plancare.db") }

fn default_step_timeout_ms() -> u64 { 5_000 }

fn default_read_retries() -> u32 { 2 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// Timeouts, retries and accrual mode for the workflows.
  pub fn workflow_settings(&self) -> WorkflowSettings {
    WorkflowSettings {
      step:    StepPolicy {
        timeout: Duration::from_millis(self.step_timeout_ms),
        read_retries: self.read_retries,
        ..StepPolicy::default()
      },
      accrual: self.commission_accrual,
    }
  }
}

/// Read `path` (if it exists) overlaid with `PLANCARE_*` variables.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
  from_sources(
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("PLANCARE")),
  )
}

fn from_sources(builder: ConfigBuilder<DefaultState>) -> Result<ServerConfig, ConfigError> {
  builder.build()?.try_deserialize()
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API router with request tracing.
pub fn app<S, P>(state: AppState<S, P>) -> Router
where
  S: BrokerageStore + 'static,
  P: IdentityProvider + 'static,
{
  plancare_api::router(state).layer(TraceLayer::new_for_http())
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
