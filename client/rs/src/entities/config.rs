//! # Configuring the Codenire Sandbox daemon
//!
//! The sandbox configuration is passed two ways:
//! 1. Command line args ([CliArgs])
//! 2. Environment variables ([Env])
//!
//! The final [SandboxConfig] is built by combining both, with
//! [CliArgs] taking priority over the environment, and documented
//! defaults filling anything left unset.

use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::entities::logger::{LogConfig, LogLevel, StdioLogMode};

/// # Sandbox Command Line Arguments.
///
/// A help manual can be printed using `sandbox --help`.
#[derive(Parser)]
#[command(name = "sandbox", author, about, version)]
pub struct CliArgs {
  /// Override the template manifest root directory.
  #[arg(long)]
  pub dockerfiles_path: Option<PathBuf>,

  /// Override the idle replica count kept warm per template.
  #[arg(long)]
  pub replica_count: Option<usize>,

  /// Run sandbox containers under the hardened runtime (runsc).
  #[arg(long)]
  pub isolated: Option<bool>,

  /// Pass image build logs through to the process logs.
  #[arg(long)]
  pub dev: Option<bool>,

  /// Configure the logging level: error, warn, info, debug, trace.
  /// If passed, will override any other log_level set.
  #[arg(long)]
  pub log_level: Option<tracing::Level>,
}

/// # Sandbox Environment Variables
///
/// Passed in the traditional `UPPER_SNAKE_CASE` format. Equivalent
/// parameters passed in [CliArgs] take priority.
#[derive(Deserialize)]
pub struct Env {
  /// Override `dockerfiles_path`
  pub sandbox_dockerfiles_path: Option<PathBuf>,
  /// Override `templates_path`
  pub sandbox_templates_path: Option<PathBuf>,
  /// Override `replica_count`
  pub sandbox_replica_count: Option<usize>,
  /// Override `isolated`
  pub sandbox_isolated: Option<bool>,
  /// Override `isolated_network`
  pub sandbox_isolated_network: Option<String>,
  /// Override `isolated_gateway`
  pub sandbox_isolated_gateway: Option<String>,
  /// Override `isolated_postgres_dsn`
  pub sandbox_isolated_postgres_dsn: Option<String>,
  /// Override `isolated_postgres_network`
  pub sandbox_isolated_postgres_network: Option<String>,
  /// Override `dev`
  pub sandbox_dev: Option<bool>,
  /// Override `logging.level`
  pub sandbox_logging_level: Option<LogLevel>,
  /// Override `logging.stdio`
  pub sandbox_logging_stdio: Option<StdioLogMode>,
  /// Override `logging.pretty`
  pub sandbox_logging_pretty: Option<bool>,
  /// Override `logging.ansi`
  pub sandbox_logging_ansi: Option<bool>,
}

/// # Sandbox Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
  /// Root directory holding one build-context subdirectory per
  /// template, each with a `config.json` manifest.
  /// Default: `./dockerfiles`
  #[serde(default = "default_dockerfiles_path")]
  pub dockerfiles_path: PathBuf,

  /// Path of the template registry file.
  /// Default: `./templates.json`
  #[serde(default = "default_templates_path")]
  pub templates_path: PathBuf,

  /// How many idle replica containers to keep warm per template.
  /// Default: `1`
  #[serde(default = "default_replica_count")]
  pub replica_count: usize,

  /// Run sandbox containers under the hardened runtime (runsc).
  /// Default: `false`
  #[serde(default)]
  pub isolated: bool,

  /// Egress network attached to support-package containers.
  #[serde(default)]
  pub isolated_network: String,

  /// Proxy gateway injected as `HTTP_PROXY` / `HTTPS_PROXY` into
  /// support-package containers.
  #[serde(default)]
  pub isolated_gateway: String,

  /// Admin DSN of the Postgres server backing ephemeral sandbox
  /// databases. Postgres wiring is disabled while this or
  /// `isolated_postgres_network` is empty.
  #[serde(default)]
  pub isolated_postgres_dsn: String,

  /// Network shared with the Postgres server.
  #[serde(default)]
  pub isolated_postgres_network: String,

  /// Pass image build logs through to the process logs.
  /// Default: `false`
  #[serde(default)]
  pub dev: bool,

  /// Logging configuration.
  #[serde(default)]
  pub logging: LogConfig,
}

impl Default for SandboxConfig {
  fn default() -> Self {
    SandboxConfig {
      dockerfiles_path: default_dockerfiles_path(),
      templates_path: default_templates_path(),
      replica_count: default_replica_count(),
      isolated: false,
      isolated_network: String::new(),
      isolated_gateway: String::new(),
      isolated_postgres_dsn: String::new(),
      isolated_postgres_network: String::new(),
      dev: false,
      logging: Default::default(),
    }
  }
}

impl SandboxConfig {
  /// Copy of the config safe to echo into logs.
  pub fn sanitized(&self) -> SandboxConfig {
    SandboxConfig {
      isolated_postgres_dsn: empty_or_redacted(
        &self.isolated_postgres_dsn,
      ),
      ..self.clone()
    }
  }
}

fn empty_or_redacted(src: &str) -> String {
  if src.is_empty() {
    String::new()
  } else {
    String::from("##############")
  }
}

fn default_dockerfiles_path() -> PathBuf {
  "./dockerfiles".into()
}

fn default_templates_path() -> PathBuf {
  "./templates.json".into()
}

fn default_replica_count() -> usize {
  1
}
