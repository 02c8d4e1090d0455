use std::sync::OnceLock;

use clap::Parser;
use codenire_client::entities::{
  config::{CliArgs, Env, SandboxConfig},
  logger::{LogConfig, LogLevel},
};

pub fn sandbox_args() -> &'static CliArgs {
  static SANDBOX_ARGS: OnceLock<CliArgs> = OnceLock::new();
  SANDBOX_ARGS.get_or_init(CliArgs::parse)
}

pub fn sandbox_config() -> &'static SandboxConfig {
  static SANDBOX_CONFIG: OnceLock<SandboxConfig> =
    OnceLock::new();
  SANDBOX_CONFIG.get_or_init(|| {
    let env: Env = envy::from_env()
      .expect("failed to parse sandbox environment");
    let args = sandbox_args();
    let defaults = SandboxConfig::default();

    SandboxConfig {
      dockerfiles_path: args
        .dockerfiles_path
        .clone()
        .or(env.sandbox_dockerfiles_path)
        .unwrap_or(defaults.dockerfiles_path),
      templates_path: env
        .sandbox_templates_path
        .unwrap_or(defaults.templates_path),
      replica_count: args
        .replica_count
        .or(env.sandbox_replica_count)
        .unwrap_or(defaults.replica_count),
      isolated: args
        .isolated
        .or(env.sandbox_isolated)
        .unwrap_or(defaults.isolated),
      isolated_network: env
        .sandbox_isolated_network
        .unwrap_or(defaults.isolated_network),
      isolated_gateway: env
        .sandbox_isolated_gateway
        .unwrap_or(defaults.isolated_gateway),
      isolated_postgres_dsn: env
        .sandbox_isolated_postgres_dsn
        .unwrap_or(defaults.isolated_postgres_dsn),
      isolated_postgres_network: env
        .sandbox_isolated_postgres_network
        .unwrap_or(defaults.isolated_postgres_network),
      dev: args.dev.or(env.sandbox_dev).unwrap_or(defaults.dev),
      logging: LogConfig {
        level: args
          .log_level
          .map(LogLevel::from)
          .or(env.sandbox_logging_level)
          .unwrap_or(defaults.logging.level),
        stdio: env
          .sandbox_logging_stdio
          .unwrap_or(defaults.logging.stdio),
        pretty: env
          .sandbox_logging_pretty
          .unwrap_or(defaults.logging.pretty),
        location: defaults.logging.location,
        ansi: env
          .sandbox_logging_ansi
          .unwrap_or(defaults.logging.ansi),
      },
    }
  })
}
