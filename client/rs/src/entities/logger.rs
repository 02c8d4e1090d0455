use serde::{Deserialize, Serialize};
use typeshare::typeshare;

#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
  /// Minimum level emitted. Default: `info`.
  #[serde(default)]
  pub level: LogLevel,

  /// Default: `standard`.
  #[serde(default)]
  pub stdio: StdioLogMode,

  /// Use the multi-line pretty format. Default: `false`.
  #[serde(default)]
  pub pretty: bool,

  /// Include the emitting module in log lines. Default: `false`.
  #[serde(default)]
  pub location: bool,

  /// Color the stdio output. Default: `true`.
  #[serde(default = "default_ansi")]
  pub ansi: bool,
}

impl Default for LogConfig {
  fn default() -> Self {
    LogConfig {
      level: Default::default(),
      stdio: Default::default(),
      pretty: false,
      location: false,
      ansi: default_ansi(),
    }
  }
}

fn default_ansi() -> bool {
  true
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Error,
  Warn,
  #[default]
  Info,
  Debug,
  Trace,
}

impl From<LogLevel> for tracing::Level {
  fn from(level: LogLevel) -> Self {
    match level {
      LogLevel::Error => tracing::Level::ERROR,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Trace => tracing::Level::TRACE,
    }
  }
}

impl From<tracing::Level> for LogLevel {
  fn from(level: tracing::Level) -> Self {
    if level == tracing::Level::ERROR {
      LogLevel::Error
    } else if level == tracing::Level::WARN {
      LogLevel::Warn
    } else if level == tracing::Level::DEBUG {
      LogLevel::Debug
    } else if level == tracing::Level::TRACE {
      LogLevel::Trace
    } else {
      LogLevel::Info
    }
  }
}

#[typeshare]
#[derive(
  Debug,
  Clone,
  Copy,
  Default,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}
