use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Prefix carried by every image built by the orchestrator.
/// This prefix is the sole discriminator for the kill-all sweep.
pub const IMAGE_TAG_PREFIX: &str = "codenire_play/";

/// Reserved action name resolved when a caller does not name one.
pub const DEFAULT_ACTION_NAME: &str = "default";

pub const EXTERNAL_COMMANDS_MODE_ALL: &str = "all";

/// Recognized entry of [ImageConfig::connections].
pub const POSTGRES_CONNECTION: &str = "postgres";

pub const BUILT_IN_PROVIDER: &str = "built-in";
pub const DEFAULT_VERSION: &str = "1.0";
pub const DEFAULT_WORKDIR: &str = "/app_tmp";

/// 100 MiB.
pub const DEFAULT_MEMORY_LIMIT: i64 = 100 << 20;

/// The engine-visible tag for a template's image.
pub fn image_tag(template_id: &str) -> String {
  format!("{IMAGE_TAG_PREFIX}{template_id}")
}

/// Declarative description of one execution environment, parsed from
/// the `config.json` at the root of a template's build context.
#[typeshare]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
  /// Stable identifier, unique across the registry. Doubles as the
  /// build-context subdirectory name under the manifest root.
  pub template_id: String,

  #[serde(default)]
  pub description: String,

  /// Disabled templates are kept in the manifest tree but never
  /// built or pooled.
  #[serde(default = "default_enabled")]
  pub enabled: bool,

  /// Defaults to `1.0`.
  #[serde(default)]
  pub version: String,

  /// Set by the loader; `built-in` for templates discovered on disk.
  #[serde(default)]
  pub provider: String,

  /// Working directory inside the container. Defaults to `/app_tmp`.
  #[serde(default)]
  pub workdir: String,

  #[serde(default)]
  pub compile_cmd: String,

  #[serde(default)]
  pub run_cmd: String,

  #[serde(default)]
  pub script_options: ScriptOptions,

  #[serde(default)]
  pub options: ImageConfigOptions,

  #[serde(default)]
  pub container_options: ContainerOptions,

  /// Needs outbound network access through the egress proxy.
  #[serde(default)]
  pub is_support_package: bool,

  /// External services the container expects; `postgres` is
  /// recognized.
  #[serde(default)]
  pub connections: Vec<String>,

  /// Action name -> action config. Exactly one action resolves as
  /// the default after normalization.
  #[serde(default)]
  pub actions: IndexMap<String, ImageActionConfig>,
}

impl Default for ImageConfig {
  fn default() -> Self {
    ImageConfig {
      template_id: String::new(),
      description: String::new(),
      enabled: true,
      version: String::new(),
      provider: String::new(),
      workdir: String::new(),
      compile_cmd: String::new(),
      run_cmd: String::new(),
      script_options: Default::default(),
      options: Default::default(),
      container_options: Default::default(),
      is_support_package: false,
      connections: Vec::new(),
      actions: IndexMap::new(),
    }
  }
}

impl ImageConfig {
  pub fn is_postgres_connected(&self) -> bool {
    self
      .connections
      .iter()
      .any(|connection| connection == POSTGRES_CONNECTION)
  }
}

fn default_enabled() -> bool {
  true
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ImageActionConfig {
  #[serde(default)]
  pub name: String,

  /// Marks the action copied to the reserved `default` entry.
  #[serde(default)]
  pub is_default: bool,

  /// Defaults to `all`.
  #[serde(default)]
  pub enable_external_commands: String,

  #[serde(default)]
  pub compile_cmd: String,

  #[serde(default)]
  pub run_cmd: String,
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ScriptOptions {
  /// Where user-provided source is written inside the container.
  #[serde(default)]
  pub source_file: String,
}

/// Per-phase execution deadlines, in seconds.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfigOptions {
  pub compile_ttl: Option<i32>,
  pub run_ttl: Option<i32>,
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOptions {
  /// Hard memory cap in bytes. The loader defaults this to 100 MiB;
  /// the registry never accepts a template without it.
  pub memory_limit: Option<i64>,
}
