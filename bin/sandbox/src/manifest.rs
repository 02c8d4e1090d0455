use std::{
  collections::HashMap,
  fs,
  path::{Path, PathBuf},
};

use anyhow::{Context, bail};
use codenire_client::entities::image::{
  BUILT_IN_PROVIDER, DEFAULT_ACTION_NAME, DEFAULT_MEMORY_LIMIT,
  DEFAULT_VERSION, DEFAULT_WORKDIR, EXTERNAL_COMMANDS_MODE_ALL,
  ImageConfig,
};

pub const CONFIG_FILE_NAME: &str = "config.json";

/// Parses one template manifest per subdirectory of `root`.
///
/// Subdirectories without a readable, valid `config.json` are
/// skipped with a log. Duplicate template ids across the accepted
/// set are a fatal configuration error.
pub fn parse_config_files(
  root: &Path,
) -> anyhow::Result<Vec<ImageConfig>> {
  let mut dirs: Vec<PathBuf> = fs::read_dir(root)
    .with_context(|| {
      format!("failed to list template root {root:?}")
    })?
    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
    .filter(|path| path.is_dir())
    .collect();
  dirs.sort();

  let mut accepted = Vec::new();

  for dir in dirs {
    let config_path = dir.join(CONFIG_FILE_NAME);
    let content = match fs::read(&config_path) {
      Ok(content) => content,
      Err(e) => {
        warn!("skipping template dir {dir:?} | {e}");
        continue;
      }
    };
    let mut config: ImageConfig =
      match serde_json::from_slice(&content) {
        Ok(config) => config,
        Err(e) => {
          warn!("skipping template dir {dir:?}: bad manifest | {e}");
          continue;
        }
      };
    if let Err(e) = normalize_config(&mut config) {
      warn!("skipping template {} | {e:#}", config.template_id);
      continue;
    }
    accepted.push(config);
  }

  let duplicates = duplicates(&accepted);
  if !duplicates.is_empty() {
    bail!(
      "found duplicates of config names: {}",
      duplicates.join(", ")
    );
  }

  Ok(accepted)
}

/// Applies loader defaults and resolves the default action. The
/// registry only ever holds configs that passed through here.
pub fn normalize_config(
  config: &mut ImageConfig,
) -> anyhow::Result<()> {
  if config.actions.is_empty() {
    bail!("manifest declares no actions");
  }

  config.provider = BUILT_IN_PROVIDER.to_string();
  if config.version.is_empty() {
    config.version = DEFAULT_VERSION.to_string();
  }
  if config.workdir.is_empty() {
    config.workdir = DEFAULT_WORKDIR.to_string();
  }
  if config.container_options.memory_limit.is_none() {
    config.container_options.memory_limit =
      Some(DEFAULT_MEMORY_LIMIT);
  }

  for action in config.actions.values_mut() {
    if action.enable_external_commands.is_empty() {
      action.enable_external_commands =
        EXTERNAL_COMMANDS_MODE_ALL.to_string();
    }
  }

  if !config.actions.contains_key(DEFAULT_ACTION_NAME) {
    // Sorted names keep the promotion deterministic; manifest maps
    // carry no meaningful order.
    let mut names: Vec<&String> =
      config.actions.keys().collect();
    names.sort();
    let promoted = names
      .iter()
      .find(|name| config.actions[name.as_str()].is_default)
      .or_else(|| names.first())
      .map(|name| name.to_string());
    match promoted {
      Some(name) => {
        let action = config.actions[name.as_str()].clone();
        config
          .actions
          .insert(DEFAULT_ACTION_NAME.to_string(), action);
      }
      None => bail!("no default action resolvable"),
    }
  }

  Ok(())
}

fn duplicates(configs: &[ImageConfig]) -> Vec<String> {
  let mut counts: HashMap<&str, usize> = HashMap::new();
  for config in configs {
    *counts.entry(config.template_id.as_str()).or_default() += 1;
  }
  let mut duplicated: Vec<String> = counts
    .into_iter()
    .filter(|(_, count)| *count > 1)
    .map(|(name, _)| name.to_string())
    .collect();
  duplicated.sort();
  duplicated
}

#[cfg(test)]
mod tests {
  use super::*;

  fn write_manifest(root: &Path, dir: &str, manifest: &str) {
    let dir = root.join(dir);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join(CONFIG_FILE_NAME), manifest).unwrap();
  }

  #[test]
  fn single_template_gets_loader_defaults() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
      root.path(),
      "py",
      r#"{
        "templateId": "py",
        "actions": { "run": { "name": "run", "isDefault": true } }
      }"#,
    );

    let configs = parse_config_files(root.path()).unwrap();
    assert_eq!(configs.len(), 1);
    let config = &configs[0];
    assert_eq!(config.template_id, "py");
    assert_eq!(config.provider, BUILT_IN_PROVIDER);
    assert_eq!(config.version, DEFAULT_VERSION);
    assert_eq!(config.workdir, DEFAULT_WORKDIR);
    assert_eq!(
      config.container_options.memory_limit,
      Some(DEFAULT_MEMORY_LIMIT)
    );
    let run = &config.actions["run"];
    assert_eq!(
      run.enable_external_commands,
      EXTERNAL_COMMANDS_MODE_ALL
    );
    assert_eq!(&config.actions[DEFAULT_ACTION_NAME], run);
  }

  #[test]
  fn default_action_is_lexicographically_first() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
      root.path(),
      "multi",
      r#"{
        "templateId": "multi",
        "actions": {
          "b": { "name": "b" },
          "a": { "name": "a" }
        }
      }"#,
    );

    let configs = parse_config_files(root.path()).unwrap();
    let actions = &configs[0].actions;
    assert_eq!(actions[DEFAULT_ACTION_NAME], actions["a"]);
  }

  #[test]
  fn marked_default_wins_over_first_action() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
      root.path(),
      "marked",
      r#"{
        "templateId": "marked",
        "actions": {
          "a": { "name": "a" },
          "b": { "name": "b", "isDefault": true }
        }
      }"#,
    );

    let configs = parse_config_files(root.path()).unwrap();
    let actions = &configs[0].actions;
    assert_eq!(actions[DEFAULT_ACTION_NAME], actions["b"]);
  }

  #[test]
  fn reserved_default_entry_is_kept() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
      root.path(),
      "reserved",
      r#"{
        "templateId": "reserved",
        "actions": {
          "default": { "name": "explicit" },
          "a": { "name": "a", "isDefault": true }
        }
      }"#,
    );

    let configs = parse_config_files(root.path()).unwrap();
    assert_eq!(
      configs[0].actions[DEFAULT_ACTION_NAME].name,
      "explicit"
    );
  }

  #[test]
  fn duplicate_template_ids_are_fatal() {
    let root = tempfile::tempdir().unwrap();
    let manifest = r#"{
      "templateId": "go",
      "actions": { "run": { "name": "run" } }
    }"#;
    write_manifest(root.path(), "go-one", manifest);
    write_manifest(root.path(), "go-two", manifest);

    let err = parse_config_files(root.path()).unwrap_err();
    assert!(err.to_string().contains("go"));
  }

  #[test]
  fn invalid_manifests_are_skipped() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(root.path(), "broken", "{ not json");
    write_manifest(
      root.path(),
      "ok",
      r#"{
        "templateId": "ok",
        "actions": { "run": { "name": "run" } }
      }"#,
    );
    fs::create_dir_all(root.path().join("empty")).unwrap();
    fs::write(root.path().join("stray-file"), "x").unwrap();

    let configs = parse_config_files(root.path()).unwrap();
    assert_eq!(configs.len(), 1);
    assert_eq!(configs[0].template_id, "ok");
  }

  #[test]
  fn zero_action_manifests_are_rejected() {
    let root = tempfile::tempdir().unwrap();
    write_manifest(
      root.path(),
      "empty",
      r#"{ "templateId": "empty", "actions": {} }"#,
    );

    let configs = parse_config_files(root.path()).unwrap();
    assert!(configs.is_empty());
  }

  #[test]
  fn templates_are_returned_in_directory_order() {
    let root = tempfile::tempdir().unwrap();
    for id in ["zig", "ada"] {
      write_manifest(
        root.path(),
        id,
        &format!(
          r#"{{
            "templateId": "{id}",
            "actions": {{ "run": {{ "name": "run" }} }}
          }}"#
        ),
      );
    }

    let configs = parse_config_files(root.path()).unwrap();
    let ids: Vec<&str> = configs
      .iter()
      .map(|config| config.template_id.as_str())
      .collect();
    assert_eq!(ids, ["ada", "zig"]);
  }
}
