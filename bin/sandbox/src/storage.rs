use std::path::PathBuf;

use anyhow::{Context, bail};
use tokio::sync::Mutex;

use crate::image::BuiltImage;

/// Durable registry of templates. The stored set is the canonical
/// view of what can run; callers never mutate orchestrator state
/// directly.
pub trait Storage {
  async fn load_templates(
    &self,
  ) -> anyhow::Result<Vec<BuiltImage>>;
  /// Replaces the whole stored set.
  async fn save_templates(
    &self,
    templates: &[BuiltImage],
  ) -> anyhow::Result<()>;
  async fn delete_template(
    &self,
    id: &str,
  ) -> anyhow::Result<()>;
}

/// Registry backed by a single JSON file. A missing file loads as
/// the empty set.
pub struct FileStorage {
  path: PathBuf,
  /// Serializes read-modify-write cycles on the registry file.
  lock: Mutex<()>,
}

impl FileStorage {
  pub fn new(path: PathBuf) -> FileStorage {
    FileStorage {
      path,
      lock: Mutex::new(()),
    }
  }

  async fn read(&self) -> anyhow::Result<Vec<BuiltImage>> {
    match tokio::fs::read(&self.path).await {
      Ok(content) => serde_json::from_slice(&content)
        .with_context(|| {
          format!(
            "failed to parse template registry at {:?}",
            self.path
          )
        }),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
        Ok(Vec::new())
      }
      Err(e) => Err(e).with_context(|| {
        format!(
          "failed to read template registry at {:?}",
          self.path
        )
      }),
    }
  }

  async fn write(
    &self,
    templates: &[BuiltImage],
  ) -> anyhow::Result<()> {
    let json = serde_json::to_vec_pretty(templates)
      .context("failed to serialize template registry")?;
    tokio::fs::write(&self.path, json).await.with_context(|| {
      format!(
        "failed to write template registry at {:?}",
        self.path
      )
    })
  }
}

impl Storage for FileStorage {
  async fn load_templates(
    &self,
  ) -> anyhow::Result<Vec<BuiltImage>> {
    let _guard = self.lock.lock().await;
    self.read().await
  }

  async fn save_templates(
    &self,
    templates: &[BuiltImage],
  ) -> anyhow::Result<()> {
    let _guard = self.lock.lock().await;
    self.write(templates).await
  }

  async fn delete_template(
    &self,
    id: &str,
  ) -> anyhow::Result<()> {
    let _guard = self.lock.lock().await;
    let mut templates = self.read().await?;
    let before = templates.len();
    templates.retain(|t| t.config.template_id != id);
    if templates.len() == before {
      bail!("template not found");
    }
    self.write(&templates).await
  }
}

#[cfg(test)]
mod tests {
  use codenire_client::entities::image::{
    ImageActionConfig, ImageConfig, image_tag,
  };

  use super::*;

  fn built_image(id: &str) -> BuiltImage {
    let mut config = ImageConfig {
      template_id: id.to_string(),
      ..Default::default()
    };
    config.actions.insert(
      "run".to_string(),
      ImageActionConfig {
        name: "run".to_string(),
        ..Default::default()
      },
    );
    BuiltImage {
      config,
      image_id: None,
      tag: image_tag(id),
      context: Default::default(),
    }
  }

  fn storage(dir: &tempfile::TempDir) -> FileStorage {
    FileStorage::new(dir.path().join("templates.json"))
  }

  #[tokio::test]
  async fn missing_file_loads_as_empty_set() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    assert!(storage.load_templates().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn save_then_load_is_identity() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    let templates =
      vec![built_image("py"), built_image("go")];

    storage.save_templates(&templates).await.unwrap();
    let loaded = storage.load_templates().await.unwrap();
    assert_eq!(loaded, templates);

    // Saving what was loaded leaves the store unchanged.
    storage.save_templates(&loaded).await.unwrap();
    assert_eq!(storage.load_templates().await.unwrap(), loaded);
  }

  #[tokio::test]
  async fn delete_removes_exactly_one_template() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    storage
      .save_templates(&[built_image("py"), built_image("go")])
      .await
      .unwrap();

    storage.delete_template("py").await.unwrap();
    let remaining = storage.load_templates().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].config.template_id, "go");
  }

  #[tokio::test]
  async fn delete_of_unknown_template_fails() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    let err =
      storage.delete_template("nope").await.unwrap_err();
    assert!(err.to_string().contains("not found"));
  }
}
