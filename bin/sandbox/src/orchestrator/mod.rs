use std::{path::Path, sync::Arc, time::Duration};

use anyhow::{Context, anyhow, bail};
use bollard::models::{ContainerCreateBody, HostConfig};
use bytes::Bytes;
use cache::CloneCache;
use codenire_client::entities::{
  config::SandboxConfig,
  image::{IMAGE_TAG_PREFIX, ImageConfig, image_tag},
};
use futures_util::StreamExt;
use tokio::sync::{RwLock, watch};
use tokio_util::sync::CancellationToken;

use crate::{
  docker::DockerClient,
  helpers::{rand_hex, strip_image_name},
  image::{BuiltImage, StartedContainer},
  manifest,
  postgres::{self, SandboxDatabase},
  storage::Storage,
};

pub mod pool;

use pool::Handoff;

const NETWORK_NONE: &str = "none";
const ISOLATED_RUNTIME: &str = "runsc";
const RUN_RETRY_DELAY: Duration = Duration::from_secs(10);

/// Composes the manifest loader, registry, image builder, warm pool
/// and the ephemeral-DB provisioner behind one facade.
pub struct SandboxOrchestrator<S> {
  docker: DockerClient,
  storage: S,
  config: SandboxConfig,
  /// Concurrency bound for image builds and the kill sweep.
  workers: usize,

  /// Staged and built images, in manifest order.
  images: RwLock<Vec<BuiltImage>>,
  /// Template id -> rendezvous channel of ready containers.
  channels: CloneCache<String, Arc<Handoff<StartedContainer>>>,
  /// Raised for the duration of a kill sweep. Producers block on it
  /// instead of feeding channels that are about to be dropped.
  kill_signal: watch::Sender<bool>,
}

impl<S: Storage + Send + Sync + 'static> SandboxOrchestrator<S> {
  pub fn new(
    storage: S,
    config: SandboxConfig,
  ) -> anyhow::Result<SandboxOrchestrator<S>> {
    let docker = DockerClient::connect()?;
    let workers = std::thread::available_parallelism()
      .map(usize::from)
      .unwrap_or(1);
    let (kill_signal, _) = watch::channel(false);
    Ok(SandboxOrchestrator {
      docker,
      storage,
      config,
      workers,
      images: RwLock::new(Vec::new()),
      channels: Default::default(),
      kill_signal,
    })
  }

  /// Loads the registry, falling back to a manifest walk of the
  /// configured root on first start. Duplicate template ids are a
  /// fatal configuration error.
  pub async fn prepare(&self) -> anyhow::Result<()> {
    match self.storage.load_templates().await {
      Ok(templates) if !templates.is_empty() => {
        *self.images.write().await = templates;
        return Ok(());
      }
      Ok(_) => {}
      Err(e) => {
        warn!("failed to load stored templates | {e:#}")
      }
    }

    let configs = manifest::parse_config_files(
      &self.config.dockerfiles_path,
    )?;
    for config in configs {
      let template_id = config.template_id.clone();
      if let Err(e) = self.prebuild_image(config).await {
        warn!(
          "build staging of template {template_id} failed | {e:#}"
        );
      }
    }

    let images = self.images.read().await;
    if let Err(e) = self.storage.save_templates(&images).await {
      warn!("failed to persist templates | {e:#}");
    }
    Ok(())
  }

  /// Builds every staged image in parallel, bounded by the logical
  /// CPU count, then brings up the warm pools. Build failures are
  /// per-image; failed templates stay out of the pool.
  pub async fn boot(self: &Arc<Self>) -> anyhow::Result<()> {
    let count = self.images.read().await.len();
    futures_util::stream::iter(0..count)
      .for_each_concurrent(self.workers, |idx| async move {
        if let Err(e) = self.build_image(idx).await {
          warn!("image build failed | {e:#}");
        }
      })
      .await;

    self.start_containers().await;
    Ok(())
  }

  /// The canonical template set, as persisted in the registry.
  pub async fn get_templates(&self) -> Vec<BuiltImage> {
    match self.storage.load_templates().await {
      Ok(templates) => templates,
      Err(e) => {
        warn!("failed to load templates | {e:#}");
        Vec::new()
      }
    }
  }

  pub async fn get_template_by_image_id(
    &self,
    id: &str,
  ) -> anyhow::Result<BuiltImage> {
    let templates = self.storage.load_templates().await?;
    templates
      .into_iter()
      .find(|t| t.image_id.as_deref() == Some(id))
      .context("template not found")
  }

  /// Registers a new template. Fails if the id is already taken.
  pub async fn add_template(
    &self,
    mut config: ImageConfig,
  ) -> anyhow::Result<()> {
    manifest::normalize_config(&mut config)
      .context("invalid template config")?;
    let mut templates = self.storage.load_templates().await?;
    if templates
      .iter()
      .any(|t| t.config.template_id == config.template_id)
    {
      bail!("template already exists");
    }
    let tag = image_tag(&config.template_id);
    templates.push(BuiltImage {
      config,
      image_id: None,
      tag,
      context: Bytes::new(),
    });
    self.storage.save_templates(&templates).await
  }

  /// Replaces the stored config of an existing template.
  pub async fn update_template(
    &self,
    id: &str,
    mut config: ImageConfig,
  ) -> anyhow::Result<()> {
    manifest::normalize_config(&mut config)
      .context("invalid template config")?;
    let mut templates = self.storage.load_templates().await?;
    let Some(slot) = templates
      .iter_mut()
      .find(|t| t.config.template_id == id)
    else {
      bail!("template not found");
    };
    slot.config = config;
    self.storage.save_templates(&templates).await
  }

  pub async fn delete_template(
    &self,
    id: &str,
  ) -> anyhow::Result<()> {
    self.storage.delete_template(id).await
  }

  /// Leases a ready container, suspending until a producer hands
  /// one off or `cancel` fires. A cancelled lease never takes a
  /// container out of the pool.
  pub async fn get_container(
    &self,
    cancel: &CancellationToken,
    template_id: &str,
  ) -> anyhow::Result<StartedContainer> {
    let channel = self.channel(template_id).await;
    let mut waiter = channel.waiter()?;
    let leased = tokio::select! {
      handoff = &mut waiter => Some(handoff),
      _ = cancel.cancelled() => None,
    };
    match leased {
      Some(handoff) => {
        handoff.context("container pool was reset")
      }
      None => {
        waiter.close();
        // A hand-off that raced the cancellation was never leased;
        // reclaim it.
        if let Ok(container) = waiter.try_recv()
          && let Err(e) = self.kill_container(container).await
        {
          warn!(
            "failed to reclaim container after cancelled lease | {e:#}"
          );
        }
        Err(anyhow!("lease cancelled"))
      }
    }
  }

  /// Stops every container carrying the orchestrator's image prefix
  /// and resets the pool channels. Producer tasks survive the sweep
  /// and resume once the signal clears.
  pub async fn kill_all(&self) {
    let _ = self.kill_signal.send(true);

    match self.docker.list_containers().await {
      Ok(containers) => {
        futures_util::stream::iter(containers)
          .for_each_concurrent(self.workers, |container| {
            async move {
              if !container.image.starts_with(IMAGE_TAG_PREFIX)
              {
                return;
              }
              info!(
                "stopping container {} (image: {})",
                container.name, container.image
              );
              if let Err(e) =
                self.docker.stop_container(&container.id).await
              {
                warn!(
                  "stop container {} failed | {e:#}",
                  container.id
                );
              }
            }
          })
          .await;
      }
      Err(e) => warn!("get container list failed | {e:#}"),
    }

    self.channels.clear().await;
    let _ = self.kill_signal.send(false);
    info!("killed all sandbox containers");
  }

  /// Stops a leased container and always drops its attached
  /// database, even when the stop fails.
  pub async fn kill_container(
    &self,
    container: StartedContainer,
  ) -> anyhow::Result<()> {
    let stopped = self
      .docker
      .stop_container(&container.container_id)
      .await;
    if let Some(name) = &container.db_name {
      self.remove_sandbox_db(name).await;
    }
    stopped
  }

  /// Stages a template for build: packages its directory as the tar
  /// build context and records the pending image.
  async fn prebuild_image(
    &self,
    config: ImageConfig,
  ) -> anyhow::Result<()> {
    if !config.enabled {
      return Ok(());
    }
    let tag = image_tag(&config.template_id);
    let context = archive_build_context(
      &self.config.dockerfiles_path.join(&config.template_id),
    )?;
    self.images.write().await.push(BuiltImage {
      config,
      image_id: None,
      tag,
      context,
    });
    Ok(())
  }

  async fn build_image(&self, idx: usize) -> anyhow::Result<()> {
    let (template_id, tag, mut context) = {
      let images = self.images.read().await;
      let image = images
        .get(idx)
        .context("staged image index out of range")?;
      (
        image.config.template_id.clone(),
        image.tag.clone(),
        image.context.clone(),
      )
    };

    // Templates restored from storage carry no staged archive.
    if context.is_empty() {
      context = archive_build_context(
        &self.config.dockerfiles_path.join(&template_id),
      )?;
    }

    self
      .docker
      .build_image(&tag, context, self.config.dev)
      .await
      .with_context(|| format!("error building image {tag}"))?;

    let info = self.docker.inspect_image(&tag).await?;
    let repo_tag = info
      .repo_tags
      .unwrap_or_default()
      .into_iter()
      .next()
      .with_context(|| {
        format!("tags not found for {template_id}")
      })?;

    self.images.write().await[idx].image_id = Some(repo_tag);
    Ok(())
  }

  /// Spawns `replica_count` producer tasks per built template.
  async fn start_containers(self: &Arc<Self>) {
    let ready: Vec<BuiltImage> = self
      .images
      .read()
      .await
      .iter()
      .filter(|image| image.image_id.is_some())
      .cloned()
      .collect();

    let names: Vec<&str> = ready
      .iter()
      .map(|image| image.config.template_id.as_str())
      .collect();
    info!("starting warm pools for: {}", names.join(","));

    for image in ready {
      for _ in 0..self.config.replica_count {
        let orchestrator = self.clone();
        let image = image.clone();
        tokio::spawn(async move {
          orchestrator.producer(image).await;
        });
      }
    }
  }

  /// One warm-pool slot: keeps a fresh container ready for its
  /// template, forever. A kill sweep drops the pooled containers
  /// but never the producers.
  async fn producer(&self, image: BuiltImage) {
    let mut kill = self.kill_signal.subscribe();
    loop {
      // Suspend while a kill sweep is in progress.
      if kill.wait_for(|killed| !*killed).await.is_err() {
        return;
      }

      let container = match self.run_container(&image).await {
        Ok(container) => container,
        Err(e) => {
          debug!(
            "run container for {} failed, retrying | {e:#}",
            image.config.template_id
          );
          tokio::time::sleep(RUN_RETRY_DELAY).await;
          continue;
        }
      };

      // The mapping may have been swapped by a kill sweep; always
      // pick up the current channel.
      let channel =
        self.channel(&image.config.template_id).await;

      let mut ready = container;
      loop {
        tokio::select! {
          waiter = channel.next_waiter() => match waiter {
            Some(waiter) => match waiter.send(ready) {
              Ok(()) => break,
              // Consumer gave up first; serve the next one.
              Err(returned) => ready = returned,
            },
            None => {
              self.reclaim(ready).await;
              break;
            }
          },
          _ = async { kill.wait_for(|killed| *killed).await.ok(); } => {
            // Pool reset: reclaim the held container and re-block
            // on the outer loop until the sweep finishes.
            self.reclaim(ready).await;
            break;
          }
        }
      }
    }
  }

  async fn reclaim(&self, container: StartedContainer) {
    if let Err(e) = self.kill_container(container).await {
      debug!("failed to reclaim pooled container | {e:#}");
    }
  }

  async fn channel(
    &self,
    template_id: &str,
  ) -> Arc<Handoff<StartedContainer>> {
    self
      .channels
      .get_or_insert_default(&template_id.to_string())
      .await
  }

  /// Starts one sandbox container for a built image, wiring
  /// networks and an ephemeral database per the template's
  /// capabilities.
  async fn run_container(
    &self,
    image: &BuiltImage,
  ) -> anyhow::Result<StartedContainer> {
    let image_id = image
      .image_id
      .clone()
      .context("image was never built")?;
    let memory_limit = image
      .config
      .container_options
      .memory_limit
      .context("template has no memory limit")?;

    let mut network_mode = NETWORK_NONE.to_string();
    let mut env = Vec::new();

    if image.config.is_support_package {
      if self.config.isolated_network.is_empty() {
        bail!(
          "support package template {} requires an isolated network",
          image.config.template_id
        );
      }
      network_mode = self.config.isolated_network.clone();
      env.push(format!(
        "HTTP_PROXY={}",
        self.config.isolated_gateway
      ));
      env.push(format!(
        "HTTPS_PROXY={}",
        self.config.isolated_gateway
      ));
    }

    let postgres_enabled = self.postgres_applies(&image.config);
    let mut db_name = None;
    if postgres_enabled {
      let db = SandboxDatabase::generate();
      postgres::create_database(
        &self.config.isolated_postgres_dsn,
        &db,
      )
      .await
      .context("db provisioning failed")?;
      env.extend(db.env());
      db_name = Some(db.name);

      if network_mode == NETWORK_NONE {
        network_mode =
          self.config.isolated_postgres_network.clone();
      }
    }

    match self
      .create_and_start(
        &image_id,
        memory_limit,
        network_mode,
        env,
        postgres_enabled,
      )
      .await
    {
      Ok(container_id) => Ok(StartedContainer {
        container_id,
        image: image.clone(),
        db_name,
      }),
      Err(e) => {
        // Never leak a database nobody will hold credentials to.
        if let Some(name) = &db_name {
          self.remove_sandbox_db(name).await;
        }
        Err(e)
      }
    }
  }

  async fn create_and_start(
    &self,
    image_id: &str,
    memory_limit: i64,
    network_mode: String,
    env: Vec<String>,
    postgres_enabled: bool,
  ) -> anyhow::Result<String> {
    let host_config = HostConfig {
      runtime: self.runtime(),
      auto_remove: Some(true),
      network_mode: Some(network_mode.clone()),
      memory: Some(memory_limit),
      memory_swap: Some(0),
      ..Default::default()
    };
    let body = ContainerCreateBody {
      image: Some(image_id.to_string()),
      cmd: Some(vec![
        "tail".to_string(),
        "-f".to_string(),
        "/dev/null".to_string(),
      ]),
      env: Some(env),
      host_config: Some(host_config),
      ..Default::default()
    };

    let name = format!(
      "play_run_{}_{}",
      strip_image_name(image_id),
      rand_hex(8)
    );
    let container_id =
      self.docker.create_container(&name, body).await?;
    self.docker.start_container(&container_id).await?;

    // Second interface for templates whose primary network is
    // already claimed by something other than postgres.
    if network_mode != NETWORK_NONE
      && postgres_enabled
      && network_mode != self.config.isolated_postgres_network
    {
      self
        .docker
        .connect_network(
          &self.config.isolated_postgres_network,
          &container_id,
        )
        .await?;
    }

    Ok(container_id)
  }

  fn runtime(&self) -> Option<String> {
    if self.config.isolated {
      Some(ISOLATED_RUNTIME.to_string())
    } else {
      None
    }
  }

  fn postgres_applies(&self, config: &ImageConfig) -> bool {
    !self.config.isolated_postgres_dsn.is_empty()
      && !self.config.isolated_postgres_network.is_empty()
      && config.is_postgres_connected()
  }

  async fn remove_sandbox_db(&self, name: &str) {
    if self.config.isolated_postgres_dsn.is_empty()
      || name.is_empty()
    {
      return;
    }
    if let Err(e) = postgres::drop_database(
      &self.config.isolated_postgres_dsn,
      name,
    )
    .await
    {
      warn!("failed to drop sandbox database {name} | {e:#}");
    }
  }
}

fn archive_build_context(dir: &Path) -> anyhow::Result<Bytes> {
  let mut builder = tar::Builder::new(Vec::new());
  builder.append_dir_all("", dir).with_context(|| {
    format!("failed to archive build context {dir:?}")
  })?;
  let archive = builder
    .into_inner()
    .context("failed to finish build context archive")?;
  Ok(Bytes::from(archive))
}
