use anyhow::{Context, anyhow};
use bollard::Docker;
use bollard::models::{
  ContainerCreateBody, ContainerSummary, EndpointSettings,
  ImageInspect, NetworkConnectRequest,
};
use bollard::query_parameters::{
  BuildImageOptionsBuilder, CreateContainerOptionsBuilder,
  ListContainersOptionsBuilder, StartContainerOptions,
  StopContainerOptionsBuilder,
};
use bytes::Bytes;
use codenire_client::entities::docker::ContainerListItem;
use futures_util::StreamExt;

pub struct DockerClient {
  docker: Docker,
}

impl DockerClient {
  pub fn connect() -> anyhow::Result<DockerClient> {
    let docker = Docker::connect_with_defaults()
      .context("failed to connect to docker api")?;
    Ok(DockerClient { docker })
  }

  /// Builds `context` (a tar of the build-context directory) under
  /// `tag`, draining the progress stream. The recipe inside the
  /// context is always named `Dockerfile`.
  pub async fn build_image(
    &self,
    tag: &str,
    context: Bytes,
    dev: bool,
  ) -> anyhow::Result<()> {
    let options = BuildImageOptionsBuilder::new()
      .dockerfile("Dockerfile")
      .t(tag)
      .q(!dev)
      .rm(true)
      .build();

    let mut stream = self.docker.build_image(
      options,
      None,
      Some(bollard::body_full(context)),
    );
    while let Some(frame) = stream.next().await {
      let info =
        frame.context("image build stream failed")?;
      if let Some(error) = info.error {
        return Err(anyhow!("image build failed: {error}"));
      }
      if dev
        && let Some(line) = info.stream
        && !line.trim().is_empty()
      {
        debug!("[build {tag}] {}", line.trim_end());
      }
    }
    Ok(())
  }

  pub async fn inspect_image(
    &self,
    name: &str,
  ) -> anyhow::Result<ImageInspect> {
    self.docker.inspect_image(name).await.with_context(|| {
      format!("failed to inspect image {name}")
    })
  }

  pub async fn create_container(
    &self,
    name: &str,
    body: ContainerCreateBody,
  ) -> anyhow::Result<String> {
    let options =
      CreateContainerOptionsBuilder::new().name(name).build();
    let response = self
      .docker
      .create_container(Some(options), body)
      .await
      .context("create container failed")?;
    Ok(response.id)
  }

  pub async fn start_container(
    &self,
    id: &str,
  ) -> anyhow::Result<()> {
    self
      .docker
      .start_container(id, None::<StartContainerOptions>)
      .await
      .with_context(|| {
        format!("failed to start container {id}")
      })
  }

  /// Immediate stop (timeout 0).
  pub async fn stop_container(
    &self,
    id: &str,
  ) -> anyhow::Result<()> {
    let options =
      StopContainerOptionsBuilder::new().t(0).build();
    self
      .docker
      .stop_container(id, Some(options))
      .await
      .with_context(|| {
        format!("failed to stop container {id}")
      })
  }

  /// Lists all containers, stopped ones included.
  pub async fn list_containers(
    &self,
  ) -> anyhow::Result<Vec<ContainerListItem>> {
    let options =
      ListContainersOptionsBuilder::new().all(true).build();
    let containers = self
      .docker
      .list_containers(Some(options))
      .await
      .context("failed to list containers")?;
    Ok(containers.into_iter().map(convert_container).collect())
  }

  /// Attaches an additional network interface to a running
  /// container.
  pub async fn connect_network(
    &self,
    network: &str,
    container_id: &str,
  ) -> anyhow::Result<()> {
    self
      .docker
      .connect_network(
        network,
        NetworkConnectRequest {
          container: Some(container_id.to_string()),
          endpoint_config: Some(EndpointSettings::default()),
        },
      )
      .await
      .with_context(|| {
        format!(
          "failed to connect container {container_id} to network {network}"
        )
      })
  }
}

fn convert_container(
  container: ContainerSummary,
) -> ContainerListItem {
  ContainerListItem {
    id: container.id.unwrap_or_default(),
    name: container
      .names
      .unwrap_or_default()
      .into_iter()
      .next()
      .map(|name| name.trim_start_matches('/').to_string())
      .unwrap_or_default(),
    image: container.image.unwrap_or_default(),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn convert_container_takes_first_name_without_slash() {
    let summary = ContainerSummary {
      id: Some("abc123".to_string()),
      names: Some(vec![
        "/play_run_py_0011aabb".to_string(),
        "/alias".to_string(),
      ]),
      image: Some("codenire_play/py".to_string()),
      ..Default::default()
    };
    let item = convert_container(summary);
    assert_eq!(item.id, "abc123");
    assert_eq!(item.name, "play_run_py_0011aabb");
    assert_eq!(item.image, "codenire_play/py");
  }

  #[test]
  fn convert_container_tolerates_missing_fields() {
    let item = convert_container(ContainerSummary::default());
    assert_eq!(item, ContainerListItem::default());
  }
}
