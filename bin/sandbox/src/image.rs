use bytes::Bytes;
use codenire_client::entities::image::ImageConfig;
use serde::{Deserialize, Serialize};

/// A template bound to its image build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltImage {
  #[serde(flatten)]
  pub config: ImageConfig,

  /// First repo tag reported by the engine after a successful
  /// build. Templates without it stay out of the warm pool.
  pub image_id: Option<String>,

  /// Engine tag the image is built under:
  /// `codenire_play/<templateId>`.
  pub tag: String,

  /// Staged build context (tar of the template directory). Not
  /// persisted; re-archived from the manifest root when missing.
  #[serde(skip)]
  pub context: Bytes,
}

/// A live container leased (or leasable) from the warm pool.
#[derive(Debug, Clone)]
pub struct StartedContainer {
  pub container_id: String,
  pub image: BuiltImage,
  /// Present iff an ephemeral database was provisioned for this
  /// container.
  pub db_name: Option<String>,
}
