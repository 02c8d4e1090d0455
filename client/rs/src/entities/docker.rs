use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// Minimal view of an engine container, as returned by the container
/// list endpoint.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct ContainerListItem {
  /// Engine-issued container id.
  pub id: String,
  /// Primary container name, without the leading slash.
  pub name: String,
  /// The image (tag or id) the container was created from.
  pub image: String,
}
