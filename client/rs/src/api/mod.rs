//! Wire contracts for the submission API (consumers -> orchestrator
//! surface) and the sandbox execution API (orchestrator -> runner
//! inside a leased container).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use typeshare::typeshare;

/// `POST /run` on the submission surface.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRequest {
  pub template_id: String,
  pub args: String,
  /// Files to materialize in the container, path -> contents.
  pub files: HashMap<String, String>,
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct SubmissionResponse {
  pub events: Vec<SubmissionEvent>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub errors: Option<Vec<String>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub meta: Option<SubmissionMeta>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time: Option<String>,
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct SubmissionEvent {
  pub kind: String,
  pub message: String,
}

/// Carries the recognized `version` alongside arbitrary string-keyed
/// extension fields.
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
pub struct SubmissionMeta {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub version: Option<String>,
  #[serde(flatten)]
  pub additional: HashMap<String, serde_json::Value>,
}

/// `POST /run` on a per-container sandbox runner.
#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SandboxRequest {
  pub sand_id: String,
  pub args: String,
  /// Binary files in a tar archive, base64 encoded.
  pub binary: String,
}

#[typeshare]
#[derive(
  Debug, Clone, Default, PartialEq, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SandboxResponse {
  pub exit_code: i32,
  #[serde(with = "base64_bytes")]
  pub stdout: Vec<u8>,
  #[serde(with = "base64_bytes")]
  pub stderr: Vec<u8>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

/// Byte fields travel as base64 strings on the wire.
mod base64_bytes {
  use data_encoding::BASE64;
  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S: Serializer>(
    bytes: &[u8],
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&BASE64.encode(bytes))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    let encoded = String::deserialize(deserializer)?;
    BASE64
      .decode(encoded.as_bytes())
      .map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn submission_meta_keeps_extension_fields() {
    let json = r#"{
      "events": [{ "kind": "stdout", "message": "hi" }],
      "meta": { "version": "1.0", "buildTime": "80ms" }
    }"#;
    let response: SubmissionResponse =
      serde_json::from_str(json).unwrap();
    let meta = response.meta.as_ref().unwrap();
    assert_eq!(meta.version.as_deref(), Some("1.0"));
    assert_eq!(
      meta.additional.get("buildTime").unwrap(),
      &serde_json::json!("80ms")
    );

    let round =
      serde_json::to_value(&response).unwrap();
    assert_eq!(round["meta"]["version"], "1.0");
    assert_eq!(round["meta"]["buildTime"], "80ms");
  }

  #[test]
  fn sandbox_response_bytes_travel_as_base64() {
    let response = SandboxResponse {
      exit_code: 0,
      stdout: b"hello".to_vec(),
      stderr: Vec::new(),
      error: None,
    };
    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["stdout"], "aGVsbG8=");

    let parsed: SandboxResponse =
      serde_json::from_value(json).unwrap();
    assert_eq!(parsed, response);
  }

  #[test]
  fn submission_request_uses_camel_case() {
    let request = SubmissionRequest {
      template_id: "py".into(),
      args: String::new(),
      files: Default::default(),
    };
    let json = serde_json::to_value(&request).unwrap();
    assert!(json.get("templateId").is_some());
  }
}
