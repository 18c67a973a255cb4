use serde::{Deserialize, Serialize};

use crate::manifest::ManifestList;

/// Which mutating call a request arrived through.
///
/// Both share one contract; the distinction is kept so that fan-out replays
/// the same call on each peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
  Apply,
  Update,
}

impl Mutation {
  pub fn as_str(self) -> &'static str {
    match self {
      Mutation::Apply => "apply",
      Mutation::Update => "update",
    }
  }
}

/// Body of `Apply` and `Update`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
  pub manifest_list: ManifestList,
  #[serde(default)]
  pub force: bool,
  /// Whether the receiver forwards the document to its peers. Absent means
  /// "same as `force`".
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub propagate: Option<bool>,
}

impl ApplyRequest {
  pub fn new(manifest_list: ManifestList, force: bool) -> Self {
    Self {
      manifest_list,
      force,
      propagate: None,
    }
  }

  /// Request sent to a peer during fan-out: forced, never forwarded again.
  pub fn delivery(manifest_list: ManifestList) -> Self {
    Self {
      manifest_list,
      force: true,
      propagate: Some(false),
    }
  }

  pub fn propagates(&self) -> bool {
    self.propagate.unwrap_or(self.force)
  }
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
  pub error: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn propagate_defaults_to_force() {
    let list = ManifestList::default();
    assert!(!ApplyRequest::new(list.clone(), false).propagates());
    assert!(ApplyRequest::new(list.clone(), true).propagates());

    let delivery = ApplyRequest::delivery(list);
    assert!(delivery.force);
    assert!(!delivery.propagates());
  }

  #[test]
  fn request_wire_format() {
    let request: ApplyRequest = serde_json::from_str(
      r#"{"manifestList": {"manifests": [], "updated": "2024-01-01T00:00:00Z"}, "force": true}"#,
    )
    .unwrap();
    assert!(request.force);
    assert_eq!(request.propagate, None);

    let json = serde_json::to_value(ApplyRequest::delivery(request.manifest_list)).unwrap();
    assert_eq!(json["propagate"], false);
    assert!(json.get("manifestList").is_some());
  }
}
