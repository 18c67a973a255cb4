//! Node identity and convergence status.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Convergence state of a node.
///
/// Transitions: `Ok -> Updating -> {Ok | Failure}`, driven only by apply passes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeState {
  #[default]
  Ok,
  Updating,
  Failure,
}

impl NodeState {
  pub fn as_str(self) -> &'static str {
    match self {
      NodeState::Ok => "OK",
      NodeState::Updating => "UPDATING",
      NodeState::Failure => "FAILURE",
    }
  }
}

impl fmt::Display for NodeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStatus {
  pub state: NodeState,
  #[serde(default)]
  pub description: String,
}

impl NodeStatus {
  pub fn new(state: NodeState, description: impl Into<String>) -> Self {
    Self {
      state,
      description: description.into(),
    }
  }
}

/// What the membership service knows about a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
  pub id: String,
  pub address: String,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
}

impl NodeInfo {
  pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
    Self {
      id: id.into(),
      address: address.into(),
      labels: BTreeMap::new(),
    }
  }

  pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
    self.labels = labels;
    self
  }
}

/// One row of the `Nodes` answer.
///
/// Exactly one of `status` and `error` is set: peers that could not be queried
/// are still listed, with the reason in `error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
  pub id: String,
  pub address: String,
  #[serde(default)]
  pub labels: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub status: Option<NodeStatus>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
}

impl Node {
  pub fn reachable(info: NodeInfo, status: NodeStatus) -> Self {
    Self {
      id: info.id,
      address: info.address,
      labels: info.labels,
      status: Some(status),
      error: None,
    }
  }

  pub fn unreachable(info: NodeInfo, error: impl Into<String>) -> Self {
    Self {
      id: info.id,
      address: info.address,
      labels: info.labels,
      status: None,
      error: Some(error.into()),
    }
  }
}

/// Parse a `key=value` label. A bare `key` yields an empty value.
pub fn parse_label(raw: &str) -> (String, String) {
  match raw.split_once('=') {
    Some((key, value)) => (key.trim().to_string(), value.to_string()),
    None => (raw.trim().to_string(), String::new()),
  }
}

/// Parse a list of label flags into a label map. Later keys win.
pub fn parse_labels<I, S>(raw: I) -> BTreeMap<String, String>
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  raw
    .into_iter()
    .map(|item| parse_label(item.as_ref()))
    .filter(|(key, _)| !key.is_empty())
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn state_serializes_upper_case() {
    let status = NodeStatus::new(NodeState::Updating, "applying assembly a");
    let json = serde_json::to_string(&status).unwrap();
    assert_eq!(json, r#"{"state":"UPDATING","description":"applying assembly a"}"#);
  }

  #[test]
  fn default_status_is_ok() {
    let status = NodeStatus::default();
    assert_eq!(status.state, NodeState::Ok);
    assert!(status.description.is_empty());
  }

  #[test]
  fn parse_label_forms() {
    assert_eq!(parse_label("env=prod"), ("env".to_string(), "prod".to_string()));
    assert_eq!(parse_label("gpu"), ("gpu".to_string(), String::new()));
    assert_eq!(parse_label("k=a=b"), ("k".to_string(), "a=b".to_string()));
    assert_eq!(parse_label("empty="), ("empty".to_string(), String::new()));
  }

  #[test]
  fn parse_labels_skips_blank_keys() {
    let labels = parse_labels(["env=prod", "", "=x", "gpu"]);
    assert_eq!(labels.len(), 2);
    assert_eq!(labels["env"], "prod");
    assert_eq!(labels["gpu"], "");
  }

  #[test]
  fn unreachable_node_omits_status() {
    let node = Node::unreachable(NodeInfo::new("b", "10.0.0.2:9005"), "connection refused");
    let json = serde_json::to_value(&node).unwrap();
    assert!(json.get("status").is_none());
    assert_eq!(json["error"], "connection refused");
  }
}
