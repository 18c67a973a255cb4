//! Decides whether a manifest applies to the local node.

use std::collections::BTreeMap;

use super::types::Manifest;

/// Returns true if `manifest` targets the node identified by `local_id` / `local_labels`.
///
/// Selectors combine with OR:
/// - a manifest with no node selector and no labels matches every node
/// - a node selector equal to `local_id` matches
/// - any label key present locally matches, when the manifest value is empty or
///   equal to the local value
///
/// A match brings every assembly of the manifest into scope.
pub fn matches(manifest: &Manifest, local_id: &str, local_labels: &BTreeMap<String, String>) -> bool {
  if manifest.is_wildcard() {
    return true;
  }

  if manifest.node_id() == Some(local_id) {
    return true;
  }

  manifest
    .label_selector
    .iter()
    .any(|(key, wanted)| match local_labels.get(key) {
      Some(actual) => wanted.is_empty() || wanted == actual,
      None => false,
    })
}
