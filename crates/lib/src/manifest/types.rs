//! Desired-state document types.
//!
//! The [`ManifestList`] is the single document every node converges on. It is
//! replaced wholesale by Apply/Update and by the synchronizer, never patched.
//!
//! # Versioning
//!
//! `updated` is the only version marker. It is a wall-clock timestamp stamped by
//! whichever node received the mutating call; a node adopts a peer's document
//! only when the peer's `updated` is strictly later than its own.
//!
//! # Example
//!
//! ```json
//! {
//!   "manifests": [
//!     {
//!       "labelSelector": { "env": "prod" },
//!       "assemblies": [
//!         { "image": "registry/app:v1", "requires": ["registry/runtime:v3"], "parameters": { "port": "8080" } }
//!       ]
//!     }
//!   ],
//!   "updated": "2026-01-01T00:00:00Z"
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while loading a manifest list from disk.
#[derive(Debug, Error)]
pub enum ManifestError {
  #[error("failed to read manifest list {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse manifest list {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: serde_json::Error,
  },
}

/// The full desired-state document for the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
  #[serde(default)]
  pub manifests: Vec<Manifest>,
  #[serde(default = "unix_epoch")]
  pub updated: DateTime<Utc>,
}

fn unix_epoch() -> DateTime<Utc> {
  DateTime::<Utc>::UNIX_EPOCH
}

impl Default for ManifestList {
  fn default() -> Self {
    Self::new(Vec::new())
  }
}

impl ManifestList {
  /// Create a list that has not been stamped yet.
  pub fn new(manifests: Vec<Manifest>) -> Self {
    Self {
      manifests,
      updated: unix_epoch(),
    }
  }

  /// Load a manifest list from a JSON file.
  ///
  /// Any `updated` value in the file is kept as-is; the receiving agent stamps
  /// the document again when it is applied.
  pub fn from_file(path: &Path) -> Result<Self, ManifestError> {
    let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.display().to_string(),
      source,
    })?;
    serde_json::from_str(&content).map_err(|source| ManifestError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  /// Stamp the document with a new version.
  pub fn stamp(&mut self, now: DateTime<Utc>) {
    self.updated = now;
  }

  /// Strict last-write-wins comparison against the local copy.
  ///
  /// Equal timestamps are not newer, so identical versions never trigger a write.
  pub fn is_newer_than(&self, current: Option<&ManifestList>) -> bool {
    match current {
      Some(current) => self.updated > current.updated,
      None => true,
    }
  }

  /// Number of assemblies across all manifests, dependencies excluded.
  pub fn assembly_count(&self) -> usize {
    self.manifests.iter().map(|m| m.assemblies.len()).sum()
  }
}

/// A selector paired with the assemblies to apply when it matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
  /// Exact node id this manifest targets.
  #[serde(default, alias = "nodeId", skip_serializing_if = "Option::is_none")]
  pub node_selector: Option<String>,

  /// Label requirements. An empty value only requires the key to be present.
  #[serde(default, alias = "labels", skip_serializing_if = "BTreeMap::is_empty")]
  pub label_selector: BTreeMap<String, String>,

  #[serde(default)]
  pub assemblies: Vec<Assembly>,
}

impl Manifest {
  /// A manifest with no selector at all matches every node.
  pub fn is_wildcard(&self) -> bool {
    self.node_id().is_none() && self.label_selector.is_empty()
  }

  /// The node selector, with an empty string treated as absent.
  pub fn node_id(&self) -> Option<&str> {
    self.node_selector.as_deref().filter(|id| !id.is_empty())
  }
}

/// An installable unit referenced by a content-addressable image reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assembly {
  #[serde(alias = "imageReference")]
  pub image: String,

  /// Image references installed before this assembly. Resolved one level deep.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub requires: Vec<String>,

  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub parameters: BTreeMap<String, String>,
}

impl Assembly {
  pub fn new(image: impl Into<String>) -> Self {
    Self {
      image: image.into(),
      ..Default::default()
    }
  }

  /// Declared dependencies in order, with duplicates removed.
  pub fn requires(&self) -> Vec<&str> {
    let mut seen = HashSet::new();
    self
      .requires
      .iter()
      .map(String::as_str)
      .filter(|image| !image.is_empty() && seen.insert(*image))
      .collect()
  }
}
