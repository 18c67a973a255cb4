//! Agent configuration.
//!
//! Loaded from a TOML file; every field is optional. Durations use humantime
//! syntax.
//!
//! ```toml
//! node_id = "node-1"
//! address = "10.0.0.1:9005"
//! data_dir = "/var/lib/terra"
//! image_source = "https://images.example.com"
//! sync_interval = "10s"
//!
//! [labels]
//! env = "prod"
//!
//! [[peers]]
//! id = "node-2"
//! address = "10.0.0.2:9005"
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::consts::{
  DEFAULT_ADDRESS, DEFAULT_CONNECT_TIMEOUT, DEFAULT_STORE_OPEN_TIMEOUT, DEFAULT_SYNC_INTERVAL, IMAGES_DIR,
  STORE_FILENAME,
};
use crate::node::NodeInfo;
use crate::platform::paths::default_data_dir;

#[derive(Debug, Error)]
pub enum ConfigError {
  #[error("failed to read config {path}: {source}")]
  Read {
    path: String,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to parse config {path}: {source}")]
  Parse {
    path: String,
    #[source]
    source: toml::de::Error,
  },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AgentConfig {
  pub node_id: String,
  pub address: String,
  pub labels: BTreeMap<String, String>,
  pub peers: Vec<NodeInfo>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub data_dir: Option<PathBuf>,
  /// Directory or `http(s)://` base URL holding image archives. Defaults to
  /// `images/` under the data directory.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub image_source: Option<String>,
  #[serde(with = "duration")]
  pub sync_interval: Duration,
  #[serde(with = "duration")]
  pub connect_timeout: Duration,
  #[serde(with = "duration")]
  pub store_open_timeout: Duration,
}

impl Default for AgentConfig {
  fn default() -> Self {
    Self {
      node_id: default_node_id(),
      address: DEFAULT_ADDRESS.to_string(),
      labels: BTreeMap::new(),
      peers: Vec::new(),
      data_dir: None,
      image_source: None,
      sync_interval: DEFAULT_SYNC_INTERVAL,
      connect_timeout: DEFAULT_CONNECT_TIMEOUT,
      store_open_timeout: DEFAULT_STORE_OPEN_TIMEOUT,
    }
  }
}

fn default_node_id() -> String {
  whoami::fallible::hostname().unwrap_or_else(|_| "unknown".to_string())
}

impl AgentConfig {
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
      path: path.display().to_string(),
      source,
    })?;
    Self::parse(&content).map_err(|source| ConfigError::Parse {
      path: path.display().to_string(),
      source,
    })
  }

  pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
    toml::from_str(content)
  }

  pub fn data_dir(&self) -> PathBuf {
    self.data_dir.clone().unwrap_or_else(default_data_dir)
  }

  pub fn store_path(&self) -> PathBuf {
    self.data_dir().join(STORE_FILENAME)
  }

  pub fn image_source(&self) -> String {
    match &self.image_source {
      Some(source) => source.clone(),
      None => self.data_dir().join(IMAGES_DIR).display().to_string(),
    }
  }

  pub fn local_node(&self) -> NodeInfo {
    NodeInfo::new(&self.node_id, &self.address).with_labels(self.labels.clone())
  }

  pub fn peer_nodes(&self) -> Vec<NodeInfo> {
    self.peers.clone()
  }
}

mod duration {
  use std::time::Duration;

  use serde::{Deserialize, Deserializer, Serializer};

  pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
  where
    S: Serializer,
  {
    serializer.serialize_str(&humantime::format_duration(*duration).to_string())
  }

  pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
  where
    D: Deserializer<'de>,
  {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serial_test::serial;
  use tempfile::TempDir;

  #[test]
  fn empty_config_uses_defaults() {
    let config = AgentConfig::parse("").unwrap();
    assert_eq!(config.address, DEFAULT_ADDRESS);
    assert_eq!(config.sync_interval, Duration::from_secs(10));
    assert_eq!(config.connect_timeout, Duration::from_secs(5));
    assert!(!config.node_id.is_empty());
  }

  #[test]
  fn full_config_parses() {
    let config = AgentConfig::parse(
      r#"
node_id = "node-1"
address = "10.0.0.1:9005"
data_dir = "/srv/terra"
sync_interval = "1m 30s"
connect_timeout = "500ms"

[labels]
env = "prod"
gpu = ""

[[peers]]
id = "node-2"
address = "10.0.0.2:9005"

[[peers]]
id = "node-3"
address = "10.0.0.3:9005"
labels = { env = "prod" }
"#,
    )
    .unwrap();

    assert_eq!(config.sync_interval, Duration::from_secs(90));
    assert_eq!(config.connect_timeout, Duration::from_millis(500));
    assert_eq!(config.store_path(), PathBuf::from("/srv/terra/terra.redb"));
    assert_eq!(config.image_source(), "/srv/terra/images");

    let local = config.local_node();
    assert_eq!(local.id, "node-1");
    assert_eq!(local.labels.get("gpu").map(String::as_str), Some(""));

    let peers = config.peer_nodes();
    assert_eq!(peers.len(), 2);
    assert_eq!(peers[1].labels.get("env").map(String::as_str), Some("prod"));
  }

  #[test]
  fn unknown_fields_are_rejected() {
    assert!(AgentConfig::parse("nodeid = \"x\"").is_err());
  }

  #[test]
  fn invalid_duration_is_rejected() {
    assert!(AgentConfig::parse("sync_interval = \"soon\"").is_err());
  }

  #[test]
  fn round_trips_through_toml() {
    let config = AgentConfig {
      node_id: "node-1".to_string(),
      image_source: Some("https://images.example.com".to_string()),
      ..Default::default()
    };
    let text = toml::to_string(&config).unwrap();
    assert_eq!(AgentConfig::parse(&text).unwrap(), config);
  }

  #[test]
  fn load_reports_missing_file() {
    let temp = TempDir::new().unwrap();
    let err = AgentConfig::load(&temp.path().join("missing.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
  }

  #[test]
  #[serial]
  #[cfg(not(windows))]
  fn data_dir_falls_back_to_environment() {
    temp_env::with_var("TERRA_DATA_DIR", Some("/tmp/terra-data"), || {
      let config = AgentConfig::parse("").unwrap();
      assert_eq!(config.store_path(), PathBuf::from("/tmp/terra-data/terra.redb"));
    });
  }
}
