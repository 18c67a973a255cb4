//! Install procedure execution.
//!
//! Every unpacked image carries an `install` executable at its root. It runs
//! with the agent's own environment plus the `TERRA_*` variables describing the
//! node, its peers, and the assembly parameters.

use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

use crate::consts::{ENV_PREFIX, INSTALL_ENTRYPOINT};
use crate::node::NodeInfo;

#[derive(Debug, Error)]
pub enum InstallError {
  #[error("image has no install entrypoint")]
  MissingEntrypoint,

  #[error("failed to start install: {0}")]
  Spawn(#[source] std::io::Error),

  #[error("install exited with code {code:?}: {output}")]
  Failed { code: Option<i32>, output: String },
}

/// Environment handed to an install procedure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallEnv {
  pub node_id: String,
  pub node_address: String,
  pub peer_addresses: Vec<String>,
  pub parameters: BTreeMap<String, String>,
}

impl InstallEnv {
  pub fn new(local: &NodeInfo, peers: &[NodeInfo], parameters: &BTreeMap<String, String>) -> Self {
    Self {
      node_id: local.id.clone(),
      node_address: local.address.clone(),
      peer_addresses: peers.iter().map(|p| p.address.clone()).collect(),
      parameters: parameters.clone(),
    }
  }

  /// The exported variables, node description first, then one per parameter
  /// with its key upper-cased.
  pub fn vars(&self) -> Vec<(String, String)> {
    let mut vars = vec![
      (format!("{ENV_PREFIX}NODE_ID"), self.node_id.clone()),
      (format!("{ENV_PREFIX}NODE_ADDR"), self.node_address.clone()),
      (format!("{ENV_PREFIX}NODE_PEERS"), self.peer_addresses.join(",")),
    ];
    for (key, value) in &self.parameters {
      vars.push((format!("{ENV_PREFIX}{}", key.to_uppercase()), value.clone()));
    }
    vars
  }
}

/// Run `./install` inside `dir`.
///
/// # Returns
///
/// Stdout followed by stderr, verbatim, on success. On a non-zero exit the same
/// combined output is carried by [`InstallError::Failed`].
pub async fn run_install(dir: &Path, env: &InstallEnv) -> Result<Vec<u8>, InstallError> {
  let entrypoint = dir.join(INSTALL_ENTRYPOINT);
  if !entrypoint.is_file() {
    return Err(InstallError::MissingEntrypoint);
  }

  info!(node = %env.node_id, dir = %dir.display(), "running install");

  let output = Command::new(&entrypoint)
    .current_dir(dir)
    .envs(env.vars())
    .output()
    .await
    .map_err(InstallError::Spawn)?;

  let mut combined = output.stdout;
  combined.extend_from_slice(&output.stderr);

  if !output.status.success() {
    let text = String::from_utf8_lossy(&combined).trim().to_string();
    debug!(output = %text, "install output");
    return Err(InstallError::Failed {
      code: output.status.code(),
      output: text,
    });
  }

  Ok(combined)
}
