//! Implementation of the `terra agent` command.
//!
//! Builds the agent configuration from an optional TOML file plus flags, then
//! serves until interrupted.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tracing::info;

use terra_lib::agent::Agent;
use terra_lib::config::AgentConfig;
use terra_lib::node::{NodeInfo, parse_labels};

use super::runtime;

#[derive(Debug, Args)]
pub struct AgentArgs {
  /// TOML configuration file
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Node id (defaults to the host name)
  #[arg(long)]
  node_id: Option<String>,

  /// Address to serve on, also advertised to install procedures
  #[arg(long)]
  listen: Option<String>,

  /// Peer as ID@ADDRESS, or a bare ADDRESS used as its own id (repeatable)
  #[arg(long = "peer", value_name = "PEER")]
  peers: Vec<String>,

  /// Node label as KEY=VALUE or KEY (repeatable)
  #[arg(long = "label", value_name = "LABEL")]
  labels: Vec<String>,

  /// Directory holding the store and, by default, image archives
  #[arg(long)]
  data_dir: Option<PathBuf>,

  /// Directory or http(s) base URL serving image archives
  #[arg(long)]
  image_source: Option<String>,

  /// Interval between synchronizer ticks (e.g. "10s")
  #[arg(long, value_parser = humantime::parse_duration)]
  sync_interval: Option<Duration>,
}

impl AgentArgs {
  /// Load the config file, if any, and apply flag overrides on top.
  fn resolve(self) -> Result<AgentConfig> {
    let mut config = match &self.config {
      Some(path) => AgentConfig::load(path)?,
      None => AgentConfig::default(),
    };

    if let Some(node_id) = self.node_id {
      config.node_id = node_id;
    }
    if let Some(listen) = self.listen {
      config.address = listen;
    }
    if !self.peers.is_empty() {
      config.peers = self.peers.iter().map(|raw| parse_peer(raw)).collect();
    }
    if !self.labels.is_empty() {
      config.labels.extend(parse_labels(&self.labels));
    }
    if let Some(data_dir) = self.data_dir {
      config.data_dir = Some(data_dir);
    }
    if let Some(image_source) = self.image_source {
      config.image_source = Some(image_source);
    }
    if let Some(interval) = self.sync_interval {
      config.sync_interval = interval;
    }
    Ok(config)
  }
}

fn parse_peer(raw: &str) -> NodeInfo {
  match raw.split_once('@') {
    Some((id, address)) => NodeInfo::new(id, address),
    None => NodeInfo::new(raw, raw),
  }
}

/// Execute the agent command.
///
/// Opens the store, joins the cluster, restores the persisted document and
/// serves RPC until Ctrl-C or SIGTERM, then waits for in-flight installs.
pub fn cmd_agent(args: AgentArgs) -> Result<()> {
  let config = args.resolve()?;

  info!(
    node = %config.node_id,
    address = %config.address,
    data_dir = %config.data_dir().display(),
    peers = config.peers.len(),
    "starting agent"
  );

  // Opening the store may wait on another process, so do it off the runtime.
  let agent = Agent::from_config(&config).context("Failed to start agent")?;

  let rt = runtime()?;
  rt.block_on(async {
    let listener = TcpListener::bind(&config.address)
      .await
      .with_context(|| format!("Failed to bind {}", config.address))?;
    agent
      .run(listener, config.sync_interval, shutdown_signal())
      .await
      .context("Agent failed")
  })
}

async fn shutdown_signal() {
  let ctrl_c = async {
    let _ = tokio::signal::ctrl_c().await;
  };

  #[cfg(unix)]
  let terminate = async {
    match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
      Ok(mut signal) => {
        signal.recv().await;
      }
      Err(_) => std::future::pending::<()>().await,
    }
  };

  #[cfg(not(unix))]
  let terminate = std::future::pending::<()>();

  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
}
