//! Cluster membership.
//!
//! The agent only needs to know who it is and who its peers are. Discovery and
//! addressing are delegated to a [`Membership`] implementation; the bundled
//! [`StaticMembership`] serves a peer list fixed at startup.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::node::NodeInfo;

#[derive(Debug, Error)]
pub enum MembershipError {
  #[error("membership service is not running")]
  NotRunning,

  #[error("membership service failed: {0}")]
  Failed(String),
}

/// Source of cluster membership.
#[async_trait]
pub trait Membership: Send + Sync {
  /// Identity of the local node.
  fn self_node(&self) -> NodeInfo;

  /// Current peers, excluding the local node.
  async fn peers(&self) -> Result<Vec<NodeInfo>, MembershipError>;

  async fn start(&self) -> Result<(), MembershipError>;

  async fn stop(&self) -> Result<(), MembershipError>;
}

/// Membership from a configured peer list.
#[derive(Debug)]
pub struct StaticMembership {
  local: NodeInfo,
  peers: Vec<NodeInfo>,
  running: AtomicBool,
}

impl StaticMembership {
  /// Peers sharing the local id or address are dropped.
  pub fn new(local: NodeInfo, peers: Vec<NodeInfo>) -> Self {
    let peers = peers
      .into_iter()
      .filter(|peer| peer.id != local.id && peer.address != local.address)
      .collect();

    Self {
      local,
      peers,
      running: AtomicBool::new(false),
    }
  }
}

#[async_trait]
impl Membership for StaticMembership {
  fn self_node(&self) -> NodeInfo {
    self.local.clone()
  }

  async fn peers(&self) -> Result<Vec<NodeInfo>, MembershipError> {
    if !self.running.load(Ordering::Acquire) {
      return Err(MembershipError::NotRunning);
    }
    Ok(self.peers.clone())
  }

  async fn start(&self) -> Result<(), MembershipError> {
    if !self.running.swap(true, Ordering::AcqRel) {
      info!(node = %self.local.id, peers = self.peers.len(), "joined static cluster");
    }
    Ok(())
  }

  async fn stop(&self) -> Result<(), MembershipError> {
    self.running.store(false, Ordering::Release);
    Ok(())
  }
}
