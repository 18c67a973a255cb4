//! Gossip convergence.
//!
//! Every tick the agent asks each peer, one after the other, for its document
//! and adopts it when it is strictly newer than the local copy. Equal
//! timestamps change nothing, so a converged cluster settles into no-op ticks.
//! A peer that cannot be reached is logged and skipped.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::node::NodeInfo;

use super::{Agent, AgentError};

/// What one synchronizer tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// The tick was skipped because an apply pass was running.
  pub skipped: bool,
  /// Peers that answered.
  pub contacted: usize,
  /// Peers that could not be queried, or whose document could not be stored.
  pub failed: usize,
  /// Id of the last peer whose document was adopted.
  pub adopted_from: Option<String>,
}

impl Agent {
  /// Run one synchronizer tick.
  pub async fn sync_with_peers(&self) -> SyncReport {
    let mut report = SyncReport::default();

    if self.inner.applier.is_busy() {
      debug!("apply pass running, skipping sync");
      report.skipped = true;
      return report;
    }

    let peers = match self.inner.membership.peers().await {
      Ok(peers) => peers,
      Err(e) => {
        warn!(error = %e, "failed to list peers, skipping sync");
        return report;
      }
    };

    for peer in peers {
      match self.sync_with(&peer).await {
        Ok(adopted) => {
          report.contacted += 1;
          if adopted {
            report.adopted_from = Some(peer.id.clone());
          }
        }
        Err(e) => {
          report.failed += 1;
          warn!(peer = %peer.id, address = %peer.address, error = %e, "failed to sync with peer");
        }
      }
    }

    report
  }

  async fn sync_with(&self, peer: &NodeInfo) -> Result<bool, AgentError> {
    let list = {
      let remote = self.inner.connector.connect(peer).await?;
      remote.list().await?
    };

    let Some(list) = list else {
      debug!(peer = %peer.id, "peer has no manifest list");
      return Ok(false);
    };

    let store = &self.inner.store;
    let adopted = self
      .inner
      .state
      .adopt_if_newer(list.clone(), |list| store.save_manifest_list(list))
      .map_err(AgentError::Persist)?;

    if adopted {
      info!(peer = %peer.id, updated = %list.updated, "adopted newer manifest list");
      self.inner.applier.trigger(list, false);
    }
    Ok(adopted)
  }

  /// Tick every `interval` until `stop` flips to `true` or its sender is gone.
  pub async fn run_sync(&self, interval: Duration, mut stop: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    info!(interval = %humantime::format_duration(interval), "synchronizer started");
    loop {
      tokio::select! {
        _ = ticker.tick() => {
          let report = self.sync_with_peers().await;
          debug!(
            skipped = report.skipped,
            contacted = report.contacted,
            failed = report.failed,
            "sync tick finished"
          );
        }
        changed = stop.changed() => {
          if changed.is_err() || *stop.borrow() {
            break;
          }
        }
      }
    }
    info!("synchronizer stopped");
  }
}
