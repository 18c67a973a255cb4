//! The node agent.
//!
//! [`Agent`] ties the pieces together: it owns the in-memory state, serves the
//! RPC surface, starts apply passes and runs the synchronizer. It is cheap to
//! clone; every clone drives the same node.
//!
//! # Lifecycle
//!
//! [`Agent::run`] joins the cluster, restores the persisted document (which
//! starts an apply pass), starts the synchronizer, and serves until the
//! shutdown future resolves. It then stops the synchronizer and waits for
//! in-flight passes and deliveries before leaving the cluster.

mod sync;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::apply::Applier;
use crate::cluster::{Membership, MembershipError, StaticMembership};
use crate::config::AgentConfig;
use crate::image::{ArchiveImageProvider, ImageProvider};
use crate::manifest::ManifestList;
use crate::node::{Node, NodeStatus};
use crate::rpc::{ApplyRequest, Connector, HttpConnector, Mutation, RpcError, server};
use crate::state::SharedState;
use crate::store::{Store, StoreError};
use crate::tasks::TaskPool;

pub use sync::SyncReport;

#[derive(Debug, Error)]
pub enum AgentError {
  #[error("failed to persist manifest list: {0}")]
  Persist(#[source] StoreError),

  #[error("failed to restore manifest list: {0}")]
  Restore(#[source] StoreError),

  #[error("failed to open store: {0}")]
  Open(#[source] StoreError),

  #[error(transparent)]
  Membership(#[from] MembershipError),

  #[error(transparent)]
  Rpc(#[from] RpcError),

  #[error("rpc server failed: {0}")]
  Serve(#[source] std::io::Error),
}

struct Inner {
  state: Arc<SharedState>,
  store: Arc<Store>,
  membership: Arc<dyn Membership>,
  connector: Arc<dyn Connector>,
  applier: Applier,
  pool: TaskPool,
}

#[derive(Clone)]
pub struct Agent {
  inner: Arc<Inner>,
}

impl Agent {
  pub fn new(
    store: Store,
    membership: Arc<dyn Membership>,
    images: Arc<dyn ImageProvider>,
    connector: Arc<dyn Connector>,
  ) -> Self {
    let store = Arc::new(store);
    let state = Arc::new(SharedState::new());
    let pool = TaskPool::new();
    let applier = Applier::new(store.clone(), images, membership.clone(), state.clone(), pool.clone());

    Self {
      inner: Arc::new(Inner {
        state,
        store,
        membership,
        connector,
        applier,
        pool,
      }),
    }
  }

  /// Build an agent with the bundled collaborators: a redb store under the
  /// data directory, static membership, archive images and HTTP peers.
  pub fn from_config(config: &AgentConfig) -> Result<Self, AgentError> {
    let store = Store::open(&config.store_path(), config.store_open_timeout).map_err(AgentError::Open)?;
    let membership = Arc::new(StaticMembership::new(config.local_node(), config.peer_nodes()));
    let images = Arc::new(ArchiveImageProvider::new(&config.image_source()));
    let connector = Arc::new(HttpConnector::new(config.connect_timeout)?);

    Ok(Self::new(store, membership, images, connector))
  }

  pub fn applier(&self) -> &Applier {
    &self.inner.applier
  }

  /// Stamp `list` with the current time and make it the desired state.
  ///
  /// Returns once the document is durably stored. The apply pass, and the
  /// fan-out to peers when `propagate` is set, run in the background.
  pub async fn replace_desired_state(
    &self,
    mutation: Mutation,
    mut list: ManifestList,
    force: bool,
    propagate: bool,
  ) -> Result<(), AgentError> {
    list.stamp(Utc::now());

    let store = &self.inner.store;
    self
      .inner
      .state
      .replace(list.clone(), |list| store.save_manifest_list(list))
      .map_err(AgentError::Persist)?;

    info!(
      call = mutation.as_str(),
      updated = %list.updated,
      manifests = list.manifests.len(),
      force,
      propagate,
      "desired state replaced"
    );

    self.inner.applier.trigger(list.clone(), force);

    if propagate {
      self.propagate(mutation, list).await;
    }
    Ok(())
  }

  /// Entry point shared by `Apply` and `Update`.
  pub async fn mutate(&self, mutation: Mutation, request: ApplyRequest) -> Result<(), AgentError> {
    let propagate = request.propagates();
    self
      .replace_desired_state(mutation, request.manifest_list, request.force, propagate)
      .await
  }

  pub async fn apply(&self, request: ApplyRequest) -> Result<(), AgentError> {
    self.mutate(Mutation::Apply, request).await
  }

  pub async fn update(&self, request: ApplyRequest) -> Result<(), AgentError> {
    self.mutate(Mutation::Update, request).await
  }

  /// Deliver `list` to every peer, one background task per peer.
  async fn propagate(&self, mutation: Mutation, list: ManifestList) {
    let peers = match self.inner.membership.peers().await {
      Ok(peers) => peers,
      Err(e) => {
        warn!(error = %e, "failed to list peers, skipping propagation");
        return;
      }
    };

    for peer in peers {
      let connector = self.inner.connector.clone();
      let request = ApplyRequest::delivery(list.clone());
      self.inner.pool.spawn("peer delivery", async move {
        let result = match connector.connect(&peer).await {
          Ok(remote) => remote.mutate(mutation, request).await,
          Err(e) => Err(e),
        };
        match result {
          Ok(()) => debug!(peer = %peer.id, address = %peer.address, "delivered manifest list"),
          Err(e) => warn!(peer = %peer.id, address = %peer.address, error = %e, "failed to deliver manifest list"),
        }
      });
    }
  }

  /// The current desired-state document, if any.
  pub fn list(&self) -> Option<ManifestList> {
    self.inner.state.manifest_list()
  }

  pub fn status(&self) -> NodeStatus {
    self.inner.state.status()
  }

  /// The local node followed by every peer.
  ///
  /// A peer that cannot be queried is listed with an error instead of a status.
  pub async fn nodes(&self) -> Vec<Node> {
    let local = self.inner.membership.self_node();
    let mut nodes = vec![Node::reachable(local, self.status())];

    let peers = match self.inner.membership.peers().await {
      Ok(peers) => peers,
      Err(e) => {
        warn!(error = %e, "failed to list peers");
        return nodes;
      }
    };

    for peer in peers {
      let status = match self.inner.connector.connect(&peer).await {
        Ok(remote) => remote.status().await,
        Err(e) => Err(e),
      };
      nodes.push(match status {
        Ok(status) => Node::reachable(peer, status),
        Err(e) => {
          warn!(peer = %peer.id, address = %peer.address, error = %e, "failed to fetch peer status");
          Node::unreachable(peer, e.to_string())
        }
      });
    }
    nodes
  }

  /// Load the persisted document and start a pass over it.
  ///
  /// Returns whether a document was found.
  pub fn restore(&self) -> Result<bool, AgentError> {
    let Some(list) = self.inner.store.load_manifest_list().map_err(AgentError::Restore)? else {
      info!("no persisted manifest list");
      return Ok(false);
    };

    info!(updated = %list.updated, manifests = list.manifests.len(), "restored manifest list");
    self.inner.state.restore(list.clone());
    self.inner.applier.trigger(list, false);
    Ok(true)
  }

  /// Run the agent on `listener` until `shutdown` resolves.
  pub async fn run<F>(&self, listener: TcpListener, sync_interval: Duration, shutdown: F) -> Result<(), AgentError>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.inner.membership.start().await?;
    self.restore()?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let synchronizer = {
      let agent = self.clone();
      tokio::spawn(async move { agent.run_sync(sync_interval, stop_rx).await })
    };

    let served = server::serve(listener, self.clone(), shutdown).await;

    info!("shutting down");
    let _ = stop_tx.send(true);
    if let Err(e) = synchronizer.await {
      warn!(error = %e, "synchronizer task failed");
    }
    self.shutdown().await;

    served.map_err(AgentError::Serve)
  }

  /// Wait for in-flight passes and deliveries, then leave the cluster.
  pub async fn shutdown(&self) {
    self.inner.pool.shutdown().await;
    if let Err(e) = self.inner.membership.stop().await {
      warn!(error = %e, "failed to leave cluster");
    }
  }

  #[cfg(test)]
  pub(crate) fn state(&self) -> &SharedState {
    &self.inner.state
  }

  #[cfg(test)]
  pub(crate) fn store(&self) -> &Store {
    &self.inner.store
  }

  /// Wait until every background pass and delivery has finished.
  pub async fn settle(&self) {
    self.inner.pool.drain().await;
  }
}
