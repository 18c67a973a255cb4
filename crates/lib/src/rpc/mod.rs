//! Node-to-node and operator RPC surface.
//!
//! | Call   | Route             | Request          | Response               |
//! |--------|-------------------|------------------|------------------------|
//! | Apply  | `POST /v1/apply`  | [`ApplyRequest`] | `204`                  |
//! | Update | `POST /v1/update` | [`ApplyRequest`] | `204`                  |
//! | List   | `GET /v1/list`    |                  | `ManifestList` or null |
//! | Nodes  | `GET /v1/nodes`   |                  | `[Node]`               |
//! | Status | `GET /v1/status`  |                  | `NodeStatus`           |
//!
//! Failures carry an [`ErrorBody`] with a non-2xx status.

pub mod client;
pub mod server;
mod types;

use async_trait::async_trait;
use thiserror::Error;

use crate::manifest::ManifestList;
use crate::node::{Node, NodeInfo, NodeStatus};

pub use client::{HttpConnector, HttpRemote};
pub use types::{ApplyRequest, ErrorBody, Mutation};

#[derive(Debug, Error)]
pub enum RpcError {
  #[error("failed to build http client: {0}")]
  Client(#[source] reqwest::Error),

  #[error("request to {address} failed: {source}")]
  Transport {
    address: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("{address} responded {status}: {message}")]
  Remote {
    address: String,
    status: u16,
    message: String,
  },

  #[error("invalid response from {address}: {source}")]
  Decode {
    address: String,
    #[source]
    source: reqwest::Error,
  },

  #[error("peer {0} is unreachable")]
  Unreachable(String),
}

/// One open session with a node.
#[async_trait]
pub trait Remote: Send + Sync {
  async fn apply(&self, request: ApplyRequest) -> Result<(), RpcError>;

  async fn update(&self, request: ApplyRequest) -> Result<(), RpcError>;

  async fn list(&self) -> Result<Option<ManifestList>, RpcError>;

  async fn nodes(&self) -> Result<Vec<Node>, RpcError>;

  async fn status(&self) -> Result<NodeStatus, RpcError>;

  /// Dispatch `request` through the call named by `mutation`.
  async fn mutate(&self, mutation: Mutation, request: ApplyRequest) -> Result<(), RpcError> {
    match mutation {
      Mutation::Apply => self.apply(request).await,
      Mutation::Update => self.update(request).await,
    }
  }
}

/// Opens sessions to peers. Dropping the returned [`Remote`] closes it.
#[async_trait]
pub trait Connector: Send + Sync {
  async fn connect(&self, peer: &NodeInfo) -> Result<Box<dyn Remote>, RpcError>;
}
