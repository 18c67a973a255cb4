//! HTTP client for a node's RPC surface.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::manifest::ManifestList;
use crate::node::{Node, NodeInfo, NodeStatus};

use super::{ApplyRequest, Connector, ErrorBody, Remote, RpcError};

/// Talks to a single node at `address` (`host:port` or a full `http(s)://` URL).
#[derive(Debug, Clone)]
pub struct HttpRemote {
  client: Client,
  address: String,
  base_url: String,
}

impl HttpRemote {
  pub fn new(address: &str, timeout: Duration) -> Result<Self, RpcError> {
    Ok(Self::with_client(build_client(timeout)?, address))
  }

  fn with_client(client: Client, address: &str) -> Self {
    let base_url = if address.starts_with("http://") || address.starts_with("https://") {
      address.trim_end_matches('/').to_string()
    } else {
      format!("http://{address}")
    };
    Self {
      client,
      address: address.to_string(),
      base_url,
    }
  }

  pub fn address(&self) -> &str {
    &self.address
  }

  fn url(&self, path: &str) -> String {
    format!("{}/v1/{}", self.base_url, path)
  }

  fn transport(&self, source: reqwest::Error) -> RpcError {
    RpcError::Transport {
      address: self.address.clone(),
      source,
    }
  }

  async fn post(&self, path: &str, request: &ApplyRequest) -> Result<(), RpcError> {
    debug!(address = %self.address, path, "rpc request");
    let response = self
      .client
      .post(self.url(path))
      .json(request)
      .send()
      .await
      .map_err(|e| self.transport(e))?;
    self.check(response).await?;
    Ok(())
  }

  async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RpcError> {
    debug!(address = %self.address, path, "rpc request");
    let response = self
      .client
      .get(self.url(path))
      .send()
      .await
      .map_err(|e| self.transport(e))?;
    let response = self.check(response).await?;
    response.json().await.map_err(|source| RpcError::Decode {
      address: self.address.clone(),
      source,
    })
  }

  async fn check(&self, response: Response) -> Result<Response, RpcError> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
      .map(|body| body.error)
      .unwrap_or(text);
    Err(RpcError::Remote {
      address: self.address.clone(),
      status: status.as_u16(),
      message,
    })
  }
}

#[async_trait]
impl Remote for HttpRemote {
  async fn apply(&self, request: ApplyRequest) -> Result<(), RpcError> {
    self.post("apply", &request).await
  }

  async fn update(&self, request: ApplyRequest) -> Result<(), RpcError> {
    self.post("update", &request).await
  }

  async fn list(&self) -> Result<Option<ManifestList>, RpcError> {
    self.get("list").await
  }

  async fn nodes(&self) -> Result<Vec<Node>, RpcError> {
    self.get("nodes").await
  }

  async fn status(&self) -> Result<NodeStatus, RpcError> {
    self.get("status").await
  }
}

/// Connects to peers over HTTP, sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpConnector {
  client: Client,
}

impl HttpConnector {
  /// Every request, connection included, is bounded by `timeout`.
  pub fn new(timeout: Duration) -> Result<Self, RpcError> {
    Ok(Self {
      client: build_client(timeout)?,
    })
  }
}

#[async_trait]
impl Connector for HttpConnector {
  async fn connect(&self, peer: &NodeInfo) -> Result<Box<dyn Remote>, RpcError> {
    Ok(Box::new(HttpRemote::with_client(self.client.clone(), &peer.address)))
  }
}

fn build_client(timeout: Duration) -> Result<Client, RpcError> {
  Client::builder()
    .connect_timeout(timeout)
    .timeout(timeout)
    .build()
    .map_err(RpcError::Client)
}
