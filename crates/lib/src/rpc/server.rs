//! HTTP server exposing an [`Agent`] to operators and peers.

use std::future::Future;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::agent::{Agent, AgentError};
use crate::manifest::ManifestList;
use crate::node::{Node, NodeStatus};

use super::{ApplyRequest, ErrorBody, Mutation};

/// A failed call, rendered as an [`ErrorBody`].
#[derive(Debug)]
pub struct ApiError {
  status: StatusCode,
  message: String,
}

impl From<AgentError> for ApiError {
  fn from(err: AgentError) -> Self {
    Self {
      status: StatusCode::INTERNAL_SERVER_ERROR,
      message: err.to_string(),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(rejection: JsonRejection) -> Self {
    Self {
      status: rejection.status(),
      message: rejection.body_text(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    (self.status, Json(ErrorBody { error: self.message })).into_response()
  }
}

pub fn router(agent: Agent) -> Router {
  Router::new()
    .route("/v1/apply", post(apply))
    .route("/v1/update", post(update))
    .route("/v1/list", get(list))
    .route("/v1/nodes", get(nodes))
    .route("/v1/status", get(status))
    .with_state(agent)
}

/// Serve `agent` on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, agent: Agent, shutdown: F) -> std::io::Result<()>
where
  F: Future<Output = ()> + Send + 'static,
{
  if let Ok(addr) = listener.local_addr() {
    info!(addr = %addr, "rpc server listening");
  }
  axum::serve(listener, router(agent)).with_graceful_shutdown(shutdown).await
}

async fn mutate(
  agent: &Agent,
  mutation: Mutation,
  request: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
  let Json(request) = request.inspect_err(|e| warn!(call = mutation.as_str(), error = %e, "rejected request"))?;
  agent.mutate(mutation, request).await?;
  Ok(StatusCode::NO_CONTENT)
}

async fn apply(
  State(agent): State<Agent>,
  request: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
  mutate(&agent, Mutation::Apply, request).await
}

async fn update(
  State(agent): State<Agent>,
  request: Result<Json<ApplyRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
  mutate(&agent, Mutation::Update, request).await
}

async fn list(State(agent): State<Agent>) -> Json<Option<ManifestList>> {
  Json(agent.list())
}

async fn nodes(State(agent): State<Agent>) -> Json<Vec<Node>> {
  Json(agent.nodes().await)
}

async fn status(State(agent): State<Agent>) -> Json<NodeStatus> {
  Json(agent.status())
}
