mod agent;
mod manifest;
mod nodes;
mod status;

use std::time::Duration;

use anyhow::{Context, Result};
use terra_lib::rpc::HttpRemote;

pub use agent::{AgentArgs, cmd_agent};
pub use manifest::{cmd_manifest_apply, cmd_manifest_list};
pub use nodes::cmd_nodes;
pub use status::cmd_status;

/// The agent an operator command talks to.
pub struct Target {
  pub address: String,
  pub timeout: Duration,
}

impl Target {
  pub fn connect(&self) -> Result<HttpRemote> {
    HttpRemote::new(&self.address, self.timeout).context("Failed to create client")
  }
}

pub fn runtime() -> Result<tokio::runtime::Runtime> {
  tokio::runtime::Runtime::new().context("Failed to create async runtime")
}
