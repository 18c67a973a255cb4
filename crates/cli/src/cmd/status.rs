//! Implementation of the `terra status` command.

use anyhow::{Context, Result};

use terra_lib::rpc::Remote;

use super::{Target, runtime};
use crate::output::{print_json, print_stat, print_state};

pub fn cmd_status(target: &Target, json: bool) -> Result<()> {
  let remote = target.connect()?;
  let rt = runtime()?;
  let status = rt
    .block_on(remote.status())
    .with_context(|| format!("Failed to fetch status from {}", target.address))?;

  if json {
    return print_json(&status);
  }

  print_stat("Node", &target.address);
  print_state(&status);
  Ok(())
}
