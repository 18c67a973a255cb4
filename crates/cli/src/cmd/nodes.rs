//! Implementation of the `terra nodes` command.
//!
//! Lists the queried agent first, then every peer it knows about. Peers it
//! could not reach are listed with the error instead of a status.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use terra_lib::node::Node;
use terra_lib::rpc::Remote;

use super::{Target, runtime};
use crate::output::{print_json, state_label, symbols};

pub fn cmd_nodes(target: &Target, json: bool) -> Result<()> {
  let remote = target.connect()?;
  let rt = runtime()?;
  let nodes = rt
    .block_on(remote.nodes())
    .with_context(|| format!("Failed to list nodes from {}", target.address))?;

  if json {
    return print_json(&nodes);
  }

  for node in &nodes {
    print_node(node);
  }
  Ok(())
}

fn print_node(node: &Node) {
  let labels = node
    .labels
    .iter()
    .map(|(k, v)| if v.is_empty() { k.clone() } else { format!("{k}={v}") })
    .collect::<Vec<_>>()
    .join(",");

  match (&node.status, &node.error) {
    (Some(status), _) => {
      println!("{} {} {}", node.id, node.address, state_label(status.state));
      if !status.description.is_empty() {
        println!("    {}", status.description);
      }
    }
    (None, error) => {
      println!(
        "{} {} {} {}",
        symbols::ERROR.if_supports_color(Stream::Stdout, |s| s.red()),
        node.id,
        node.address,
        error.as_deref().unwrap_or("unreachable").if_supports_color(Stream::Stdout, |s| s.red())
      );
    }
  }
  if !labels.is_empty() {
    println!("    {}", labels.if_supports_color(Stream::Stdout, |s| s.dimmed()));
  }
}
