//! CLI output formatting utilities.
//!
//! Provides consistent formatting for terminal output including colored status
//! messages and node states.

use anyhow::Context;
use owo_colors::{OwoColorize, Stream};

use terra_lib::node::{NodeState, NodeStatus};

pub mod symbols {
  pub const SUCCESS: &str = "✓";
  pub const ERROR: &str = "✗";
  pub const INFO: &str = "•";
  pub const ARROW: &str = "→";
}

pub fn print_success(message: &str) {
  println!(
    "{} {}",
    symbols::SUCCESS.if_supports_color(Stream::Stdout, |s| s.green()),
    message
  );
}

pub fn print_error(message: &str) {
  eprintln!(
    "{} {}",
    symbols::ERROR.if_supports_color(Stream::Stderr, |s| s.red()),
    message.if_supports_color(Stream::Stderr, |s| s.red())
  );
}

pub fn print_info(message: &str) {
  println!(
    "{} {}",
    symbols::INFO.if_supports_color(Stream::Stdout, |s| s.blue()),
    message
  );
}

pub fn print_stat(label: &str, value: &str) {
  println!(
    "  {}: {}",
    label.if_supports_color(Stream::Stdout, |s| s.dimmed()),
    value
  );
}

/// A node state, colored by severity.
pub fn state_label(state: NodeState) -> String {
  match state {
    NodeState::Ok => state.as_str().if_supports_color(Stream::Stdout, |s| s.green()).to_string(),
    NodeState::Updating => state.as_str().if_supports_color(Stream::Stdout, |s| s.yellow()).to_string(),
    NodeState::Failure => state.as_str().if_supports_color(Stream::Stdout, |s| s.red()).to_string(),
  }
}

pub fn print_state(status: &NodeStatus) {
  print_stat("State", &state_label(status.state));
  if !status.description.is_empty() {
    print_stat("Description", &status.description);
  }
}

pub fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
  println!("{}", json);
  Ok(())
}
