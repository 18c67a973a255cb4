mod cmd;
mod output;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use terra_lib::consts::DEFAULT_ADDRESS;

use cmd::AgentArgs;
use output::print_error;

/// terra - peer-to-peer desired-state convergence
#[derive(Parser)]
#[command(name = "terra")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable verbose output
  #[arg(short, long, global = true)]
  verbose: bool,

  /// Address of the agent operator commands talk to
  #[arg(long, global = true, env = "TERRA_ADDRESS", default_value = DEFAULT_ADDRESS)]
  address: String,

  /// Request timeout for operator commands (e.g. "5s")
  #[arg(long, global = true, value_parser = humantime::parse_duration, default_value = "5s")]
  timeout: Duration,

  /// Print machine-readable JSON
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the node agent
  Agent(AgentArgs),

  /// Manage the cluster's desired state
  Manifest {
    #[command(subcommand)]
    command: ManifestCommands,
  },

  /// List the cluster's nodes and their status
  Nodes,

  /// Show the status of one node
  Status,
}

#[derive(Subcommand)]
enum ManifestCommands {
  /// Replace the desired state with the manifest list in FILE
  Apply {
    /// Path to a JSON manifest list
    file: PathBuf,

    /// Reinstall every assembly and push the document to all peers
    #[arg(short, long)]
    force: bool,
  },

  /// Same as apply
  Update {
    /// Path to a JSON manifest list
    file: PathBuf,

    /// Reinstall every assembly and push the document to all peers
    #[arg(short, long)]
    force: bool,
  },

  /// Show the agent's current desired state
  List,
}

fn main() {
  let cli = Cli::parse();

  let level = if cli.verbose { "debug" } else { "info" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .init();

  if let Err(e) = run(cli) {
    print_error(&format!("{e:#}"));
    std::process::exit(1);
  }
}

fn run(cli: Cli) -> Result<()> {
  let target = cmd::Target {
    address: cli.address,
    timeout: cli.timeout,
  };

  match cli.command {
    Commands::Agent(args) => cmd::cmd_agent(args),
    Commands::Manifest { command } => match command {
      ManifestCommands::Apply { file, force } => cmd::cmd_manifest_apply(&target, &file, force, false, cli.json),
      ManifestCommands::Update { file, force } => cmd::cmd_manifest_apply(&target, &file, force, true, cli.json),
      ManifestCommands::List => cmd::cmd_manifest_list(&target, cli.verbose, cli.json),
    },
    Commands::Nodes => cmd::cmd_nodes(&target, cli.json),
    Commands::Status => cmd::cmd_status(&target, cli.json),
  }
}
