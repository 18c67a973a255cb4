//! Implementation of the `terra manifest` commands.

use std::path::Path;

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use terra_lib::manifest::{Manifest, ManifestList};
use terra_lib::rpc::{ApplyRequest, Remote};

use super::{Target, runtime};
use crate::output::{print_info, print_json, print_stat, print_success, symbols};

/// Send the manifest list in `file` to the agent.
///
/// The agent answers as soon as the document is durably stored; installation
/// happens in the background and shows up in `terra status`.
pub fn cmd_manifest_apply(target: &Target, file: &Path, force: bool, update: bool, json: bool) -> Result<()> {
  let list = ManifestList::from_file(file)?;
  let count = list.assembly_count();
  let request = ApplyRequest::new(list, force);

  let remote = target.connect()?;
  let rt = runtime()?;
  rt.block_on(async {
    if update {
      remote.update(request).await
    } else {
      remote.apply(request).await
    }
  })
  .with_context(|| format!("Failed to send manifest list to {}", target.address))?;

  if json {
    return print_json(&serde_json::json!({ "address": target.address, "assemblies": count, "force": force }));
  }

  print_success(&format!("Manifest list accepted by {}", target.address));
  print_stat("Assemblies", &count.to_string());
  if force {
    print_stat("Force", "reinstalling and propagating to peers");
  }
  Ok(())
}

/// Print the agent's current desired state.
pub fn cmd_manifest_list(target: &Target, verbose: bool, json: bool) -> Result<()> {
  let remote = target.connect()?;
  let rt = runtime()?;
  let list = rt
    .block_on(remote.list())
    .with_context(|| format!("Failed to fetch manifest list from {}", target.address))?;

  if json {
    return print_json(&list);
  }

  let Some(list) = list else {
    print_info("No manifest list applied yet.");
    return Ok(());
  };

  print_stat("Updated", &list.updated.to_rfc3339());
  print_stat("Manifests", &list.manifests.len().to_string());
  for manifest in &list.manifests {
    println!();
    println!(
      "{} {}",
      symbols::ARROW.if_supports_color(Stream::Stdout, |s| s.cyan()),
      describe_selector(manifest)
    );
    for assembly in &manifest.assemblies {
      println!("  {} {}", symbols::INFO, assembly.image);
      for required in assembly.requires() {
        println!(
          "      {}",
          format!("requires {required}").if_supports_color(Stream::Stdout, |s| s.dimmed())
        );
      }
      if verbose {
        for (key, value) in &assembly.parameters {
          println!(
            "      {}",
            format!("{key}={value}").if_supports_color(Stream::Stdout, |s| s.dimmed())
          );
        }
      }
    }
  }
  Ok(())
}

fn describe_selector(manifest: &Manifest) -> String {
  if manifest.is_wildcard() {
    return "all nodes".to_string();
  }

  let mut parts = Vec::new();
  if let Some(id) = manifest.node_id() {
    parts.push(format!("node {id}"));
  }
  for (key, value) in &manifest.label_selector {
    if value.is_empty() {
      parts.push(format!("label {key}"));
    } else {
      parts.push(format!("label {key}={value}"));
    }
  }
  parts.join(" or ")
}
