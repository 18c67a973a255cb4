//! Test utilities for terra-lib.
//!
//! Helpers for building install procedures and image archives on disk, an
//! in-memory [`ImageProvider`] whose behaviour tests can script per image, and
//! a socket-free cluster of agents.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tempfile::TempDir;
use tokio::sync::Notify;

use crate::agent::Agent;
use crate::cluster::{Membership, StaticMembership};
use crate::consts::{INSTALL_ENTRYPOINT, STORE_FILENAME};
use crate::image::{ImageError, ImageProvider, archive_path};
use crate::manifest::ManifestList;
use crate::node::{Node, NodeInfo, NodeStatus};
use crate::rpc::{ApplyRequest, Connector, Remote, RpcError};
use crate::store::Store;

/// Write an executable `install` script into `dir`.
#[cfg(unix)]
pub fn write_install_script(dir: &Path, script: &str) {
  use std::os::unix::fs::PermissionsExt;

  let path = dir.join(INSTALL_ENTRYPOINT);
  std::fs::write(&path, script).unwrap();
  std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
}

/// Write a `.tar.gz` image containing a single executable `install` at the
/// location an [`ArchiveImageProvider`](crate::image::ArchiveImageProvider)
/// rooted at `images_root` expects for `reference`.
pub fn write_image_archive(images_root: &Path, reference: &str, script: &str) {
  let path = images_root.join(archive_path(reference).unwrap());
  std::fs::create_dir_all(path.parent().unwrap()).unwrap();

  let file = File::create(&path).unwrap();
  let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));

  let mut header = tar::Header::new_gnu();
  header.set_size(script.len() as u64);
  header.set_mode(0o755);
  header.set_cksum();
  builder
    .append_data(&mut header, INSTALL_ENTRYPOINT, script.as_bytes())
    .unwrap();

  builder.into_inner().unwrap().finish().unwrap();
}

#[derive(Clone)]
struct Gate {
  started: Arc<Notify>,
  release: Arc<Notify>,
}

#[derive(Default)]
struct Scripted {
  fetched: Vec<String>,
  scripts: HashMap<String, String>,
  failing: HashSet<String>,
  gates: HashMap<String, Gate>,
}

/// Image provider that writes an install script instead of unpacking an
/// archive.
///
/// By default the script for `reference` echoes `reference`. Individual images
/// can be given a custom script, made to fail, or held until released.
#[derive(Default)]
pub struct ScriptImages {
  inner: Mutex<Scripted>,
}

impl ScriptImages {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn script(&self, reference: &str, script: &str) {
    let mut inner = self.inner.lock().unwrap();
    inner.scripts.insert(reference.to_string(), script.to_string());
  }

  pub fn fail(&self, reference: &str) {
    self.inner.lock().unwrap().failing.insert(reference.to_string());
  }

  /// Hold every fetch of `reference` until the returned handle is notified.
  pub fn block(&self, reference: &str) -> Arc<Notify> {
    let gate = Gate {
      started: Arc::new(Notify::new()),
      release: Arc::new(Notify::new()),
    };
    let release = gate.release.clone();
    self.inner.lock().unwrap().gates.insert(reference.to_string(), gate);
    release
  }

  /// Wait until a blocked fetch of `reference` has started.
  pub async fn wait_started(&self, reference: &str) {
    let started = self.inner.lock().unwrap().gates[reference].started.clone();
    started.notified().await;
  }

  pub fn fetches(&self, reference: &str) -> usize {
    self.inner.lock().unwrap().fetched.iter().filter(|r| *r == reference).count()
  }

  /// Every fetch so far, in order.
  pub fn order(&self) -> Vec<String> {
    self.inner.lock().unwrap().fetched.clone()
  }
}

#[async_trait]
impl ImageProvider for ScriptImages {
  async fn fetch(&self, reference: &str, dest: &Path) -> Result<(), ImageError> {
    let (script, failing, gate) = {
      let mut inner = self.inner.lock().unwrap();
      inner.fetched.push(reference.to_string());
      let script = inner
        .scripts
        .get(reference)
        .cloned()
        .unwrap_or_else(|| format!("#!/bin/sh\necho {reference}\n"));
      (script, inner.failing.contains(reference), inner.gates.get(reference).cloned())
    };

    if let Some(gate) = gate {
      gate.started.notify_one();
      gate.release.notified().await;
    }

    if failing {
      return Err(ImageError::FetchFailed {
        reference: reference.to_string(),
        message: "scripted failure".to_string(),
      });
    }

    #[cfg(unix)]
    write_install_script(dest, &script);
    #[cfg(not(unix))]
    let _ = (dest, script);
    Ok(())
  }
}

struct Member {
  info: NodeInfo,
  agent: Agent,
  images: Arc<ScriptImages>,
}

#[derive(Default)]
struct Registry {
  agents: Mutex<HashMap<String, Agent>>,
  down: Mutex<HashSet<String>>,
}

/// Delivers calls straight to another in-process agent.
struct LocalRemote {
  address: String,
  agent: Agent,
}

impl LocalRemote {
  fn refused(&self, err: impl std::fmt::Display) -> RpcError {
    RpcError::Remote {
      address: self.address.clone(),
      status: 500,
      message: err.to_string(),
    }
  }
}

#[async_trait]
impl Remote for LocalRemote {
  async fn apply(&self, request: ApplyRequest) -> Result<(), RpcError> {
    self.agent.apply(request).await.map_err(|e| self.refused(e))
  }

  async fn update(&self, request: ApplyRequest) -> Result<(), RpcError> {
    self.agent.update(request).await.map_err(|e| self.refused(e))
  }

  async fn list(&self) -> Result<Option<ManifestList>, RpcError> {
    Ok(self.agent.list())
  }

  async fn nodes(&self) -> Result<Vec<Node>, RpcError> {
    Ok(self.agent.nodes().await)
  }

  async fn status(&self) -> Result<NodeStatus, RpcError> {
    Ok(self.agent.status())
  }
}

#[async_trait]
impl Connector for Registry {
  async fn connect(&self, peer: &NodeInfo) -> Result<Box<dyn Remote>, RpcError> {
    if self.down.lock().unwrap().contains(&peer.id) {
      return Err(RpcError::Unreachable(peer.address.clone()));
    }
    let agent = self.agents.lock().unwrap().get(&peer.id).cloned();
    match agent {
      Some(agent) => Ok(Box::new(LocalRemote {
        address: peer.address.clone(),
        agent,
      })),
      None => Err(RpcError::Unreachable(peer.address.clone())),
    }
  }
}

/// A cluster of in-process agents named `node-0`, `node-1`, ..., each with
/// its own store and [`ScriptImages`], wired to each other without sockets.
pub struct LocalCluster {
  temp: TempDir,
  infos: Vec<NodeInfo>,
  registry: Arc<Registry>,
  members: Mutex<Vec<Member>>,
}

impl LocalCluster {
  pub async fn new(size: usize) -> Self {
    let temp = TempDir::new().unwrap();
    let infos: Vec<NodeInfo> = (0..size)
      .map(|i| NodeInfo::new(format!("node-{i}"), format!("node-{i}:9005")))
      .collect();

    let cluster = Self {
      temp,
      infos: infos.clone(),
      registry: Arc::new(Registry::default()),
      members: Mutex::new(Vec::new()),
    };

    for info in &infos {
      let images = Arc::new(ScriptImages::new());
      let agent = cluster.start(info, &infos, images.clone()).await;
      cluster.members.lock().unwrap().push(Member {
        info: info.clone(),
        agent,
        images,
      });
    }
    cluster
  }

  async fn start(&self, info: &NodeInfo, all: &[NodeInfo], images: Arc<ScriptImages>) -> Agent {
    let store = Store::open(&self.temp.path().join(&info.id).join(STORE_FILENAME), Duration::from_secs(5)).unwrap();
    let membership = Arc::new(StaticMembership::new(info.clone(), all.to_vec()));
    membership.start().await.unwrap();

    let agent = Agent::new(store, membership, images, self.registry.clone());
    self.registry.agents.lock().unwrap().insert(info.id.clone(), agent.clone());
    agent
  }

  pub fn agent(&self, index: usize) -> Agent {
    self.members.lock().unwrap()[index].agent.clone()
  }

  pub fn images(&self, index: usize) -> Arc<ScriptImages> {
    self.members.lock().unwrap()[index].images.clone()
  }

  /// Make every connection to node `index` fail.
  pub fn disconnect(&self, index: usize) {
    let id = self.members.lock().unwrap()[index].info.id.clone();
    self.registry.down.lock().unwrap().insert(id);
  }

  /// Replace node `index` with a fresh agent over the same store and images.
  ///
  /// Callers must have dropped their own handles to the old agent.
  pub async fn restart(&self, index: usize) -> Agent {
    let Member { info, agent, images } = self.members.lock().unwrap().remove(index);
    self.registry.agents.lock().unwrap().remove(&info.id);
    agent.shutdown().await;
    drop(agent);

    let agent = self.start(&info, &self.infos, images.clone()).await;
    self.members.lock().unwrap().insert(
      index,
      Member {
        info,
        agent: agent.clone(),
        images,
      },
    );
    agent
  }

  /// Wait for every background pass and delivery in the cluster.
  pub async fn settle(&self) {
    let agents: Vec<Agent> = self.members.lock().unwrap().iter().map(|m| m.agent.clone()).collect();
    for _ in 0..2 {
      for agent in &agents {
        agent.settle().await;
      }
    }
  }
}
