//! Idempotent assembly application.
//!
//! An apply pass walks the manifest list in declared order:
//!
//! 1. Set the node status to `UPDATING`
//! 2. For every manifest matching this node, for every assembly:
//!    - apply each entry of `requires` (one level, no recursion)
//!    - apply the assembly itself
//! 3. Set `OK` if nothing failed, `FAILURE` with every failure otherwise
//!
//! Applying an assembly is a no-op when the ledger already has it, unless the
//! pass is forced. A failure is recorded and the pass moves on; nothing is
//! rolled back.
//!
//! # Serialization
//!
//! Only one pass runs at a time per node. A trigger that arrives while a pass
//! is running is parked; when the running pass finishes it immediately runs
//! one more pass over the most recently parked document. Several parked
//! triggers collapse into that single follow-up.

pub mod install;
mod types;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info, warn};

use crate::cluster::Membership;
use crate::image::ImageProvider;
use crate::manifest::{Assembly, ManifestList, matches};
use crate::node::{NodeInfo, NodeState};
use crate::state::SharedState;
use crate::store::Store;
use crate::tasks::TaskPool;

use install::{InstallEnv, run_install};

pub use install::InstallError;
pub use types::{ApplyError, AssemblyFailure, Outcome, PassReport};

#[derive(Debug)]
struct PendingPass {
  list: ManifestList,
  force: bool,
}

#[derive(Debug, Default)]
struct PassSlot {
  running: bool,
  pending: Option<PendingPass>,
}

/// Clears `running` if a pass unwinds without releasing the slot itself.
struct RunningPass<'a> {
  slot: &'a Mutex<PassSlot>,
  armed: bool,
}

impl Drop for RunningPass<'_> {
  fn drop(&mut self) {
    if self.armed {
      let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
      slot.running = false;
      slot.pending = None;
    }
  }
}

struct Inner {
  store: Arc<Store>,
  images: Arc<dyn ImageProvider>,
  membership: Arc<dyn Membership>,
  state: Arc<SharedState>,
  pool: TaskPool,
  slot: Mutex<PassSlot>,
}

/// Drives apply passes for the local node.
#[derive(Clone)]
pub struct Applier {
  inner: Arc<Inner>,
}

impl Applier {
  pub fn new(
    store: Arc<Store>,
    images: Arc<dyn ImageProvider>,
    membership: Arc<dyn Membership>,
    state: Arc<SharedState>,
    pool: TaskPool,
  ) -> Self {
    Self {
      inner: Arc::new(Inner {
        store,
        images,
        membership,
        state,
        pool,
        slot: Mutex::new(PassSlot::default()),
      }),
    }
  }

  fn slot(&self) -> MutexGuard<'_, PassSlot> {
    self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Whether a pass is currently running.
  pub fn is_busy(&self) -> bool {
    self.slot().running
  }

  /// Start a pass in the background and return immediately.
  pub fn trigger(&self, list: ManifestList, force: bool) {
    let applier = self.clone();
    self.inner.pool.spawn("apply pass", async move {
      applier.run(list, force).await;
    });
  }

  /// Run a pass to completion.
  ///
  /// Returns `None` when another pass already holds the slot; the request is
  /// then parked and picked up by that pass. Otherwise returns the report of
  /// the last pass run, follow-ups included.
  pub async fn run(&self, list: ManifestList, force: bool) -> Option<PassReport> {
    {
      let mut slot = self.slot();
      if slot.running {
        let force = force || slot.pending.as_ref().is_some_and(|p| p.force);
        debug!(updated = %list.updated, force, "apply pass running, parking trigger");
        slot.pending = Some(PendingPass { list, force });
        return None;
      }
      slot.running = true;
    }

    let mut guard = RunningPass {
      slot: &self.inner.slot,
      armed: true,
    };

    let mut list = list;
    let mut force = force;
    loop {
      let report = self.pass(&list, force).await;

      let mut slot = self.slot();
      match slot.pending.take() {
        Some(next) => {
          debug!(updated = %next.list.updated, "running parked apply pass");
          list = next.list;
          force = next.force;
        }
        None => {
          slot.running = false;
          guard.armed = false;
          return Some(report);
        }
      }
    }
  }

  async fn pass(&self, list: &ManifestList, force: bool) -> PassReport {
    let state = &self.inner.state;
    state.set_status(NodeState::Updating, "");

    let local = self.inner.membership.self_node();
    info!(updated = %list.updated, force, "applying manifest list");

    let mut report = PassReport::default();
    for manifest in list.manifests.iter().filter(|m| matches(m, &local.id, &local.labels)) {
      for assembly in &manifest.assemblies {
        info!(image = %assembly.image, "applying assembly");
        state.set_description(format!("applying assembly {}", assembly.image));

        for required in assembly.requires() {
          info!(image = %assembly.image, required = %required, "applying required assembly");
          let dependency = Assembly::new(required);
          let result = self.apply_assembly(&dependency, force, &local).await;
          report.record(required, result);
        }

        let result = self.apply_assembly(assembly, force, &local).await;
        report.record(&assembly.image, result);
      }
    }

    if report.is_success() {
      info!(
        installed = report.installed.len(),
        skipped = report.skipped.len(),
        "manifest list applied"
      );
      state.set_status(NodeState::Ok, "");
    } else {
      let description = report.failure_description();
      error!(failures = report.failures.len(), error = %description, "manifest list applied with failures");
      state.set_status(NodeState::Failure, description);
    }

    report
  }

  async fn apply_assembly(&self, assembly: &Assembly, force: bool, local: &NodeInfo) -> Result<Outcome, ApplyError> {
    let result = self.install(assembly, force, local).await;
    match &result {
      Ok(Outcome::Installed) => info!(image = %assembly.image, "assembly applied successfully"),
      Ok(Outcome::Skipped) => debug!(image = %assembly.image, "assembly already applied"),
      Err(e) => warn!(image = %assembly.image, error = %e, "error applying assembly"),
    }
    result
  }

  async fn install(&self, assembly: &Assembly, force: bool, local: &NodeInfo) -> Result<Outcome, ApplyError> {
    if !force && self.inner.store.is_installed(&assembly.image)? {
      return Ok(Outcome::Skipped);
    }

    let scratch = tempfile::Builder::new()
      .prefix("terra-assembly-")
      .tempdir()
      .map_err(ApplyError::Scratch)?;

    self.inner.images.fetch(&assembly.image, scratch.path()).await?;

    let peers = self.inner.membership.peers().await?;
    let env = InstallEnv::new(local, &peers, &assembly.parameters);
    let output = run_install(scratch.path(), &env).await?;

    self.inner.store.record_install(&assembly.image, &output)?;
    Ok(Outcome::Installed)
  }
}
