//! In-memory node state.
//!
//! [`SharedState`] owns the current manifest list and the node status. Request
//! handlers and background tasks only ever see clones. The mutex guarding them
//! is held for the read or swap itself, never across a store write, an install
//! or a network round-trip.
//!
//! Document replacements are additionally serialized by a writer lock that is
//! held across the store write, so the durable copy and the in-memory copy
//! change in the same order.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::manifest::ManifestList;
use crate::node::{NodeState, NodeStatus};

#[derive(Debug, Default)]
struct Inner {
  manifest_list: Option<ManifestList>,
  status: NodeStatus,
}

#[derive(Debug, Default)]
pub struct SharedState {
  inner: Mutex<Inner>,
  writer: Mutex<()>,
}

impl SharedState {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn writer(&self) -> MutexGuard<'_, ()> {
    self.writer.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn manifest_list(&self) -> Option<ManifestList> {
    self.lock().manifest_list.clone()
  }

  pub fn updated(&self) -> Option<DateTime<Utc>> {
    self.lock().manifest_list.as_ref().map(|list| list.updated)
  }

  pub fn status(&self) -> NodeStatus {
    self.lock().status.clone()
  }

  pub fn set_status(&self, state: NodeState, description: impl Into<String>) {
    self.lock().status = NodeStatus::new(state, description);
  }

  /// Replace the description without touching the state.
  pub fn set_description(&self, description: impl Into<String>) {
    self.lock().status.description = description.into();
  }

  /// Install a document restored from disk.
  pub fn restore(&self, list: ManifestList) {
    self.lock().manifest_list = Some(list);
  }

  /// Durably write `list` with `persist`, then swap it in.
  ///
  /// If `persist` fails the in-memory copy is left untouched. Status reads and
  /// updates do not wait for `persist`.
  pub fn replace<F, E>(&self, list: ManifestList, persist: F) -> Result<(), E>
  where
    F: FnOnce(&ManifestList) -> Result<(), E>,
  {
    let _writer = self.writer();
    persist(&list)?;
    self.lock().manifest_list = Some(list);
    Ok(())
  }

  /// Like [`replace`](Self::replace), but only when `list` is strictly newer
  /// than the current copy. Returns whether the document was adopted.
  pub fn adopt_if_newer<F, E>(&self, list: ManifestList, persist: F) -> Result<bool, E>
  where
    F: FnOnce(&ManifestList) -> Result<(), E>,
  {
    let _writer = self.writer();
    let newer = list.is_newer_than(self.lock().manifest_list.as_ref());
    if !newer {
      return Ok(false);
    }
    persist(&list)?;
    self.lock().manifest_list = Some(list);
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;

  fn at(secs: i64) -> ManifestList {
    let mut list = ManifestList::default();
    list.stamp(Utc.timestamp_opt(secs, 0).unwrap());
    list
  }

  #[test]
  fn replace_keeps_old_copy_when_persist_fails() {
    let state = SharedState::new();
    state.replace(at(1), |_| Ok::<_, ()>(())).unwrap();

    let result = state.replace(at(2), |_| Err("disk full"));

    assert_eq!(result, Err("disk full"));
    assert_eq!(state.manifest_list(), Some(at(1)));
  }

  #[test]
  fn status_stays_available_during_persist() {
    let state = SharedState::new();
    state.set_status(NodeState::Updating, "");

    state
      .replace(at(1), |_| {
        state.set_description("applying assembly a");
        assert_eq!(state.status().description, "applying assembly a");
        assert_eq!(state.manifest_list(), None);
        Ok::<_, ()>(())
      })
      .unwrap();

    assert_eq!(state.manifest_list(), Some(at(1)));
  }

  #[test]
  fn adopt_only_strictly_newer() {
    let state = SharedState::new();
    assert!(state.adopt_if_newer(at(10), |_| Ok::<_, ()>(())).unwrap());
    assert!(!state.adopt_if_newer(at(10), |_| Ok::<_, ()>(())).unwrap());
    assert!(!state.adopt_if_newer(at(5), |_| Ok::<_, ()>(())).unwrap());
    assert!(state.adopt_if_newer(at(11), |_| Ok::<_, ()>(())).unwrap());
    assert_eq!(state.updated(), Some(Utc.timestamp_opt(11, 0).unwrap()));
  }

  #[test]
  fn adopt_does_not_persist_older_documents() {
    let state = SharedState::new();
    state.restore(at(10));

    let mut writes = 0;
    state
      .adopt_if_newer(at(10), |_| {
        writes += 1;
        Ok::<_, ()>(())
      })
      .unwrap();

    assert_eq!(writes, 0);
  }

  #[test]
  fn description_updates_keep_state() {
    let state = SharedState::new();
    state.set_status(NodeState::Updating, "");
    state.set_description("applying assembly a");

    let status = state.status();
    assert_eq!(status.state, NodeState::Updating);
    assert_eq!(status.description, "applying assembly a");
  }
}
