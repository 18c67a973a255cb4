//! Durable storage for the desired-state document and the install ledger.
//!
//! # Layout
//!
//! ```text
//! {data_dir}/terra.redb
//! ├── state        # "manifest_list" -> JSON-encoded ManifestList
//! └── assemblies   # image reference -> captured install output (the ledger)
//! ```
//!
//! A ledger entry is a binary marker: its presence means the assembly was
//! installed successfully on this node. Entries are only ever overwritten by a
//! forced re-install, never removed.

mod types;

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use redb::{Database, DatabaseError, ReadableTable, TableDefinition};
use tracing::{debug, info};

use crate::manifest::ManifestList;

pub use types::StoreError;

const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("state");
const ASSEMBLIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("assemblies");

const MANIFEST_LIST_KEY: &str = "manifest_list";

/// Delay between two attempts to take the database lock.
const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Handle on the node's durable store.
///
/// redb serializes write transactions, so every write here is a single-writer
/// transaction that is durable once `commit` returns.
pub struct Store {
  db: Database,
  path: PathBuf,
}

impl std::fmt::Debug for Store {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Store").field("path", &self.path).finish()
  }
}

impl Store {
  /// Open (or create) the store, waiting up to `timeout` for exclusive access.
  ///
  /// Another process holding the database is retried until the deadline and
  /// then reported as [`StoreError::LockTimeout`]. The wait blocks the calling
  /// thread, so open the store before entering an async runtime.
  pub fn open(path: &Path, timeout: Duration) -> Result<Self, StoreError> {
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent).map_err(StoreError::CreateDir)?;
    }

    let deadline = Instant::now() + timeout;
    let db = loop {
      match Database::create(path) {
        Ok(db) => break db,
        Err(DatabaseError::DatabaseAlreadyOpen) if Instant::now() < deadline => {
          debug!(path = %path.display(), "store locked, retrying");
          std::thread::sleep(OPEN_RETRY_INTERVAL);
        }
        Err(DatabaseError::DatabaseAlreadyOpen) => {
          return Err(StoreError::LockTimeout {
            path: path.to_path_buf(),
            timeout,
          });
        }
        Err(e) => return Err(e.into()),
      }
    };

    // Create both tables up front so read transactions never see them missing.
    let txn = db.begin_write()?;
    txn.open_table(STATE_TABLE)?;
    txn.open_table(ASSEMBLIES_TABLE)?;
    txn.commit()?;

    info!(path = %path.display(), "opened store");

    Ok(Self {
      db,
      path: path.to_path_buf(),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Load the persisted manifest list.
  ///
  /// Returns `Ok(None)` if nothing has been applied to this node yet.
  pub fn load_manifest_list(&self) -> Result<Option<ManifestList>, StoreError> {
    let txn = self.db.begin_read()?;
    let table = txn.open_table(STATE_TABLE)?;

    match table.get(MANIFEST_LIST_KEY)? {
      Some(raw) => {
        let list = serde_json::from_slice(raw.value()).map_err(StoreError::Decode)?;
        Ok(Some(list))
      }
      None => Ok(None),
    }
  }

  /// Persist the full manifest list, replacing any previous one.
  pub fn save_manifest_list(&self, list: &ManifestList) -> Result<(), StoreError> {
    let data = serde_json::to_vec(list).map_err(StoreError::Encode)?;

    let txn = self.db.begin_write()?;
    {
      let mut table = txn.open_table(STATE_TABLE)?;
      table.insert(MANIFEST_LIST_KEY, data.as_slice())?;
    }
    txn.commit()?;

    debug!(updated = %list.updated, "persisted manifest list");
    Ok(())
  }

  /// Whether a ledger entry exists for `image`.
  pub fn is_installed(&self, image: &str) -> Result<bool, StoreError> {
    Ok(self.install_output(image)?.is_some())
  }

  /// Captured install output recorded for `image`, if any.
  pub fn install_output(&self, image: &str) -> Result<Option<Vec<u8>>, StoreError> {
    let txn = self.db.begin_read()?;
    let table = txn.open_table(ASSEMBLIES_TABLE)?;
    Ok(table.get(image)?.map(|raw| raw.value().to_vec()))
  }

  /// Record a successful install, overwriting any previous entry.
  pub fn record_install(&self, image: &str, output: &[u8]) -> Result<(), StoreError> {
    let txn = self.db.begin_write()?;
    {
      let mut table = txn.open_table(ASSEMBLIES_TABLE)?;
      table.insert(image, output)?;
    }
    txn.commit()?;

    debug!(image = %image, bytes = output.len(), "recorded install in ledger");
    Ok(())
  }

  /// Every image reference present in the ledger, in key order.
  pub fn installed(&self) -> Result<Vec<String>, StoreError> {
    let txn = self.db.begin_read()?;
    let table = txn.open_table(ASSEMBLIES_TABLE)?;

    let mut images = Vec::new();
    for entry in table.iter()? {
      let (key, _) = entry?;
      images.push(key.value().to_string());
    }
    Ok(images)
  }
}
