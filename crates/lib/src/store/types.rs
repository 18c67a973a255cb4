use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error(
    "store is locked by another process: {path} (waited {timeout:?})\n\
     If you're sure no terra agent is running on this data directory, check for a stale process."
  )]
  LockTimeout { path: PathBuf, timeout: Duration },

  #[error("failed to create store directory: {0}")]
  CreateDir(#[source] io::Error),

  #[error("failed to open store: {0}")]
  Open(#[from] redb::DatabaseError),

  #[error("store transaction failed: {0}")]
  Transaction(#[from] redb::TransactionError),

  #[error("store table error: {0}")]
  Table(#[from] redb::TableError),

  #[error("store storage error: {0}")]
  Storage(#[from] redb::StorageError),

  #[error("store commit failed: {0}")]
  Commit(#[from] redb::CommitError),

  #[error("failed to encode manifest list: {0}")]
  Encode(#[source] serde_json::Error),

  #[error("failed to decode persisted manifest list: {0}")]
  Decode(#[source] serde_json::Error),
}
