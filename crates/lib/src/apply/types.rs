//! Result and error types for apply passes.

use std::fmt;

use thiserror::Error;

use crate::cluster::MembershipError;
use crate::image::ImageError;
use crate::store::StoreError;

use super::install::InstallError;

/// Why a single assembly could not be applied.
#[derive(Debug, Error)]
pub enum ApplyError {
  #[error("ledger error: {0}")]
  Ledger(#[from] StoreError),

  #[error("{0}")]
  Image(#[from] ImageError),

  #[error("{0}")]
  Install(#[from] InstallError),

  #[error("failed to list peers: {0}")]
  Membership(#[from] MembershipError),

  #[error("failed to create scratch directory: {0}")]
  Scratch(#[source] std::io::Error),
}

/// One failed assembly or dependency within a pass.
#[derive(Debug)]
pub struct AssemblyFailure {
  pub image: String,
  pub error: ApplyError,
}

impl fmt::Display for AssemblyFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}: {}", self.image, self.error)
  }
}

/// What happened to one assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
  /// Fetched, installed, and recorded in the ledger.
  Installed,
  /// Already in the ledger and not forced.
  Skipped,
}

/// Summary of one apply pass.
///
/// Images appear in the order they were attempted. A dependency shared by
/// several assemblies appears once per attempt.
#[derive(Debug, Default)]
pub struct PassReport {
  pub installed: Vec<String>,
  pub skipped: Vec<String>,
  pub failures: Vec<AssemblyFailure>,
}

impl PassReport {
  pub fn is_success(&self) -> bool {
    self.failures.is_empty()
  }

  pub fn attempted(&self) -> usize {
    self.installed.len() + self.skipped.len() + self.failures.len()
  }

  pub(crate) fn record(&mut self, image: &str, result: Result<Outcome, ApplyError>) {
    match result {
      Ok(Outcome::Installed) => self.installed.push(image.to_string()),
      Ok(Outcome::Skipped) => self.skipped.push(image.to_string()),
      Err(error) => self.failures.push(AssemblyFailure {
        image: image.to_string(),
        error,
      }),
    }
  }

  /// Status description for a failed pass: every failure, comma-joined.
  pub fn failure_description(&self) -> String {
    self
      .failures
      .iter()
      .map(ToString::to_string)
      .collect::<Vec<_>>()
      .join(", ")
  }
}
