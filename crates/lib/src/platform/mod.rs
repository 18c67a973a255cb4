pub mod paths;

/// Whether the agent runs with root privileges.
///
/// Elevated agents keep their data under the system data directory; everyone
/// else uses the per-user one.
#[cfg(unix)]
pub fn is_elevated() -> bool {
  rustix::process::geteuid().is_root()
}

#[cfg(not(unix))]
pub fn is_elevated() -> bool {
  false
}
