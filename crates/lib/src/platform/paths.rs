use crate::consts::{APP_NAME, ENV_PREFIX};
use crate::platform::is_elevated;
use std::path::PathBuf;

/// Returns the user's home directory
#[cfg(windows)]
pub fn home_dir() -> PathBuf {
  std::env::var_os("USERPROFILE")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("C:\\"))
}

/// Returns the user's home directory
#[cfg(not(windows))]
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("/"))
}

/// Returns the directory for data files of a system-wide agent
#[cfg(windows)]
pub fn system_data_dir() -> PathBuf {
  std::env::var_os("PROGRAMDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| PathBuf::from("C:\\ProgramData"))
    .join(APP_NAME)
}

/// Returns the directory for data files of a system-wide agent
#[cfg(not(windows))]
pub fn system_data_dir() -> PathBuf {
  PathBuf::from("/var/lib").join(APP_NAME)
}

/// Returns the directory for data files of a per-user agent
#[cfg(windows)]
pub fn data_dir() -> PathBuf {
  std::env::var_os("APPDATA")
    .map(PathBuf::from)
    .unwrap_or_else(|| home_dir().join("AppData").join("Roaming"))
    .join(APP_NAME)
}

/// Returns the directory for data files of a per-user agent
#[cfg(not(windows))]
pub fn data_dir() -> PathBuf {
  let data_home = std::env::var("XDG_DATA_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".local").join("share"));
  data_home.join(APP_NAME)
}

/// Data directory used when none is configured.
///
/// `TERRA_DATA_DIR` wins, then the system directory for elevated agents, then
/// the user directory.
pub fn default_data_dir() -> PathBuf {
  if let Some(path) = std::env::var_os(format!("{ENV_PREFIX}DATA_DIR")) {
    return PathBuf::from(path);
  }

  if is_elevated() { system_data_dir() } else { data_dir() }
}
