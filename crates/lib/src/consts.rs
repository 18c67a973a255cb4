//! Application-wide constants.

use std::time::Duration;

pub const APP_NAME: &str = "terra";

/// Prefix for environment variables read by the agent and exported to installs.
pub const ENV_PREFIX: &str = "TERRA_";

/// Default address the agent serves its RPC surface on.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:9005";

/// Interval between two synchronizer ticks.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound on a peer connection plus round-trip.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long startup waits for exclusive access to the store.
pub const DEFAULT_STORE_OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Executable invoked at the root of an unpacked assembly image.
pub const INSTALL_ENTRYPOINT: &str = "install";

/// File name of the durable store inside the data directory.
pub const STORE_FILENAME: &str = "terra.redb";

/// Directory (inside the data directory) searched for image archives by default.
pub const IMAGES_DIR: &str = "images";
