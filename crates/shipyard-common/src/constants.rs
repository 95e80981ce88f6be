//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Fallback data directory when no home directory is available.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/shipyard";

/// Returns the data directory, preferring `$HOME/.shipyard` and falling
/// back to `/var/lib/shipyard`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".shipyard");
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this session.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Returns the default root for persistent mount folders.
pub fn default_persistent_folders() -> PathBuf {
    data_dir().join("persistent_folders")
}

/// Application name, also the placeholder group for configuration values.
pub const APP_NAME: &str = "shipyard";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "shp";

/// Default manifest file name searched for in project directories.
pub const MANIFEST_FILE_NAME: &str = "Shipfile";

/// Name of the system created by fake manifests.
pub const FAKE_SYSTEM_NAME: &str = "--tmp--";

/// Default balancer domain used to derive system host names.
pub const DEFAULT_BALANCER_HOST: &str = "dev.shipyard.io";

/// Default balancer address.
pub const DEFAULT_BALANCER_IP: &str = "192.168.50.4";

/// Default balancer port.
pub const DEFAULT_BALANCER_PORT: u16 = 80;

/// Image used by fake manifests when the caller supplies none.
pub const DEFAULT_IMAGE: &str = "shipyard/base:latest";

/// Length in hex characters of a manifest namespace.
pub const NAMESPACE_LENGTH: usize = 10;

/// Subdirectory of the data directory holding meta records.
pub const META_DIR: &str = "meta";

/// Environment variable overriding the data directory.
pub const ENV_DATA_DIR: &str = "SHIPYARD_DATA_DIR";

/// Environment variable overriding the manifest file name.
pub const ENV_MANIFEST: &str = "SHIPYARD_MANIFEST";

/// Environment variable overriding the balancer domain.
pub const ENV_BALANCER_HOST: &str = "SHIPYARD_BALANCER_HOST";
