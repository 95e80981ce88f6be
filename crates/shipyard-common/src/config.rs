//! Global configuration model for shipyard.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Root configuration consumed by the manifest engine and the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipyardConfig {
    /// File name searched for when discovering a manifest.
    pub manifest_file_name: String,
    /// Base directory for shipyard state (meta records live below it).
    pub data_dir: PathBuf,
    /// Root under which persistent mounts are namespaced.
    pub persistent_folders: PathBuf,
    /// Load balancer settings used for host names and placeholders.
    pub balancer: BalancerConfig,
    /// Image used when building a fake manifest.
    pub default_image: String,
    /// Mount point of the project tree inside a VM, when one is used.
    pub vm_mount_point: Option<PathBuf>,
}

/// Settings of the HTTP balancer fronting systems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// Domain suffix for generated host names.
    pub host: String,
    /// Address the balancer listens on.
    pub ip: String,
    /// Port the balancer listens on.
    pub port: u16,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            host: constants::DEFAULT_BALANCER_HOST.to_string(),
            ip: constants::DEFAULT_BALANCER_IP.to_string(),
            port: constants::DEFAULT_BALANCER_PORT,
        }
    }
}

impl Default for ShipyardConfig {
    fn default() -> Self {
        Self {
            manifest_file_name: constants::MANIFEST_FILE_NAME.to_string(),
            data_dir: constants::data_dir().clone(),
            persistent_folders: constants::default_persistent_folders(),
            balancer: BalancerConfig::default(),
            default_image: constants::DEFAULT_IMAGE.to_string(),
            vm_mount_point: None,
        }
    }
}

impl ShipyardConfig {
    /// Builds the default configuration with `SHIPYARD_*` environment
    /// overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Rebases the data directory and the persistent root under `dir`.
    #[must_use]
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self.persistent_folders = self.data_dir.join("persistent_folders");
        self
    }

    /// Directory holding the per-namespace meta records.
    #[must_use]
    pub fn meta_dir(&self) -> PathBuf {
        self.data_dir.join(constants::META_DIR)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup(constants::ENV_DATA_DIR).filter(|v| !v.is_empty()) {
            *self = std::mem::take(self).with_data_dir(dir);
        }
        if let Some(name) = lookup(constants::ENV_MANIFEST).filter(|v| !v.is_empty()) {
            self.manifest_file_name = name;
        }
        if let Some(host) = lookup(constants::ENV_BALANCER_HOST).filter(|v| !v.is_empty()) {
            self.balancer.host = host;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn defaults_use_constants() {
        let config = ShipyardConfig::default();
        assert_eq!(config.manifest_file_name, "Shipfile");
        assert_eq!(config.balancer.host, "dev.shipyard.io");
        assert!(config.vm_mount_point.is_none());
    }

    #[test]
    fn with_data_dir_moves_persistent_root() {
        let config = ShipyardConfig::default().with_data_dir("/tmp/sy");
        assert_eq!(config.persistent_folders, PathBuf::from("/tmp/sy/persistent_folders"));
        assert_eq!(config.meta_dir(), PathBuf::from("/tmp/sy/meta"));
    }

    #[test]
    fn overrides_replace_selected_fields() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("SHIPYARD_DATA_DIR", "/srv/shipyard"),
            ("SHIPYARD_MANIFEST", "Dockfile"),
            ("SHIPYARD_BALANCER_HOST", "lvh.me"),
        ]);
        let mut config = ShipyardConfig::default();
        config.apply_overrides(|key| env.get(key).map(ToString::to_string));
        assert_eq!(config.data_dir, PathBuf::from("/srv/shipyard"));
        assert_eq!(config.manifest_file_name, "Dockfile");
        assert_eq!(config.balancer.host, "lvh.me");
    }

    #[test]
    fn empty_overrides_are_ignored() {
        let mut config = ShipyardConfig::default();
        config.apply_overrides(|_| Some(String::new()));
        assert_eq!(config, ShipyardConfig::default());
    }
}
