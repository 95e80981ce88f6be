//! Domain primitive types used across the shipyard workspace.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::NAMESPACE_LENGTH;

/// Short stable identifier derived from a manifest's absolute path.
///
/// The same path always yields the same namespace across runs; different
/// paths yield practically unique ones. Used to scope persistent storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Namespace(String);

impl Namespace {
    /// Derives the namespace of the manifest file at `path`.
    ///
    /// The caller is expected to pass a canonical absolute path.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        let digest = Sha256::digest(path.to_string_lossy().as_bytes());
        let mut hex = format!("{digest:x}");
        hex.truncate(NAMESPACE_LENGTH);
        Self(hex)
    }

    /// Returns the inner string representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_has_fixed_length() {
        let ns = Namespace::from_path(Path::new("/home/dev/project/Shipfile"));
        assert_eq!(ns.as_str().len(), 10);
        assert!(ns.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn namespace_is_stable_for_same_path() {
        let a = Namespace::from_path(Path::new("/a/Shipfile"));
        let b = Namespace::from_path(Path::new("/a/Shipfile"));
        assert_eq!(a, b);
    }

    #[test]
    fn namespace_differs_between_paths() {
        let a = Namespace::from_path(Path::new("/a/Shipfile"));
        let b = Namespace::from_path(Path::new("/b/Shipfile"));
        assert_ne!(a, b);
    }
}
