//! Mount entries and host path resolution.
//!
//! Bind paths resolve against the manifest directory and then through a
//! [`PathResolver`]; persistent volumes live under the persistent-folders
//! root, namespaced by the manifest namespace.

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One entry of a system's `mounts` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Mount {
    /// A bare string: a bind path.
    Shorthand(String),
    /// A record with an explicit `type`.
    Typed(TypedMount),
}

/// Mount record with an explicit kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum TypedMount {
    /// Host directory bound into the container.
    Path {
        /// Host path, relative to the manifest directory.
        value: String,
    },
    /// Volume kept across container restarts.
    Persistent {
        /// Folder name under the namespaced persistent root.
        value: String,
    },
}

impl Mount {
    /// The host-side value as written.
    #[must_use]
    pub fn value(&self) -> &str {
        match self {
            Self::Shorthand(value)
            | Self::Typed(TypedMount::Path { value } | TypedMount::Persistent { value }) => value,
        }
    }

    /// Returns `true` for persistent volumes.
    #[must_use]
    pub const fn is_persistent(&self) -> bool {
        matches!(self, Self::Typed(TypedMount::Persistent { .. }))
    }
}

/// Maps host paths to the paths the container runtime sees.
pub trait PathResolver: Send + Sync + std::fmt::Debug {
    /// Resolves an absolute host path.
    fn resolve(&self, path: &Path) -> PathBuf;
}

/// Identity resolver, optionally re-rooting paths under a VM mount point.
#[derive(Debug, Clone, Default)]
pub struct HostPathResolver {
    vm_mount_point: Option<PathBuf>,
}

impl HostPathResolver {
    /// Creates a resolver; `vm_mount_point` is where the host tree is
    /// mounted inside a VM, if one is used.
    #[must_use]
    pub const fn new(vm_mount_point: Option<PathBuf>) -> Self {
        Self { vm_mount_point }
    }
}

impl PathResolver for HostPathResolver {
    fn resolve(&self, path: &Path) -> PathBuf {
        match &self.vm_mount_point {
            Some(root) => root.join(path.strip_prefix("/").unwrap_or(path)),
            None => path.to_path_buf(),
        }
    }
}

/// Lexically normalizes `path`, dropping `.` and folding `..`.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let _ = out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Locations a mount's host side is resolved against.
#[derive(Debug, Clone, Copy)]
pub struct MountRoots<'a> {
    /// Directory containing the manifest.
    pub manifest_dir: &'a Path,
    /// Persistent-folders root already joined with the namespace.
    pub persistent_dir: &'a Path,
    /// Resolver applied to bind paths.
    pub resolver: &'a dyn PathResolver,
}

/// Resolves the host side of `mount`, whose value has already been
/// placeholder-expanded into `value`.
///
/// A persistent value is always taken relative to the namespaced root: a
/// leading `/` is dropped.
///
/// # Errors
///
/// Returns a message when a persistent value climbs out of its root.
pub fn resolve_host_path(
    mount: &Mount,
    value: &str,
    roots: &MountRoots<'_>,
) -> Result<PathBuf, String> {
    if !mount.is_persistent() {
        return Ok(roots.resolver.resolve(&normalize(&roots.manifest_dir.join(value))));
    }
    let root = normalize(roots.persistent_dir);
    let relative: PathBuf = Path::new(value)
        .components()
        .filter(|c| !matches!(c, Component::RootDir | Component::Prefix(_)))
        .collect();
    let resolved = normalize(&root.join(relative));
    if resolved.starts_with(&root) {
        Ok(resolved)
    } else {
        Err(format!("persistent folder `{value}` escapes {}", root.display()))
    }
}
