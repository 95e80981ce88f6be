//! Error types surfaced by the manifest engine.
//!
//! Callers match on [`Error`] to render user-facing messages; every
//! construction-time fault is carried by [`ManifestFault`] together with the
//! manifest file it was found in.

use std::path::PathBuf;

use shipyard_common::error::ShipyardError;
use thiserror::Error;

/// Errors returned by manifest discovery, construction and lookups.
#[derive(Debug, Error)]
pub enum Error {
    /// No manifest was found where one was mandatory.
    #[error("manifest not found in `{}` or any parent directory", path.display())]
    ManifestRequired {
        /// Directory the upward search started from.
        path: PathBuf,
    },

    /// The manifest could not be evaluated or failed validation.
    #[error("{fault} (manifest: {})", file.display())]
    Manifest {
        /// Manifest file the fault belongs to.
        file: PathBuf,
        /// What went wrong.
        fault: ManifestFault,
    },

    /// A requested system is absent from an already valid manifest.
    #[error("system `{system}` not found in manifest {}", file.display())]
    SystemNotFound {
        /// Requested system name.
        system: String,
        /// Manifest file that was searched.
        file: PathBuf,
    },

    /// An I/O, configuration or serialization failure.
    #[error(transparent)]
    Common(#[from] ShipyardError),
}

impl Error {
    /// Returns the manifest fault when this is a [`Error::Manifest`].
    #[must_use]
    pub const fn fault(&self) -> Option<&ManifestFault> {
        match self {
            Self::Manifest { fault, .. } => Some(fault),
            _ => None,
        }
    }
}

/// A construction-time fault of a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestFault {
    /// The script could not be evaluated.
    #[error("{message}")]
    Evaluation {
        /// Syntax or reference error message.
        message: String,
    },

    /// A system name contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid system name `{system}`, only letters, digits, `-` and `_` are allowed")]
    SystemNameInvalid {
        /// Offending name.
        system: String,
    },

    /// The same system was declared twice.
    #[error("system `{system}` is declared more than once")]
    DuplicateSystem {
        /// Repeated name.
        system: String,
    },

    /// A system has no image.
    #[error("system `{system}` has no image configured")]
    ImageRequired {
        /// System missing the image.
        system: String,
    },

    /// A system's image descriptor cannot be interpreted.
    #[error("system `{system}` has an invalid image: {message}")]
    ImageInvalid {
        /// System owning the descriptor.
        system: String,
        /// Why the descriptor was rejected.
        message: String,
    },

    /// The removed `balancer` option was used.
    #[error("system `{system}` uses the `balancer` option, which was replaced by `http`")]
    BalancerDeprecated {
        /// System using the option.
        system: String,
    },

    /// The removed `mount_folders` or `persistent_folders` option was used.
    #[error("system `{system}` uses the `{option}` option, which was replaced by `mounts`")]
    MountAndPersistentDeprecated {
        /// System using the option.
        system: String,
        /// Deprecated option name.
        option: String,
    },

    /// `extends` names a system that is not declared.
    #[error("system `{system}` cannot extend `{target}`: no such system")]
    ExtendsSystemInvalid {
        /// System carrying the `extends` field.
        system: String,
        /// Missing parent.
        target: String,
    },

    /// A system extends itself.
    #[error("system `{system}` cannot extend itself")]
    CannotExtendItself {
        /// Offending system.
        system: String,
    },

    /// A chain of `extends` loops back on itself.
    #[error("circular extends between `{system1}` and `{system2}`")]
    CircularExtends {
        /// System already being resolved.
        system1: String,
        /// System whose `extends` closed the loop.
        system2: String,
    },

    /// The `depends` relation contains a cycle.
    #[error("circular dependency between `{system1}` and `{system2}`")]
    CircularDependency {
        /// System already being visited.
        system1: String,
        /// System whose dependency closed the cycle.
        system2: String,
    },

    /// A system depends on an undeclared system.
    #[error("system `{system}` depends on `{depend}`, which is not declared")]
    DependsNotDeclared {
        /// System declaring the dependency.
        system: String,
        /// Missing dependency.
        depend: String,
    },

    /// `setDefault` names an undeclared system.
    #[error("invalid default system `{system}`: no such system")]
    InvalidDefault {
        /// Name passed to `setDefault`.
        system: String,
    },

    /// An option has the wrong shape.
    #[error("system `{system}` has an invalid `{option}` option: {message}")]
    InvalidOption {
        /// System owning the option.
        system: String,
        /// Option name.
        option: String,
        /// Why it was rejected.
        message: String,
    },

    /// A placeholder could not be expanded.
    #[error("system `{system}`: {source}")]
    Placeholder {
        /// System whose field was being expanded.
        system: String,
        /// Expansion failure.
        source: crate::placeholder::PlaceholderError,
    },

    /// The script declared no systems.
    #[error("no systems declared")]
    NoSystems,
}

impl ManifestFault {
    /// Stable message key identifying the kind of fault.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Evaluation { .. } => "manifest.evaluation",
            Self::SystemNameInvalid { .. } => "manifest.system_name_invalid",
            Self::DuplicateSystem { .. } => "manifest.duplicate_system",
            Self::ImageRequired { .. } => "manifest.image_required",
            Self::ImageInvalid { .. } => "manifest.image_invalid",
            Self::BalancerDeprecated { .. } => "manifest.balancer_deprecated",
            Self::MountAndPersistentDeprecated { .. } => {
                "manifest.mount_and_persistent_deprecated"
            }
            Self::ExtendsSystemInvalid { .. } => "manifest.extends_system_invalid",
            Self::CannotExtendItself { .. } => "manifest.cannot_extends_itself",
            Self::CircularExtends { .. } => "manifest.circular_extends",
            Self::CircularDependency { .. } => "manifest.circular_dependency",
            Self::DependsNotDeclared { .. } => "manifest.depends_not_declared",
            Self::InvalidDefault { .. } => "manifest.invalid_default",
            Self::InvalidOption { .. } => "manifest.invalid_option",
            Self::Placeholder { .. } => "manifest.placeholder",
            Self::NoSystems => "manifest.no_systems",
        }
    }

    pub(crate) fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }
}

/// Convenience alias for engine results.
pub type Result<T> = std::result::Result<T, Error>;
