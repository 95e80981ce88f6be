//! Image descriptors and their resolution to canonical names.
//!
//! A system's `image` option is parsed into an [`ImageDescriptor`] and
//! handed to an [`ImageResolver`], which returns the canonical
//! `repository:tag` string stored on the system.

use serde::Deserialize;
use serde_json::Value;
use shipyard_common::constants::APP_NAME;

/// Tag used when a descriptor names none.
pub const DEFAULT_TAG: &str = "latest";

/// Where a system's image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageDescriptor {
    /// An image pulled from a registry.
    Docker {
        /// Repository, possibly with a registry host.
        repository: String,
        /// Tag, `latest` when absent.
        tag: Option<String>,
    },
    /// An image built locally from a Dockerfile.
    Dockerfile {
        /// Path of the Dockerfile or its directory, relative to the manifest.
        path: String,
    },
}

#[derive(Debug, Deserialize)]
struct RawImage {
    provider: Option<String>,
    repository: Option<String>,
    tag: Option<String>,
    docker: Option<String>,
    dockerfile: Option<String>,
}

impl ImageDescriptor {
    /// Parses the `image` option.
    ///
    /// Accepted shapes are `"repo[:tag]"`, `{docker: "repo[:tag]"}`,
    /// `{provider: "docker", repository, tag}` and `{dockerfile: "path"}`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the value has none of
    /// these shapes.
    pub fn from_value(value: &Value) -> Result<Self, String> {
        if let Value::String(reference) = value {
            return Self::from_reference(reference);
        }
        let raw: RawImage = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;

        if let Some(reference) = raw.docker {
            return Self::from_reference(&reference);
        }
        if let Some(path) = raw.dockerfile {
            return Ok(Self::Dockerfile { path });
        }
        match (raw.provider.as_deref(), raw.repository) {
            (None | Some("docker"), Some(repository)) if !repository.is_empty() => {
                Ok(Self::Docker {
                    repository,
                    tag: raw.tag,
                })
            }
            (Some(provider), _) if provider != "docker" => {
                Err(format!("unsupported image provider `{provider}`"))
            }
            _ => Err("expected `docker`, `dockerfile` or `repository`".to_string()),
        }
    }

    /// Renders the descriptor back into its record form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            Self::Docker { repository, tag: Some(tag) } => {
                serde_json::json!({ "docker": format!("{repository}:{tag}") })
            }
            Self::Docker { repository, tag: None } => serde_json::json!({ "docker": repository }),
            Self::Dockerfile { path } => serde_json::json!({ "dockerfile": path }),
        }
    }

    /// Parses a `repo[:tag]` reference. A colon that belongs to a registry
    /// host (`localhost:5000/app`) is not a tag separator.
    fn from_reference(reference: &str) -> Result<Self, String> {
        if reference.trim().is_empty() {
            return Err("empty image reference".to_string());
        }
        let name_start = reference.rfind('/').map_or(0, |idx| idx + 1);
        match reference[name_start..].rfind(':') {
            Some(idx) => {
                let split = name_start + idx;
                Ok(Self::Docker {
                    repository: reference[..split].to_string(),
                    tag: Some(reference[split + 1..].to_string()),
                })
            }
            None => Ok(Self::Docker {
                repository: reference.to_string(),
                tag: None,
            }),
        }
    }
}

/// Facts about the system an image is resolved for.
#[derive(Debug, Clone, Copy)]
pub struct ImageContext<'a> {
    /// System owning the image.
    pub system: &'a str,
    /// Namespace of the owning manifest.
    pub namespace: &'a str,
}

/// Turns an image descriptor into a canonical `repository:tag` string.
pub trait ImageResolver: Send + Sync {
    /// Resolves `descriptor` for the system described by `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem when the descriptor cannot be
    /// resolved.
    fn resolve(
        &self,
        descriptor: &ImageDescriptor,
        ctx: &ImageContext<'_>,
    ) -> Result<String, String>;
}

/// Default resolver naming registry images as-is and local builds after
/// the manifest namespace.
#[derive(Debug, Clone, Copy, Default)]
pub struct DockerImageResolver;

impl ImageResolver for DockerImageResolver {
    fn resolve(
        &self,
        descriptor: &ImageDescriptor,
        ctx: &ImageContext<'_>,
    ) -> Result<String, String> {
        match descriptor {
            ImageDescriptor::Docker { repository, tag } => Ok(format!(
                "{repository}:{}",
                tag.as_deref().filter(|t| !t.is_empty()).unwrap_or(DEFAULT_TAG)
            )),
            ImageDescriptor::Dockerfile { .. } => Ok(format!(
                "{APP_NAME}/{}-sys-{}:{DEFAULT_TAG}",
                ctx.namespace,
                ctx.system.to_lowercase()
            )),
        }
    }
}
