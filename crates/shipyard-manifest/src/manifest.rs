//! Manifest discovery and the public facade over the engine.
//!
//! Construction runs the whole pipeline once: evaluate the script, check
//! the default, resolve `extends`, resolve images, build the dependency
//! graph and normalize every system. A [`Manifest`] is either fully valid
//! or never returned.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value, json};
use shipyard_common::config::ShipyardConfig;
use shipyard_common::constants::FAKE_SYSTEM_NAME;
use shipyard_common::error::ShipyardError;
use shipyard_common::types::Namespace;

use crate::error::{Error, ManifestFault, Result};
use crate::graph::DependencyGraph;
use crate::image::{DockerImageResolver, ImageContext, ImageResolver};
use crate::inheritance;
use crate::meta::MetaStore;
use crate::mount::{HostPathResolver, MountRoots, PathResolver};
use crate::placeholder::{ManifestVars, PlaceholderContext};
use crate::registry::Registry;
use crate::system::{self, ManifestRef, NormalizeContext, System};

/// Walks up from `start` looking for a file named `file_name`.
#[must_use]
pub fn find_manifest(start: &Path, file_name: &str) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(file_name))
        .find(|candidate| candidate.is_file())
}

/// Configures how manifests are loaded.
pub struct ManifestLoader {
    config: ShipyardConfig,
    image_resolver: Box<dyn ImageResolver>,
    path_resolver: Box<dyn PathResolver>,
    envs: Option<BTreeMap<String, String>>,
}

impl std::fmt::Debug for ManifestLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestLoader")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ManifestLoader {
    /// Creates a loader with the default image and path resolvers and the
    /// process environment.
    #[must_use]
    pub fn new(config: ShipyardConfig) -> Self {
        let path_resolver = HostPathResolver::new(config.vm_mount_point.clone());
        Self {
            config,
            image_resolver: Box::new(DockerImageResolver),
            path_resolver: Box::new(path_resolver),
            envs: None,
        }
    }

    /// Replaces the image resolver.
    #[must_use]
    pub fn with_image_resolver(mut self, resolver: impl ImageResolver + 'static) -> Self {
        self.image_resolver = Box::new(resolver);
        self
    }

    /// Replaces the host path resolver.
    #[must_use]
    pub fn with_path_resolver(mut self, resolver: impl PathResolver + 'static) -> Self {
        self.path_resolver = Box::new(resolver);
        self
    }

    /// Uses `envs` for the `envs.*` placeholder group instead of the
    /// process environment.
    #[must_use]
    pub fn with_envs(mut self, envs: BTreeMap<String, String>) -> Self {
        self.envs = Some(envs);
        self
    }

    /// Finds and loads the manifest governing `start`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestRequired`] when no manifest exists in
    /// `start` or above it, and any construction error otherwise.
    pub fn open(self, start: &Path) -> Result<Manifest> {
        let start = canonical(start)?;
        match find_manifest(&start, &self.config.manifest_file_name) {
            Some(file) => self.load_file(&file),
            None => Err(Error::ManifestRequired { path: start }),
        }
    }

    /// Like [`ManifestLoader::open`], returning `None` when no manifest
    /// exists.
    ///
    /// # Errors
    ///
    /// Fails when a manifest is found but cannot be loaded.
    pub fn open_optional(self, start: &Path) -> Result<Option<Manifest>> {
        let start = canonical(start)?;
        find_manifest(&start, &self.config.manifest_file_name)
            .map(|file| self.load_file(&file))
            .transpose()
    }

    /// Loads the manifest at `file`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or the manifest is invalid.
    pub fn load_file(self, file: &Path) -> Result<Manifest> {
        let file = canonical(file)?;
        let source = std::fs::read_to_string(&file).map_err(|e| ShipyardError::io(&file, e))?;
        tracing::info!(path = %file.display(), "loading manifest");
        self.load_source(file, &source)
    }

    /// Builds a manifest from `source` as if it were read from `file`,
    /// which should be absolute.
    ///
    /// # Errors
    ///
    /// Fails when the manifest is invalid.
    pub fn load_source(self, file: PathBuf, source: &str) -> Result<Manifest> {
        let registry = Registry::evaluate(source).map_err(|fault| Error::Manifest {
            file: file.clone(),
            fault,
        })?;
        self.build(file, registry, false)
    }

    /// Builds a one-system manifest for `dir`, which need not contain a
    /// manifest file. The system is named `--tmp--` and mounts `dir`.
    ///
    /// # Errors
    ///
    /// Fails when `image` is not a valid image reference.
    pub fn make_fake(self, dir: &Path, image: &str) -> Result<Manifest> {
        let file = dir.join(&self.config.manifest_file_name);
        let mut registry = Registry::default();
        let options = json!({
            "image": { "docker": image },
            "workdir": "/azk/#{manifest.dir}",
            "shell": "/bin/sh",
            "mounts": {
                "/azk/#{manifest.dir}": { "type": "path", "value": "." },
            },
        });
        let options = options.as_object().cloned().unwrap_or_default();
        registry
            .register(FAKE_SYSTEM_NAME, options)
            .map_err(|fault| Error::Manifest {
                file: file.clone(),
                fault,
            })?;
        self.build(file, registry, true)
    }

    fn build(self, file: PathBuf, registry: Registry, fake: bool) -> Result<Manifest> {
        let manifest_error = |fault: ManifestFault| Error::Manifest {
            file: file.clone(),
            fault,
        };

        let dir = file
            .parent()
            .map_or_else(|| PathBuf::from("/"), Path::to_path_buf);
        let namespace = Namespace::from_path(&file);

        registry.validate_default().map_err(manifest_error)?;
        let (raw, default_system) = registry.into_parts();
        if raw.is_empty() {
            return Err(manifest_error(ManifestFault::NoSystems));
        }
        let resolved = inheritance::resolve_extends(&raw).map_err(manifest_error)?;

        let mut descriptors = Vec::with_capacity(resolved.len());
        let mut images = BTreeMap::new();
        for raw in &resolved {
            let descriptor = system::read_image(raw).map_err(manifest_error)?;
            let ctx = ImageContext {
                system: &raw.name,
                namespace: namespace.as_str(),
            };
            let image = self
                .image_resolver
                .resolve(&descriptor, &ctx)
                .map_err(|message| {
                    manifest_error(ManifestFault::ImageInvalid {
                        system: raw.name.clone(),
                        message,
                    })
                })?;
            let _ = images.insert(raw.name.clone(), image);
            descriptors.push(descriptor);
        }

        let depends = resolved
            .iter()
            .map(system::read_depends)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(manifest_error)?;
        let graph = DependencyGraph::build(
            resolved
                .iter()
                .zip(&depends)
                .map(|(raw, deps)| (raw.name.as_str(), deps.iter().map(String::as_str))),
        )
        .map_err(manifest_error)?;

        let envs = self.envs.unwrap_or_else(|| std::env::vars().collect());
        let dir_name = system::dir_name(&dir);
        let persistent_dir = self.config.persistent_folders.join(namespace.as_str());
        let manifest_ref = Arc::new(ManifestRef {
            file: file.clone(),
            dir: dir.clone(),
            namespace: namespace.clone(),
        });
        let ctx = NormalizeContext {
            placeholders: PlaceholderContext::new(
                ManifestVars {
                    dir_name: &dir_name,
                    path: &dir,
                    namespace: namespace.as_str(),
                },
                &envs,
                &self.config,
                &images,
            ),
            roots: MountRoots {
                manifest_dir: &dir,
                persistent_dir: &persistent_dir,
                resolver: self.path_resolver.as_ref(),
            },
            manifest: manifest_ref,
        };

        let mut systems = Vec::with_capacity(resolved.len());
        for ((raw, descriptor), deps) in resolved.iter().zip(descriptors).zip(depends) {
            let image = images.get(&raw.name).cloned().unwrap_or_default();
            let system =
                system::normalize(raw, image, descriptor, deps, &ctx).map_err(manifest_error)?;
            systems.push(system);
        }
        let index = systems
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.name().to_string(), idx))
            .collect();

        tracing::debug!(
            path = %file.display(),
            namespace = %namespace,
            systems = systems.len(),
            "manifest resolved"
        );
        let meta = MetaStore::new(&self.config.meta_dir(), namespace.clone());
        Ok(Manifest {
            file,
            dir,
            dir_name,
            namespace,
            systems,
            index,
            default_system,
            graph,
            envs,
            images,
            config: self.config,
            meta,
            fake,
        })
    }
}

fn canonical(path: &Path) -> Result<PathBuf> {
    std::fs::canonicalize(path).map_err(|e| Error::Common(ShipyardError::io(path, e)))
}

/// A loaded, fully validated manifest.
#[derive(Debug)]
pub struct Manifest {
    file: PathBuf,
    dir: PathBuf,
    dir_name: String,
    namespace: Namespace,
    systems: Vec<System>,
    index: HashMap<String, usize>,
    default_system: Option<String>,
    graph: DependencyGraph,
    envs: BTreeMap<String, String>,
    images: BTreeMap<String, String>,
    config: ShipyardConfig,
    meta: MetaStore,
    fake: bool,
}

impl Manifest {
    /// Finds and loads the manifest governing `start` with default
    /// resolvers.
    ///
    /// # Errors
    ///
    /// See [`ManifestLoader::open`].
    pub fn open(start: &Path, config: ShipyardConfig) -> Result<Self> {
        ManifestLoader::new(config).open(start)
    }

    /// Like [`Manifest::open`], returning `None` when no manifest exists.
    ///
    /// # Errors
    ///
    /// See [`ManifestLoader::open_optional`].
    pub fn open_optional(start: &Path, config: ShipyardConfig) -> Result<Option<Self>> {
        ManifestLoader::new(config).open_optional(start)
    }

    /// Builds a one-system manifest for a directory without one.
    ///
    /// # Errors
    ///
    /// See [`ManifestLoader::make_fake`].
    pub fn make_fake(dir: &Path, image: &str, config: ShipyardConfig) -> Result<Self> {
        ManifestLoader::new(config).make_fake(dir, image)
    }

    /// Manifest file path.
    #[must_use]
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Directory containing the manifest.
    #[must_use]
    pub fn manifest_path(&self) -> &Path {
        &self.dir
    }

    /// Base name of the manifest directory.
    #[must_use]
    pub fn manifest_dir_name(&self) -> &str {
        &self.dir_name
    }

    /// Stable namespace of this manifest.
    #[must_use]
    pub const fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Returns `true` for manifests built by [`Manifest::make_fake`].
    #[must_use]
    pub const fn is_fake(&self) -> bool {
        self.fake
    }

    /// Configuration the manifest was built with.
    #[must_use]
    pub const fn config(&self) -> &ShipyardConfig {
        &self.config
    }

    /// Systems in declaration order.
    #[must_use]
    pub fn systems(&self) -> &[System] {
        &self.systems
    }

    /// Looks up a system by name.
    #[must_use]
    pub fn get_system(&self, name: &str) -> Option<&System> {
        self.index.get(name).map(|&idx| &self.systems[idx])
    }

    /// Looks up a system by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemNotFound`] for an unknown name.
    pub fn system(&self, name: &str) -> Result<&System> {
        self.get_system(name).ok_or_else(|| self.not_found(name))
    }

    /// Name given to `setDefault`, if any.
    #[must_use]
    pub fn default_system_name(&self) -> Option<&str> {
        self.default_system.as_deref()
    }

    /// The default system: the one named by `setDefault`, otherwise the
    /// first declared.
    #[must_use]
    pub fn system_default(&self) -> &System {
        self.default_system
            .as_deref()
            .and_then(|name| self.get_system(name))
            .unwrap_or(&self.systems[0])
    }

    /// Systems named in a comma-separated list, in declaration order.
    /// `None` or an empty list returns every system.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemNotFound`] for an unknown name.
    pub fn get_systems_by_name(&self, names: Option<&str>) -> Result<Vec<&System>> {
        let requested = split_names(names.unwrap_or_default());
        if requested.is_empty() {
            return Ok(self.systems.iter().collect());
        }
        if let Some(missing) = requested.iter().find(|name| !self.index.contains_key(**name)) {
            return Err(self.not_found(missing));
        }
        Ok(self
            .systems
            .iter()
            .filter(|s| requested.contains(&s.name()))
            .collect())
    }

    /// Systems in dependency order. With names, only their transitive
    /// dependency closure is returned, requested systems visited in the
    /// order given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemNotFound`] for an unknown name.
    pub fn systems_in_order(&self, names: Option<&str>) -> Result<Vec<&System>> {
        let requested = split_names(names.unwrap_or_default());
        if requested.is_empty() {
            return Ok(self.lookup_all(self.graph.order()));
        }
        self.systems_in_order_of(requested)
    }

    /// Dependency closure of the listed systems, dependencies first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SystemNotFound`] for an unknown name.
    pub fn systems_in_order_of<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Vec<&System>> {
        let order = self
            .graph
            .order_for(names)
            .map_err(|missing| self.not_found(&missing))?;
        Ok(self.lookup_all(&order))
    }

    fn lookup_all(&self, names: &[String]) -> Vec<&System> {
        names.iter().filter_map(|name| self.get_system(name)).collect()
    }

    /// Placeholder context over this manifest, without a current system.
    #[must_use]
    pub fn placeholder_context(&self) -> PlaceholderContext<'_> {
        PlaceholderContext::new(
            ManifestVars {
                dir_name: &self.dir_name,
                path: &self.dir,
                namespace: self.namespace.as_str(),
            },
            &self.envs,
            &self.config,
            &self.images,
        )
    }

    /// Reads a meta value.
    ///
    /// # Errors
    ///
    /// Fails when the stored record cannot be read.
    pub fn get_meta(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.meta.get(key)?)
    }

    /// Sets a meta value in memory.
    ///
    /// # Errors
    ///
    /// Fails when the stored record cannot be read.
    pub fn set_meta(&self, key: impl Into<String>, value: Value) -> Result<()> {
        Ok(self.meta.set(key, value)?)
    }

    /// Writes the meta values set since the last persist or clean to disk.
    ///
    /// # Errors
    ///
    /// Fails on I/O or serialization errors.
    pub async fn persist_meta(&self) -> Result<()> {
        Ok(self.meta.persist().await?)
    }

    /// Clears meta values in memory and on disk.
    ///
    /// # Errors
    ///
    /// Fails when the stored record cannot be removed.
    pub async fn clean_meta(&self) -> Result<()> {
        Ok(self.meta.clean().await?)
    }

    /// The manifest's systems as generator input: option records in
    /// declaration order plus the default name.
    #[must_use]
    pub fn to_data(&self) -> crate::generator::ManifestData {
        let mut systems = Map::new();
        for system in &self.systems {
            let record = crate::generator::system_record(system);
            let _ = systems.insert(system.name().to_string(), record);
        }
        crate::generator::ManifestData {
            systems,
            default_system: self.default_system.clone(),
        }
    }

    fn not_found(&self, name: &str) -> Error {
        Error::SystemNotFound {
            system: name.to_string(),
            file: self.file.clone(),
        }
    }
}

fn split_names(names: &str) -> Vec<&str> {
    names
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader() -> ManifestLoader {
        let tmp = std::env::temp_dir();
        ManifestLoader::new(ShipyardConfig::default().with_data_dir(tmp.join("shipyard-unit")))
            .with_envs(BTreeMap::new())
    }

    fn load(source: &str) -> Result<Manifest> {
        loader().load_source(PathBuf::from("/projects/blog/Shipfile"), source)
    }

    #[test]
    fn resolves_basic_manifest() {
        let manifest = load(
            r#"
            system("front", { depends: ["db"], image: { docker: "base:0.1" } });
            system("db", { image: { docker: "postgres" } });
            "#,
        )
        .expect("should load");
        assert_eq!(manifest.manifest_dir_name(), "blog");
        assert_eq!(manifest.namespace().as_str().len(), 10);
        let names: Vec<&str> = manifest
            .systems_in_order(None)
            .expect("order")
            .iter()
            .map(|s| s.name())
            .collect();
        assert_eq!(names, vec!["db", "front"]);
        assert_eq!(manifest.system_default().name(), "front");
    }

    #[test]
    fn empty_manifest_is_rejected() {
        let err = load("// nothing here").expect_err("should fail");
        assert_eq!(err.fault().map(ManifestFault::key), Some("manifest.no_systems"));
    }

    #[test]
    fn split_names_ignores_blanks() {
        assert_eq!(split_names(" a, ,b "), vec!["a", "b"]);
        assert!(split_names("").is_empty());
    }

    #[test]
    fn unknown_system_lookup() {
        let manifest = load("system('db', { image: { docker: 'postgres' } })").expect("load");
        assert!(matches!(
            manifest.system("ghost"),
            Err(Error::SystemNotFound { ref system, .. }) if system == "ghost"
        ));
        assert!(manifest.get_systems_by_name(Some("db,ghost")).is_err());
        assert!(manifest.systems_in_order(Some("ghost")).is_err());
        assert!(manifest.systems_in_order_of(["db", "ghost"]).is_err());
        assert_eq!(manifest.systems_in_order_of(["db"]).expect("known").len(), 1);
    }

    #[test]
    fn image_resolver_errors_become_image_invalid() {
        struct Refusing;
        impl ImageResolver for Refusing {
            fn resolve(
                &self,
                _: &crate::image::ImageDescriptor,
                _: &ImageContext<'_>,
            ) -> std::result::Result<String, String> {
                Err("registry unreachable".into())
            }
        }
        let err = loader()
            .with_image_resolver(Refusing)
            .load_source(PathBuf::from("/p/Shipfile"), "system('db', { image: 'postgres' })")
            .expect_err("should fail");
        assert_eq!(err.fault().map(ManifestFault::key), Some("manifest.image_invalid"));
    }

    #[test]
    fn path_resolver_reroots_bind_mounts() {
        let manifest = loader()
            .with_path_resolver(HostPathResolver::new(Some(PathBuf::from("/mnt/host"))))
            .load_source(
                PathBuf::from("/projects/blog/Shipfile"),
                "system('web', { image: 'nginx', mounts: { '/src': '.', '/data': \
                 { type: 'persistent', value: 'data' } } })",
            )
            .expect("load");
        let mounts = manifest.system("web").expect("web").mounts();
        assert_eq!(mounts["/src"], PathBuf::from("/mnt/host/projects/blog"));
        let persistent = std::env::temp_dir()
            .join("shipyard-unit")
            .join("persistent_folders")
            .join(manifest.namespace().as_str())
            .join("data");
        assert_eq!(mounts["/data"], persistent);
    }

    #[test]
    fn manifest_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Manifest>();
    }
}
