//! Normalized system model.
//!
//! A [`System`] is built once from an inheritance-resolved declaration and
//! never mutated afterwards. Normalization turns the loosely typed options
//! record into [`SystemOptions`], expands templated fields and resolves
//! mounts and host names.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use shipyard_common::types::Namespace;

use crate::error::ManifestFault;
use crate::image::ImageDescriptor;
use crate::mount::{self, Mount, MountRoots};
use crate::placeholder::{self, PlaceholderContext, PlaceholderError};
use crate::registry::RawSystem;

/// Domain template used for `http: true`.
pub const DEFAULT_DOMAIN_TEMPLATE: &str = "#{system.name}.#{shipyard.default_domain}";

/// Options the engine interprets. Anything else in a declaration is ignored.
const KNOWN_OPTIONS: &[&str] = &[
    "image",
    "depends",
    "workdir",
    "command",
    "shell",
    "envs",
    "export_envs",
    "mounts",
    "scalable",
    "http",
    "provision",
    "ports",
    "wait",
];

/// Non-owning link from a system to the manifest that declared it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestRef {
    /// Manifest file path.
    pub file: PathBuf,
    /// Directory containing the manifest.
    pub dir: PathBuf,
    /// Namespace of the manifest.
    pub namespace: Namespace,
}

/// Command run by a system's container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Command {
    /// A string run through the system's shell.
    Shell(String),
    /// An argument vector executed directly.
    Args(Vec<String>),
}

/// Number of instances started for a system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScalePolicy {
    /// Instances started by default.
    pub default: u32,
    /// Upper bound on instances, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

impl Default for ScalePolicy {
    fn default() -> Self {
        Self {
            default: 1,
            limit: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawScale {
    Flag(bool),
    Policy(ScalePolicy),
}

impl From<RawScale> for ScalePolicy {
    fn from(raw: RawScale) -> Self {
        match raw {
            RawScale::Flag(true) => Self::default(),
            RawScale::Flag(false) => Self {
                default: 0,
                limit: None,
            },
            RawScale::Policy(policy) => policy,
        }
    }
}

/// HTTP exposure through the balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpOptions {
    /// Domain templates, each expanded into one host name.
    pub domains: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawHttp {
    Flag(bool),
    Options(HttpOptions),
}

/// How long to wait for a system to come up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WaitPolicy {
    /// Number of connection attempts.
    pub retry: u32,
    /// Milliseconds between attempts.
    #[serde(default = "WaitPolicy::default_timeout")]
    pub timeout: u64,
}

impl WaitPolicy {
    const fn default_timeout() -> u64 {
        1000
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawWait {
    Retries(u32),
    Policy(WaitPolicy),
}

/// Typed, normalized options of a system.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SystemOptions {
    /// Working directory inside the container, placeholders expanded.
    pub workdir: Option<String>,
    /// Command to run.
    pub command: Option<Command>,
    /// Shell used for string commands and provisioning.
    pub shell: Option<String>,
    /// Environment passed to the container.
    pub envs: BTreeMap<String, String>,
    /// Environment exported to dependents; templates kept unexpanded.
    pub export_envs: BTreeMap<String, String>,
    /// Mount table as declared, keyed by container path.
    pub mounts: BTreeMap<String, Mount>,
    /// Instance count policy.
    pub scalable: ScalePolicy,
    /// HTTP exposure, `None` when the system is not exposed.
    pub http: Option<HttpOptions>,
    /// Provisioning commands run before the first start.
    pub provision: Vec<String>,
    /// Published ports by name; `None` disables an inherited port.
    pub ports: BTreeMap<String, Option<String>>,
    /// Start-up wait policy.
    pub wait: Option<WaitPolicy>,
}

/// A validated, normalized service.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    name: String,
    image: String,
    image_descriptor: ImageDescriptor,
    depends: Vec<String>,
    options: SystemOptions,
    mounts: BTreeMap<String, PathBuf>,
    hosts: Vec<String>,
    manifest: Arc<ManifestRef>,
}

impl System {
    /// System name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Canonical `repository:tag` image name.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }

    /// Image descriptor the name was resolved from.
    #[must_use]
    pub const fn image_descriptor(&self) -> &ImageDescriptor {
        &self.image_descriptor
    }

    /// Dependencies in declared order, without duplicates.
    #[must_use]
    pub fn depends(&self) -> &[String] {
        &self.depends
    }

    /// Normalized options.
    #[must_use]
    pub const fn options(&self) -> &SystemOptions {
        &self.options
    }

    /// Resolved mounts: container path to absolute host path.
    #[must_use]
    pub const fn mounts(&self) -> &BTreeMap<String, PathBuf> {
        &self.mounts
    }

    /// Host names served by the balancer for this system.
    #[must_use]
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// The manifest this system belongs to.
    #[must_use]
    pub fn manifest(&self) -> &ManifestRef {
        &self.manifest
    }

    /// Expands `export_envs` once a network allocation is known. `ctx` must
    /// carry the allocation (see [`PlaceholderContext::with_network`]).
    ///
    /// # Errors
    ///
    /// Returns the first placeholder that cannot be expanded.
    pub fn expand_export_envs(
        &self,
        ctx: &PlaceholderContext<'_>,
    ) -> Result<BTreeMap<String, String>, PlaceholderError> {
        let ctx = ctx.with_system(&self.name);
        self.options
            .export_envs
            .iter()
            .map(|(key, template)| Ok((key.clone(), placeholder::expand(template, &ctx)?)))
            .collect()
    }
}

/// Everything normalization needs besides the declaration itself.
pub(crate) struct NormalizeContext<'a> {
    pub placeholders: PlaceholderContext<'a>,
    pub roots: MountRoots<'a>,
    pub manifest: Arc<ManifestRef>,
}

/// Reads the `depends` option: a name or a list of names, deduplicated in
/// declared order.
pub(crate) fn read_depends(raw: &RawSystem) -> Result<Vec<String>, ManifestFault> {
    let names: Vec<String> = match raw.options.get("depends") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::String(name)) => vec![name.clone()],
        Some(other) => serde_json::from_value(other.clone())
            .map_err(|e| invalid(&raw.name, "depends", &e.to_string()))?,
    };
    let mut unique = Vec::with_capacity(names.len());
    for name in names {
        if !unique.contains(&name) {
            unique.push(name);
        }
    }
    Ok(unique)
}

/// Reads the mandatory `image` option.
pub(crate) fn read_image(raw: &RawSystem) -> Result<ImageDescriptor, ManifestFault> {
    match raw.options.get("image") {
        None | Some(Value::Null) => Err(ManifestFault::ImageRequired {
            system: raw.name.clone(),
        }),
        Some(value) => {
            ImageDescriptor::from_value(value).map_err(|message| ManifestFault::ImageInvalid {
                system: raw.name.clone(),
                message,
            })
        }
    }
}

/// Builds the normalized system from its resolved declaration.
pub(crate) fn normalize(
    raw: &RawSystem,
    image: String,
    image_descriptor: ImageDescriptor,
    depends: Vec<String>,
    ctx: &NormalizeContext<'_>,
) -> Result<System, ManifestFault> {
    let name = raw.name.as_str();
    let opts = &raw.options;
    for key in opts.keys().filter(|key| !KNOWN_OPTIONS.contains(&key.as_str())) {
        tracing::debug!(system = name, option = %key, "ignoring unknown option");
    }

    let placeholders = ctx.placeholders.with_system(name);
    let expand = |template: &str| {
        placeholder::expand(template, &placeholders).map_err(|source| ManifestFault::Placeholder {
            system: name.to_string(),
            source,
        })
    };

    let http = match field::<RawHttp>(name, opts, "http")? {
        None | Some(RawHttp::Flag(false)) => None,
        Some(RawHttp::Flag(true)) => Some(HttpOptions {
            domains: vec![DEFAULT_DOMAIN_TEMPLATE.to_string()],
        }),
        Some(RawHttp::Options(http)) => Some(http),
    };

    let options = SystemOptions {
        workdir: field::<String>(name, opts, "workdir")?
            .map(|w| expand(w.as_str()))
            .transpose()?,
        command: field(name, opts, "command")?,
        shell: field(name, opts, "shell")?,
        envs: string_map(name, opts, "envs")?,
        export_envs: string_map(name, opts, "export_envs")?,
        mounts: field(name, opts, "mounts")?.unwrap_or_default(),
        scalable: field::<RawScale>(name, opts, "scalable")?
            .map(ScalePolicy::from)
            .unwrap_or_default(),
        http,
        provision: field(name, opts, "provision")?.unwrap_or_default(),
        ports: port_map(name, opts)?,
        wait: field::<RawWait>(name, opts, "wait")?.map(|wait| match wait {
            RawWait::Retries(retry) => WaitPolicy {
                retry,
                timeout: WaitPolicy::default_timeout(),
            },
            RawWait::Policy(policy) => policy,
        }),
    };

    let mut mounts = BTreeMap::new();
    for (target, entry) in &options.mounts {
        let host = mount::resolve_host_path(entry, &expand(entry.value())?, &ctx.roots)
            .map_err(|message| invalid(name, "mounts", &message))?;
        let _ = mounts.insert(expand(target.as_str())?, host);
    }

    let hosts = options
        .http
        .as_ref()
        .map(|http| http.domains.iter().map(|d| expand(d.as_str())).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(System {
        name: name.to_string(),
        image,
        image_descriptor,
        depends,
        options,
        mounts,
        hosts,
        manifest: Arc::clone(&ctx.manifest),
    })
}

fn invalid(system: &str, option: &str, message: &str) -> ManifestFault {
    ManifestFault::InvalidOption {
        system: system.to_string(),
        option: option.to_string(),
        message: message.to_string(),
    }
}

/// Deserializes one option; `null` counts as unset.
fn field<T: DeserializeOwned>(
    system: &str,
    options: &Map<String, Value>,
    key: &str,
) -> Result<Option<T>, ManifestFault> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| invalid(system, key, &e.to_string())),
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Reads a record of scalar values as strings.
fn string_map(
    system: &str,
    options: &Map<String, Value>,
    key: &str,
) -> Result<BTreeMap<String, String>, ManifestFault> {
    let Some(record) = field::<Map<String, Value>>(system, options, key)? else {
        return Ok(BTreeMap::new());
    };
    record
        .iter()
        .map(|(name, value)| {
            scalar_to_string(value)
                .map(|v| (name.clone(), v))
                .ok_or_else(|| invalid(system, key, &format!("`{name}` must be a string")))
        })
        .collect()
}

fn port_map(
    system: &str,
    options: &Map<String, Value>,
) -> Result<BTreeMap<String, Option<String>>, ManifestFault> {
    let Some(record) = field::<Map<String, Value>>(system, options, "ports")? else {
        return Ok(BTreeMap::new());
    };
    record
        .iter()
        .map(|(name, value)| match value {
            Value::Null => Ok((name.clone(), None)),
            other => scalar_to_string(other)
                .map(|v| (name.clone(), Some(v)))
                .ok_or_else(|| invalid(system, "ports", &format!("`{name}` must be a port spec"))),
        })
        .collect()
}

/// Returns the base name of `dir`, or the whole path for roots.
pub(crate) fn dir_name(dir: &Path) -> String {
    dir.file_name()
        .map_or_else(|| dir.display().to_string(), |n| n.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use shipyard_common::config::ShipyardConfig;

    use super::*;
    use crate::mount::HostPathResolver;
    use crate::placeholder::{ManifestVars, NetworkContext};

    struct Fixture {
        dir: PathBuf,
        persistent: PathBuf,
        envs: BTreeMap<String, String>,
        config: ShipyardConfig,
        images: BTreeMap<String, String>,
        resolver: HostPathResolver,
        manifest: Arc<ManifestRef>,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = PathBuf::from("/home/dev/blog");
            Self {
                persistent: PathBuf::from("/data/pf/0123456789"),
                envs: BTreeMap::from([("USER".to_string(), "dev".to_string())]),
                config: ShipyardConfig::default(),
                images: BTreeMap::from([("front".to_string(), "base:0.1".to_string())]),
                resolver: HostPathResolver::default(),
                manifest: Arc::new(ManifestRef {
                    file: dir.join("Shipfile"),
                    dir: dir.clone(),
                    namespace: Namespace::from_path(&dir.join("Shipfile")),
                }),
                dir,
            }
        }

        fn ctx(&self) -> NormalizeContext<'_> {
            NormalizeContext {
                placeholders: PlaceholderContext::new(
                    ManifestVars {
                        dir_name: "blog",
                        path: &self.dir,
                        namespace: "0123456789",
                    },
                    &self.envs,
                    &self.config,
                    &self.images,
                ),
                roots: MountRoots {
                    manifest_dir: &self.dir,
                    persistent_dir: &self.persistent,
                    resolver: &self.resolver,
                },
                manifest: Arc::clone(&self.manifest),
            }
        }

        fn normalize(&self, options: Value) -> Result<System, ManifestFault> {
            let raw = RawSystem {
                name: "front".into(),
                options: options.as_object().cloned().unwrap_or_default(),
            };
            let descriptor = read_image(&raw)?;
            let depends = read_depends(&raw)?;
            normalize(&raw, "base:0.1".into(), descriptor, depends, &self.ctx())
        }
    }

    fn with_image(extra: Value) -> Value {
        let mut base = json!({ "image": { "docker": "base:0.1" } });
        if let (Some(base), Some(extra)) = (base.as_object_mut(), extra.as_object()) {
            base.extend(extra.clone());
        }
        base
    }

    #[test]
    fn missing_image_is_required_error() {
        let err = Fixture::new().normalize(json!({})).expect_err("should fail");
        assert_eq!(err, ManifestFault::ImageRequired { system: "front".into() });
    }

    #[test]
    fn invalid_image_reports_reason() {
        let err = Fixture::new()
            .normalize(json!({ "image": {} }))
            .expect_err("should fail");
        assert_eq!(err.key(), "manifest.image_invalid");
    }

    #[test]
    fn scalable_flag_normalizes_to_record() {
        let f = Fixture::new();
        let on = f.normalize(with_image(json!({ "scalable": true }))).expect("normalize");
        assert_eq!(on.options().scalable, ScalePolicy { default: 1, limit: None });
        let five = f
            .normalize(with_image(json!({ "scalable": { "default": 5 } })))
            .expect("normalize");
        assert_eq!(five.options().scalable, ScalePolicy { default: 5, limit: None });
        assert_eq!(
            serde_json::to_value(five.options().scalable).expect("serialize"),
            json!({ "default": 5 })
        );
        let absent = f.normalize(with_image(json!({}))).expect("normalize");
        assert_eq!(absent.options().scalable.default, 1);
        let off = f.normalize(with_image(json!({ "scalable": false }))).expect("normalize");
        assert_eq!(off.options().scalable.default, 0);
    }

    #[test]
    fn depends_are_deduplicated_in_order() {
        let system = Fixture::new()
            .normalize(with_image(json!({ "depends": ["db", "cache", "db"] })))
            .expect("normalize");
        assert_eq!(system.depends(), ["db", "cache"]);
    }

    #[test]
    fn single_depends_string_is_accepted() {
        let system = Fixture::new()
            .normalize(with_image(json!({ "depends": "db" })))
            .expect("normalize");
        assert_eq!(system.depends(), ["db"]);
    }

    #[test]
    fn workdir_and_mounts_are_expanded() {
        let system = Fixture::new()
            .normalize(with_image(json!({
                "workdir": "/azk/#{manifest.dir}",
                "mounts": {
                    "/azk/root": "/",
                    "/azk/#{manifest.dir}": { "type": "path", "value": "." },
                    "/azk/data": { "type": "persistent", "value": "data" },
                },
            })))
            .expect("normalize");
        assert_eq!(system.options().workdir.as_deref(), Some("/azk/blog"));
        let mounts = system.mounts();
        assert_eq!(mounts["/azk/root"], PathBuf::from("/"));
        assert_eq!(mounts["/azk/blog"], PathBuf::from("/home/dev/blog"));
        assert_eq!(mounts["/azk/data"], PathBuf::from("/data/pf/0123456789/data"));
        assert!(system.options().mounts.contains_key("/azk/#{manifest.dir}"));
    }

    #[test]
    fn persistent_mount_outside_namespace_is_invalid() {
        let err = Fixture::new()
            .normalize(with_image(json!({
                "mounts": { "/azk/up": { "type": "persistent", "value": "../../x" } },
            })))
            .expect_err("should fail");
        assert_eq!(err.key(), "manifest.invalid_option");
        assert!(err.to_string().contains("mounts"), "got: {err}");

        let system = Fixture::new()
            .normalize(with_image(json!({
                "mounts": { "/azk/etc": { "type": "persistent", "value": "/etc" } },
            })))
            .expect("normalize");
        assert_eq!(system.mounts()["/azk/etc"], PathBuf::from("/data/pf/0123456789/etc"));
    }

    #[test]
    fn http_true_derives_default_host() {
        let system = Fixture::new()
            .normalize(with_image(json!({ "http": true })))
            .expect("normalize");
        assert_eq!(system.hosts(), ["front.dev.shipyard.io"]);
    }

    #[test]
    fn http_domains_expand_independently() {
        let system = Fixture::new()
            .normalize(with_image(json!({ "http": { "domains": [
                "#{system.name}.#{shipyard.default_domain}",
                "custom.#{shipyard.default_domain}",
            ] } })))
            .expect("normalize");
        assert_eq!(system.hosts(), ["front.dev.shipyard.io", "custom.dev.shipyard.io"]);
    }

    #[test]
    fn export_envs_stay_raw_until_expanded_with_network() {
        let f = Fixture::new();
        let system = f
            .normalize(with_image(json!({
                "export_envs": { "DB_URL": "#{envs.USER}@#{net.host}:#{net.port.3666}" },
            })))
            .expect("normalize");
        assert_eq!(
            system.options().export_envs["DB_URL"],
            "#{envs.USER}@#{net.host}:#{net.port.3666}"
        );
        let net = NetworkContext {
            host: "10.0.0.2".into(),
            ports: BTreeMap::from([("3666".to_string(), "49000".to_string())]),
        };
        let ctx = f.ctx();
        let expanded = system
            .expand_export_envs(&ctx.placeholders.with_network(&net))
            .expect("expand");
        assert_eq!(expanded["DB_URL"], "dev@10.0.0.2:49000");
    }

    #[test]
    fn undefined_placeholder_fails_normalization() {
        let err = Fixture::new()
            .normalize(with_image(json!({ "workdir": "/#{envs.NOT_SET_ANYWHERE}" })))
            .expect_err("should fail");
        assert_eq!(err.key(), "manifest.placeholder");
    }

    #[test]
    fn scalar_envs_become_strings() {
        let system = Fixture::new()
            .normalize(with_image(json!({ "envs": { "PORT": 8080, "DEBUG": true, "NAME": "x" } })))
            .expect("normalize");
        assert_eq!(system.options().envs["PORT"], "8080");
        assert_eq!(system.options().envs["DEBUG"], "true");
    }

    #[test]
    fn command_shapes_and_ports() {
        let system = Fixture::new()
            .normalize(with_image(json!({
                "command": ["bundle", "exec", "rackup"],
                "ports": { "http": "80/tcp", "debug": null },
                "wait": 20,
            })))
            .expect("normalize");
        assert_eq!(
            system.options().command,
            Some(Command::Args(vec!["bundle".into(), "exec".into(), "rackup".into()]))
        );
        assert_eq!(system.options().ports["http"].as_deref(), Some("80/tcp"));
        assert_eq!(system.options().ports["debug"], None);
        assert_eq!(system.options().wait, Some(WaitPolicy { retry: 20, timeout: 1000 }));
    }

    #[test]
    fn malformed_option_names_the_option() {
        let err = Fixture::new()
            .normalize(with_image(json!({ "provision": "not a list" })))
            .expect_err("should fail");
        match err {
            ManifestFault::InvalidOption { option, .. } => assert_eq!(option, "provision"),
            other => panic!("unexpected fault: {other}"),
        }
    }
}
