//! Formatted output helpers for CLI commands.

use std::fmt::Write as _;

use shipyard_manifest::{Manifest, System};

/// Multi-line description of one system.
#[must_use]
pub fn describe_system(system: &System) -> String {
    let opts = system.options();
    let mut out = format!("{}\n  image: {}\n", system.name(), system.image());
    if !system.depends().is_empty() {
        let _ = writeln!(out, "  depends: {}", system.depends().join(", "));
    }
    if let Some(workdir) = &opts.workdir {
        let _ = writeln!(out, "  workdir: {workdir}");
    }
    let _ = write!(out, "  scale: {}", opts.scalable.default);
    if let Some(limit) = opts.scalable.limit {
        let _ = write!(out, " (limit {limit})");
    }
    out.push('\n');
    for host in system.hosts() {
        let _ = writeln!(out, "  http: {host}");
    }
    for (target, host_path) in system.mounts() {
        let _ = writeln!(out, "  mount: {target} <- {}", host_path.display());
    }
    out
}

/// Summary of a manifest: file, namespace, default and ordered systems.
#[must_use]
pub fn describe_manifest(manifest: &Manifest) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "manifest:  {}", manifest.file().display());
    let _ = writeln!(out, "namespace: {}", manifest.namespace());
    let _ = writeln!(out, "default:   {}", manifest.system_default().name());
    let _ = writeln!(out, "systems:");
    for system in manifest.systems() {
        if system.depends().is_empty() {
            let _ = writeln!(out, "  {} ({})", system.name(), system.image());
        } else {
            let _ = writeln!(
                out,
                "  {} ({}) -> {}",
                system.name(),
                system.image(),
                system.depends().join(", ")
            );
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    use shipyard_common::config::ShipyardConfig;
    use shipyard_manifest::ManifestLoader;

    use super::*;

    fn manifest() -> Manifest {
        ManifestLoader::new(ShipyardConfig::default())
            .with_envs(BTreeMap::new())
            .load_source(
                PathBuf::from("/work/blog/Shipfile"),
                r#"
                system("web", {
                  depends: ["db"],
                  image: { docker: "ruby:2.2" },
                  workdir: "/azk/#{manifest.dir}",
                  scalable: { default: 2, limit: 4 },
                  http: true,
                });
                system("db", { image: "postgres" });
                setDefault("web");
                "#,
            )
            .expect("manifest loads")
    }

    #[test]
    fn system_description_lists_resolved_fields() {
        let manifest = manifest();
        let text = describe_system(manifest.system("web").expect("web"));
        assert!(text.starts_with("web\n  image: ruby:2.2\n"), "got:\n{text}");
        assert!(text.contains("  depends: db\n"));
        assert!(text.contains("  workdir: /azk/blog\n"));
        assert!(text.contains("  scale: 2 (limit 4)\n"));
        assert!(text.contains("  http: web.dev.shipyard.io\n"));
    }

    #[test]
    fn manifest_summary_shows_default_and_dependencies() {
        let text = describe_manifest(&manifest());
        assert!(text.contains("default:   web\n"), "got:\n{text}");
        assert!(text.contains("  web (ruby:2.2) -> db\n"));
        assert!(text.contains("  db (postgres:latest)\n"));
    }
}
