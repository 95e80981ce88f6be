//! Renders manifest data back into manifest script text.
//!
//! The output uses only the call-statement grammar the parser accepts, so
//! a rendered manifest loads back into semantically equal systems.

use std::fmt::Write as _;
use std::path::Path;

use serde_json::{Map, Value, json};
use shipyard_common::error::ShipyardError;

use crate::registry::{SET_DEFAULT_FN, SYSTEM_FN};
use crate::system::{DEFAULT_DOMAIN_TEMPLATE, ScalePolicy, System};

const INDENT: &str = "  ";

/// Input of the generator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ManifestData {
    /// Option records by system name, in output order.
    pub systems: Map<String, Value>,
    /// System passed to `setDefault`, if any.
    pub default_system: Option<String>,
}

/// Starter manifest proposed by `shp init`.
#[must_use]
pub fn suggestion() -> ManifestData {
    let example = json!({
        "depends": [],
        "image": { "docker": "[repository]:[tag]" },
        "shell": "/bin/bash",
        "workdir": "/azk/#{app.dir}",
        "wait": 20,
        "http": true,
        "mounts": {
            "/azk/#{app.dir}": { "type": "path", "value": "." },
        },
        "envs": { "EXAMPLE": "value" },
    });
    let mut systems = Map::new();
    let _ = systems.insert("example".to_string(), example);
    ManifestData {
        systems,
        default_system: Some("example".to_string()),
    }
}

/// Rebuilds the option record of a normalized system. Defaults are
/// omitted. Mounts, domains and `export_envs` keep their templates; the
/// workdir is emitted as resolved.
#[must_use]
pub fn system_record(system: &System) -> Value {
    let opts = system.options();
    let mut record = Map::new();
    let mut put = |key: &str, value: Value| {
        let _ = record.insert(key.to_string(), value);
    };

    if !system.depends().is_empty() {
        put("depends", json!(system.depends()));
    }
    put("image", system.image_descriptor().to_value());
    if let Some(workdir) = &opts.workdir {
        put("workdir", json!(workdir));
    }
    if let Some(shell) = &opts.shell {
        put("shell", json!(shell));
    }
    if let Some(command) = &opts.command {
        put("command", json!(command));
    }
    if opts.scalable != ScalePolicy::default() {
        put("scalable", json!(opts.scalable));
    }
    match &opts.http {
        Some(http) if http.domains == [DEFAULT_DOMAIN_TEMPLATE] => put("http", json!(true)),
        Some(http) => put("http", json!(http)),
        None => {}
    }
    if !opts.mounts.is_empty() {
        put("mounts", json!(opts.mounts));
    }
    if !opts.envs.is_empty() {
        put("envs", json!(opts.envs));
    }
    if !opts.export_envs.is_empty() {
        put("export_envs", json!(opts.export_envs));
    }
    if !opts.provision.is_empty() {
        put("provision", json!(opts.provision));
    }
    if !opts.ports.is_empty() {
        put("ports", json!(opts.ports));
    }
    if let Some(wait) = &opts.wait {
        put("wait", json!(wait));
    }
    Value::Object(record)
}

/// Renders `data` as manifest script text.
#[must_use]
pub fn render(data: &ManifestData) -> String {
    let mut out = String::from("// Shipfile: declare the systems of this project.\n");
    for (name, options) in &data.systems {
        out.push('\n');
        let _ = write!(out, "{SYSTEM_FN}({}, ", quote(name));
        write_value(&mut out, options, 0);
        out.push_str(");\n");
    }
    if let Some(default) = &data.default_system {
        let _ = write!(out, "\n{SET_DEFAULT_FN}({});\n", quote(default));
    }
    out
}

/// Renders `data` into `file`.
///
/// # Errors
///
/// Fails when the file cannot be written.
pub fn write(data: &ManifestData, file: &Path) -> Result<(), ShipyardError> {
    std::fs::write(file, render(data)).map_err(|e| ShipyardError::io(file, e))?;
    tracing::info!(path = %file.display(), systems = data.systems.len(), "wrote manifest");
    Ok(())
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::String(s) => out.push_str(&quote(s)),
        Value::Array(items) if items.iter().all(is_scalar) => {
            out.push('[');
            for (idx, item) in items.iter().enumerate() {
                if idx > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, depth);
            }
            out.push(']');
        }
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                push_indent(out, depth + 1);
                write_value(out, item, depth + 1);
                out.push_str(",\n");
            }
            push_indent(out, depth);
            out.push(']');
        }
        Value::Object(map) if map.is_empty() => out.push_str("{}"),
        Value::Object(map) => {
            out.push_str("{\n");
            for (key, item) in map {
                push_indent(out, depth + 1);
                out.push_str(&object_key(key));
                out.push_str(": ");
                write_value(out, item, depth + 1);
                out.push_str(",\n");
            }
            push_indent(out, depth);
            out.push('}');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

const fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

fn push_indent(out: &mut String, depth: usize) {
    for _ in 0..depth {
        out.push_str(INDENT);
    }
}

fn is_identifier(key: &str) -> bool {
    let mut chars = key.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        && !matches!(key, "true" | "false" | "null")
}

fn object_key(key: &str) -> String {
    if is_identifier(key) {
        key.to_string()
    } else {
        let mut quoted = String::with_capacity(key.len() + 2);
        quoted.push('\'');
        push_escaped(&mut quoted, key, '\'');
        quoted.push('\'');
        quoted
    }
}

fn quote(s: &str) -> String {
    let mut quoted = String::with_capacity(s.len() + 2);
    quoted.push('"');
    push_escaped(&mut quoted, s, '"');
    quoted.push('"');
    quoted
}

fn push_escaped(out: &mut String, s: &str, delimiter: char) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if c == delimiter => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;

    fn data(systems: Value, default_system: Option<&str>) -> ManifestData {
        ManifestData {
            systems: systems.as_object().cloned().unwrap_or_default(),
            default_system: default_system.map(ToString::to_string),
        }
    }

    #[test]
    fn renders_nested_records_with_indentation() {
        let text = render(&data(
            json!({ "front": { "envs": { "RACK_ENV": "dev", "F-O_O": "BAR" } } }),
            Some("front"),
        ));
        assert!(text.contains("system(\"front\", {\n"), "got:\n{text}");
        assert!(text.contains("\n    RACK_ENV: \"dev\",\n"), "got:\n{text}");
        assert!(text.contains("\n    'F-O_O': \"BAR\",\n"), "got:\n{text}");
        assert!(text.ends_with("setDefault(\"front\");\n"), "got:\n{text}");
    }

    #[test]
    fn rendered_text_evaluates_to_same_records() {
        let input = data(
            json!({
                "db": {
                    "image": { "docker": "base" },
                    "export_envs": { "DB_URL": "#{envs.USER}@#{net.host}:#{net.port.3666}" },
                },
                "front": {
                    "depends": ["db"],
                    "command": ["bundle", "exec", "rackup"],
                    "scalable": { "default": 3 },
                    "ports": { "http": "80/tcp", "debug": null },
                    "envs": { "QUOTE": "it's \"x\"\n" },
                    "wait": 20,
                    "true": false,
                },
            }),
            Some("front"),
        );
        let registry = Registry::evaluate(&render(&input)).expect("rendered text evaluates");
        assert_eq!(registry.default_system(), Some("front"));
        for raw in registry.systems() {
            assert_eq!(Some(&Value::Object(raw.options.clone())), input.systems.get(&raw.name));
        }
    }

    #[test]
    fn extreme_numbers_evaluate_back() {
        let input = data(
            json!({
                "db": {
                    "image": "postgres",
                    "big": 1e21,
                    "small": -2.5e-7,
                    "max": u64::MAX,
                    "min": i64::MIN,
                },
            }),
            None,
        );
        let text = render(&input);
        assert!(text.contains("big: 1e21") || text.contains("big: 1e+21"), "got:\n{text}");
        let registry = Registry::evaluate(&text).expect("rendered text evaluates");
        let raw = registry.get("db").expect("db");
        assert_eq!(Some(&Value::Object(raw.options.clone())), input.systems.get("db"));
    }

    #[test]
    fn suggestion_is_a_loadable_manifest() {
        let registry = Registry::evaluate(&render(&suggestion())).expect("suggestion evaluates");
        assert_eq!(registry.default_system(), Some("example"));
        assert!(registry.get("example").is_some());
    }
}
