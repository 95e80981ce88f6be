//! Expansion of `#{group.path}` placeholders inside string options.
//!
//! Templates are split into literal and placeholder segments with `nom`;
//! each placeholder expression is a dotted path looked up in a fixed set of
//! groups:
//!
//! | Expression                           | Value                                  |
//! |--------------------------------------|----------------------------------------|
//! | `manifest.dir`, `app.dir`            | base name of the manifest directory    |
//! | `manifest.path`, `app.path`          | absolute manifest directory            |
//! | `manifest.namespace`                 | manifest namespace                     |
//! | `envs.<NAME>`                        | captured environment variable          |
//! | `net.host`, `net.port.<name>`        | network allocation of the system       |
//! | `system.name`, `system.image`        | the system being expanded              |
//! | `systems.<name>.name`, `.image`      | another system of the manifest         |
//! | `shipyard.default_domain`            | balancer domain                        |
//! | `shipyard.balancer_ip`, `..._port`   | balancer address                       |
//!
//! A lookup that cannot be answered is always an error.

use std::collections::BTreeMap;
use std::path::Path;

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::char,
    combinator::{map, rest, verify},
    sequence::delimited,
};
use shipyard_common::config::ShipyardConfig;
use shipyard_common::constants::APP_NAME;
use thiserror::Error;

/// Failure to expand a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    /// A `#{` has no closing `}`.
    #[error("unterminated placeholder in `{template}`")]
    Unterminated {
        /// Template being expanded.
        template: String,
    },
    /// A placeholder has an empty expression.
    #[error("empty placeholder in `{template}`")]
    Empty {
        /// Template being expanded.
        template: String,
    },
    /// The expression does not resolve in the current context.
    #[error("undefined placeholder `#{{{expression}}}` in `{template}`")]
    Undefined {
        /// Dotted expression.
        expression: String,
        /// Template being expanded.
        template: String,
    },
}

/// Host and ports allocated to a system at run time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetworkContext {
    /// Host name or address the system is reachable at.
    pub host: String,
    /// Allocated ports, keyed by port name.
    pub ports: BTreeMap<String, String>,
}

/// Manifest-level placeholder values.
#[derive(Debug, Clone, Copy)]
pub struct ManifestVars<'a> {
    /// Base name of the manifest directory.
    pub dir_name: &'a str,
    /// Absolute manifest directory.
    pub path: &'a Path,
    /// Manifest namespace.
    pub namespace: &'a str,
}

/// Lookup groups available to a placeholder expression.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderContext<'a> {
    manifest: ManifestVars<'a>,
    envs: &'a BTreeMap<String, String>,
    config: &'a ShipyardConfig,
    images: &'a BTreeMap<String, String>,
    system: Option<&'a str>,
    net: Option<&'a NetworkContext>,
}

impl<'a> PlaceholderContext<'a> {
    /// Creates a context without a current system or network allocation.
    /// `images` maps every system name of the manifest to its image.
    #[must_use]
    pub const fn new(
        manifest: ManifestVars<'a>,
        envs: &'a BTreeMap<String, String>,
        config: &'a ShipyardConfig,
        images: &'a BTreeMap<String, String>,
    ) -> Self {
        Self {
            manifest,
            envs,
            config,
            images,
            system: None,
            net: None,
        }
    }

    /// Sets the system the `system.*` group refers to.
    #[must_use]
    pub const fn with_system(mut self, name: &'a str) -> Self {
        self.system = Some(name);
        self
    }

    /// Sets the network allocation the `net.*` group refers to.
    #[must_use]
    pub const fn with_network(mut self, net: &'a NetworkContext) -> Self {
        self.net = Some(net);
        self
    }

    fn lookup(&self, expression: &str) -> Option<String> {
        let path: Vec<&str> = expression.split('.').map(str::trim).collect();
        match path.as_slice() {
            ["manifest" | "app", "dir"] => Some(self.manifest.dir_name.to_string()),
            ["manifest" | "app", "path"] => Some(self.manifest.path.display().to_string()),
            ["manifest" | "app", "namespace"] => Some(self.manifest.namespace.to_string()),
            ["envs", name] => self.envs.get(*name).cloned(),
            ["net", "host"] => self.net.map(|net| net.host.clone()),
            ["net", "port", name] => self.net.and_then(|net| net.ports.get(*name).cloned()),
            ["system", "name"] => self.system.map(ToString::to_string),
            ["system", "image"] => self.system.and_then(|name| self.images.get(name).cloned()),
            ["systems", name, "name"] => self.images.get_key_value(*name).map(|(k, _)| k.clone()),
            ["systems", name, "image"] => self.images.get(*name).cloned(),
            [APP_NAME, "default_domain"] => Some(self.config.balancer.host.clone()),
            [APP_NAME, "balancer_ip"] => Some(self.config.balancer.ip.clone()),
            [APP_NAME, "balancer_port"] => Some(self.config.balancer.port.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

fn placeholder(input: &str) -> IResult<&str, Segment<'_>> {
    map(
        delimited(tag("#{"), take_until("}"), char('}')),
        Segment::Placeholder,
    )
    .parse(input)
}

fn literal(input: &str) -> IResult<&str, Segment<'_>> {
    map(
        alt((take_until("#{"), verify(rest, |s: &str| !s.is_empty()))),
        Segment::Literal,
    )
    .parse(input)
}

fn segments(template: &str) -> Result<Vec<Segment<'_>>, PlaceholderError> {
    let mut out = Vec::new();
    let mut remaining = template;
    while !remaining.is_empty() {
        let parsed = if remaining.starts_with("#{") {
            placeholder(remaining)
        } else {
            literal(remaining)
        };
        let (rest, segment) = parsed.map_err(|_| PlaceholderError::Unterminated {
            template: template.to_string(),
        })?;
        out.push(segment);
        remaining = rest;
    }
    Ok(out)
}

/// Returns `true` when `template` contains placeholder syntax.
#[must_use]
pub fn has_placeholders(template: &str) -> bool {
    template.contains("#{")
}

/// Replaces every placeholder of `template` with its looked-up value.
/// Strings without placeholder syntax are returned unchanged.
///
/// # Errors
///
/// Returns a [`PlaceholderError`] for malformed spans and for expressions
/// the context cannot answer.
pub fn expand(template: &str, ctx: &PlaceholderContext<'_>) -> Result<String, PlaceholderError> {
    if !has_placeholders(template) {
        return Ok(template.to_string());
    }

    let mut out = String::with_capacity(template.len());
    for segment in segments(template)? {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Placeholder(expression) => {
                let expression = expression.trim();
                if expression.is_empty() {
                    return Err(PlaceholderError::Empty {
                        template: template.to_string(),
                    });
                }
                let value = ctx.lookup(expression).ok_or_else(|| PlaceholderError::Undefined {
                    expression: expression.to_string(),
                    template: template.to_string(),
                })?;
                out.push_str(&value);
            }
        }
    }
    Ok(out)
}
