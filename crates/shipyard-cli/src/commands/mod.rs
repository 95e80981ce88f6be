//! CLI command definitions and dispatch.

pub mod info;
pub mod init;
pub mod meta;
pub mod systems;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use shipyard_common::config::ShipyardConfig;
use shipyard_common::constants::BIN_NAME;
use shipyard_manifest::Manifest;

/// shipyard: local development environments from a `Shipfile`.
#[derive(Parser, Debug)]
#[command(name = BIN_NAME, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Project directory; the manifest is searched from here upwards.
    #[arg(long, global = true, default_value = ".")]
    pub path: PathBuf,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List systems in dependency order.
    Systems(systems::SystemsArgs),
    /// Show a summary of the manifest.
    Info(info::InfoArgs),
    /// Write a starter manifest.
    Init(init::InitArgs),
    /// Read, write or clear manifest metadata.
    Meta(meta::MetaArgs),
}

/// Dispatches the parsed CLI command to its handler.
///
/// # Errors
///
/// Returns an error if the command execution fails.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let config = ShipyardConfig::from_env();
    match cli.command {
        Command::Systems(args) => systems::execute(&cli.path, config, &args),
        Command::Info(args) => info::execute(&cli.path, config, &args),
        Command::Init(args) => init::execute(&cli.path, &config, &args),
        Command::Meta(args) => meta::execute(&cli.path, config, args).await,
    }
}

/// Loads the manifest governing `path`.
///
/// # Errors
///
/// Returns an error if no manifest is found or it is invalid.
pub fn load_manifest(path: &Path, config: ShipyardConfig) -> anyhow::Result<Manifest> {
    Manifest::open(path, config)
        .with_context(|| format!("loading manifest from {}", path.display()))
}

/// Loads the manifest governing `path`, or a fake one-system manifest
/// using the configured default image when none exists.
///
/// # Errors
///
/// Returns an error if a manifest is found but is invalid.
pub fn load_or_fake(path: &Path, config: ShipyardConfig) -> anyhow::Result<Manifest> {
    if let Some(manifest) = Manifest::open_optional(path, config.clone())? {
        return Ok(manifest);
    }
    let dir = std::fs::canonicalize(path).with_context(|| format!("resolving {}", path.display()))?;
    tracing::info!(path = %dir.display(), "no manifest found, using a fake one");
    let image = config.default_image.clone();
    Ok(Manifest::make_fake(&dir, &image, config)?)
}
