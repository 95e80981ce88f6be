//! `shp init`: Write a starter manifest.

use std::path::Path;

use clap::Args;
use shipyard_common::config::ShipyardConfig;
use shipyard_manifest::generator;

/// Arguments for the `init` command.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing manifest.
    #[arg(short, long)]
    pub force: bool,
}

/// Executes the `init` command.
///
/// # Errors
///
/// Returns an error if a manifest already exists without `--force`, or if
/// writing fails.
pub fn execute(path: &Path, config: &ShipyardConfig, args: &InitArgs) -> anyhow::Result<()> {
    let file = path.join(&config.manifest_file_name);
    if file.exists() && !args.force {
        anyhow::bail!("{} already exists, use --force to overwrite", file.display());
    }
    generator::write(&generator::suggestion(), &file)?;
    println!("Created {}", file.display());
    Ok(())
}
