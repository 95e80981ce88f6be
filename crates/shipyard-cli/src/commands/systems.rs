//! `shp systems`: List systems in dependency order.

use std::path::Path;

use clap::Args;
use shipyard_common::config::ShipyardConfig;

use crate::output;

/// Arguments for the `systems` command.
#[derive(Args, Debug)]
pub struct SystemsArgs {
    /// Comma-separated system names; their dependencies are included.
    pub names: Option<String>,

    /// Print every resolved field of each system.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Executes the `systems` command.
///
/// # Errors
///
/// Returns an error if a manifest exists but cannot be loaded, or a name
/// is unknown.
pub fn execute(path: &Path, config: ShipyardConfig, args: &SystemsArgs) -> anyhow::Result<()> {
    let manifest = super::load_or_fake(path, config)?;
    let systems = manifest.systems_in_order(args.names.as_deref())?;
    tracing::info!(count = systems.len(), "listing systems");

    for system in systems {
        if args.verbose {
            println!("{}", output::describe_system(system));
        } else {
            println!("{}\t{}", system.name(), system.image());
        }
    }
    Ok(())
}
