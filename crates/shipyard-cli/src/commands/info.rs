//! `shp info`: Show a summary of the manifest.

use std::path::Path;

use clap::Args;
use shipyard_common::config::ShipyardConfig;

use crate::output;

/// Arguments for the `info` command.
#[derive(Args, Debug)]
pub struct InfoArgs {
    /// Print the manifest as JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

/// Executes the `info` command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded.
pub fn execute(path: &Path, config: ShipyardConfig, args: &InfoArgs) -> anyhow::Result<()> {
    let manifest = super::load_manifest(path, config)?;
    if args.json {
        let data = manifest.to_data();
        let value = serde_json::json!({
            "file": manifest.file(),
            "namespace": manifest.namespace().as_str(),
            "default": manifest.system_default().name(),
            "systems": data.systems,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        print!("{}", output::describe_manifest(&manifest));
    }
    Ok(())
}
