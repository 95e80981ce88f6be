//! `shp meta`: Read, write or clear manifest metadata.

use std::path::Path;

use clap::{Args, Subcommand};
use serde_json::Value;
use shipyard_common::config::ShipyardConfig;

/// Arguments for the `meta` command.
#[derive(Args, Debug)]
pub struct MetaArgs {
    /// Metadata operation.
    #[command(subcommand)]
    pub action: MetaAction,
}

/// Metadata operations.
#[derive(Subcommand, Debug)]
pub enum MetaAction {
    /// Print the value stored under a key.
    Get {
        /// Key to read.
        key: String,
    },
    /// Store a value; JSON is parsed, anything else is kept as a string.
    Set {
        /// Key to write.
        key: String,
        /// Value to store.
        value: String,
    },
    /// Remove all metadata of the manifest.
    Clean,
}

/// Executes the `meta` command.
///
/// # Errors
///
/// Returns an error if the manifest cannot be loaded or the metadata
/// record cannot be read or written.
pub async fn execute(path: &Path, config: ShipyardConfig, args: MetaArgs) -> anyhow::Result<()> {
    let manifest = super::load_manifest(path, config)?;
    match args.action {
        MetaAction::Get { key } => match manifest.get_meta(&key)? {
            Some(value) => println!("{value}"),
            None => tracing::info!(key, "no value stored"),
        },
        MetaAction::Set { key, value } => {
            let value = serde_json::from_str(&value).unwrap_or(Value::String(value));
            manifest.set_meta(key, value)?;
            manifest.persist_meta().await?;
        }
        MetaAction::Clean => {
            manifest.clean_meta().await?;
            println!("Cleaned metadata of {}", manifest.namespace());
        }
    }
    Ok(())
}
