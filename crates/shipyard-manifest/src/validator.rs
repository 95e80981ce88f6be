//! Declaration-level checks applied while systems are registered.
//!
//! Checks system name syntax and rejects removed options, each with its own
//! guidance.

use serde_json::{Map, Value};

use crate::error::ManifestFault;

/// Options that were removed, each mapped to the fault explaining the
/// replacement.
const DEPRECATED_OPTIONS: &[&str] = &["balancer", "mount_folders", "persistent_folders"];

/// Returns `true` for names made only of ASCII letters, digits, `-` and `_`.
#[must_use]
pub fn is_valid_system_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validates the syntax of a system name.
///
/// # Errors
///
/// Returns [`ManifestFault::SystemNameInvalid`] for names with dots or any
/// other punctuation.
pub fn validate_name(name: &str) -> Result<(), ManifestFault> {
    if is_valid_system_name(name) {
        Ok(())
    } else {
        Err(ManifestFault::SystemNameInvalid {
            system: name.to_string(),
        })
    }
}

/// Rejects options that are no longer supported.
///
/// # Errors
///
/// Returns the deprecation fault of the first removed option present.
pub fn check_deprecated(name: &str, options: &Map<String, Value>) -> Result<(), ManifestFault> {
    let Some(option) = DEPRECATED_OPTIONS
        .iter()
        .find(|option| options.contains_key(**option))
    else {
        return Ok(());
    };

    Err(match *option {
        "balancer" => ManifestFault::BalancerDeprecated {
            system: name.to_string(),
        },
        other => ManifestFault::MountAndPersistentDeprecated {
            system: name.to_string(),
            option: other.to_string(),
        },
    })
}
