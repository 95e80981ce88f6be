//! Resolution of `extends` between raw system declarations.
//!
//! A declaration carrying `extends: "<parent>"` receives every top-level
//! option of its parent that it does not set itself. Chains resolve
//! depth-first and each declaration is merged at most once.

use std::collections::{HashMap, HashSet};

use serde_json::{Map, Value};

use crate::error::ManifestFault;
use crate::registry::RawSystem;

/// Option naming the parent declaration.
pub const EXTENDS_KEY: &str = "extends";

/// Merges `parent` underneath `child`: keys set on the child win, keys only
/// present on the parent are inherited. The `extends` key is never
/// inherited.
#[must_use]
pub fn merge_options(
    parent: &Map<String, Value>,
    child: &Map<String, Value>,
) -> Map<String, Value> {
    let mut merged: Map<String, Value> = parent
        .iter()
        .filter(|(key, _)| key.as_str() != EXTENDS_KEY)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in child {
        if key != EXTENDS_KEY {
            let _ = merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

/// Resolves every `extends` reference, returning the declarations in their
/// original order with fully merged options.
///
/// # Errors
///
/// Returns a fault for a missing parent, a system extending itself, a loop
/// of `extends`, or a non-string `extends` value.
pub fn resolve_extends(systems: &[RawSystem]) -> Result<Vec<RawSystem>, ManifestFault> {
    let mut resolver = Resolver {
        systems,
        index: systems
            .iter()
            .enumerate()
            .map(|(idx, s)| (s.name.as_str(), idx))
            .collect(),
        resolved: vec![None; systems.len()],
        in_progress: HashSet::new(),
    };

    (0..systems.len())
        .map(|idx| {
            let options = resolver.resolve(idx)?;
            Ok(RawSystem {
                name: systems[idx].name.clone(),
                options,
            })
        })
        .collect()
}

struct Resolver<'a> {
    systems: &'a [RawSystem],
    index: HashMap<&'a str, usize>,
    resolved: Vec<Option<Map<String, Value>>>,
    in_progress: HashSet<usize>,
}

impl Resolver<'_> {
    fn resolve(&mut self, idx: usize) -> Result<Map<String, Value>, ManifestFault> {
        if let Some(done) = &self.resolved[idx] {
            return Ok(done.clone());
        }

        let systems = self.systems;
        let system = &systems[idx];
        let merged = match system.options.get(EXTENDS_KEY) {
            None => merge_options(&Map::new(), &system.options),
            Some(Value::String(parent)) => {
                let parent_idx = self.parent_of(system, parent)?;
                let _ = self.in_progress.insert(idx);
                let parent_options = self.resolve(parent_idx);
                let _ = self.in_progress.remove(&idx);
                tracing::debug!(system = %system.name, parent = %parent, "merging extended system");
                merge_options(&parent_options?, &system.options)
            }
            Some(_) => {
                return Err(ManifestFault::InvalidOption {
                    system: system.name.clone(),
                    option: EXTENDS_KEY.to_string(),
                    message: "expected the name of a system".to_string(),
                });
            }
        };

        self.resolved[idx] = Some(merged.clone());
        Ok(merged)
    }

    fn parent_of(&self, system: &RawSystem, parent: &str) -> Result<usize, ManifestFault> {
        if parent == system.name {
            return Err(ManifestFault::CannotExtendItself {
                system: system.name.clone(),
            });
        }
        let parent_idx =
            self.index
                .get(parent)
                .copied()
                .ok_or_else(|| ManifestFault::ExtendsSystemInvalid {
                    system: system.name.clone(),
                    target: parent.to_string(),
                })?;
        if self.in_progress.contains(&parent_idx) {
            return Err(ManifestFault::CircularExtends {
                system1: parent.to_string(),
                system2: system.name.clone(),
            });
        }
        Ok(parent_idx)
    }
}
