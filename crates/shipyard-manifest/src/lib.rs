//! # shipyard-manifest
//!
//! Resolution engine for `Shipfile` manifests.
//!
//! Handles:
//! - **Parser**: Lexing and parsing of the call-statement manifest script.
//! - **Registry**: Evaluation of `system(...)` and `setDefault(...)` calls.
//! - **Inheritance**: `extends` resolution into merged option records.
//! - **Graph**: Dependency validation, cycle detection and ordering.
//! - **Placeholder**: `#{group.path}` template expansion.
//! - **System**: Normalized, immutable per-service records.
//! - **Meta**: Per-namespace persisted key/value metadata.
//! - **Manifest**: Discovery and the public facade composing the above.
//! - **Generator**: Rendering manifest data back into script text.

pub mod error;
pub mod generator;
pub mod graph;
pub mod image;
pub mod inheritance;
pub mod manifest;
pub mod meta;
pub mod mount;
pub mod parser;
pub mod placeholder;
pub mod registry;
pub mod system;
pub mod validator;

pub use error::{Error, ManifestFault, Result};
pub use manifest::{Manifest, ManifestLoader};
pub use system::System;
