//! Abstract syntax tree of a manifest script.
//!
//! A script is a flat list of calls whose arguments are literal values.
//! Literals are represented as [`serde_json::Value`] so that declarations
//! can be merged and deserialized without a second value model.

use serde_json::Value;

/// Root node of a parsed manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Program {
    /// Top-level call statements in source order.
    pub calls: Vec<Call>,
}

/// A call statement such as `system("web", { ... })`.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    /// Name of the called function.
    pub callee: String,
    /// Literal arguments.
    pub args: Vec<Value>,
    /// Line the call starts on.
    pub line: usize,
}
