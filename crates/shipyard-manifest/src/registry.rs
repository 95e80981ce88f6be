//! Evaluation of manifest scripts into raw system declarations.
//!
//! The evaluator walks the call statements of a parsed script and exposes
//! exactly two functions to it: `system(name, options)` and
//! `setDefault(name)`. Any other call is a reference error.

use serde_json::{Map, Value};

use crate::error::ManifestFault;
use crate::parser::{self, ast::Call, ast::Program};
use crate::validator;

/// Name of the system registration function.
pub const SYSTEM_FN: &str = "system";
/// Name of the default-system function.
pub const SET_DEFAULT_FN: &str = "setDefault";

/// A system as declared in the script, before inheritance and
/// normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSystem {
    /// Declared name.
    pub name: String,
    /// Options record exactly as written.
    pub options: Map<String, Value>,
}

/// Raw declarations collected from a manifest script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
    systems: Vec<RawSystem>,
    default_system: Option<String>,
}

impl Registry {
    /// Parses and evaluates manifest source text.
    ///
    /// # Errors
    ///
    /// Returns a fault for syntax errors, unknown functions, bad arguments,
    /// invalid names, removed options and duplicate declarations.
    pub fn evaluate(source: &str) -> Result<Self, ManifestFault> {
        let program = parser::parse_manifest(source)?;
        Self::from_program(&program)
    }

    /// Evaluates an already parsed program.
    ///
    /// # Errors
    ///
    /// See [`Registry::evaluate`].
    pub fn from_program(program: &Program) -> Result<Self, ManifestFault> {
        let mut registry = Self::default();
        for call in &program.calls {
            registry.apply(call)?;
        }
        tracing::debug!(
            systems = registry.systems.len(),
            default = ?registry.default_system,
            "evaluated manifest script"
        );
        Ok(registry)
    }

    fn apply(&mut self, call: &Call) -> Result<(), ManifestFault> {
        match call.callee.as_str() {
            SYSTEM_FN => {
                let (name, options) = system_args(call)?;
                self.register(name, options)
            }
            SET_DEFAULT_FN => {
                let name = match call.args.as_slice() {
                    [Value::String(name)] => name.clone(),
                    _ => return Err(type_error(call, "(name: string)")),
                };
                self.set_default(name);
                Ok(())
            }
            other => Err(ManifestFault::evaluation(format!(
                "ReferenceError: {other} is not defined (line {})",
                call.line
            ))),
        }
    }

    /// Registers a raw declaration.
    ///
    /// # Errors
    ///
    /// Fails on an invalid or already registered name, or on removed
    /// options.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        options: Map<String, Value>,
    ) -> Result<(), ManifestFault> {
        let name = name.into();
        validator::validate_name(&name)?;
        validator::check_deprecated(&name, &options)?;
        if self.get(&name).is_some() {
            return Err(ManifestFault::DuplicateSystem { system: name });
        }
        self.systems.push(RawSystem { name, options });
        Ok(())
    }

    /// Records the default system name. Validity is checked later by
    /// [`Registry::validate_default`].
    pub fn set_default(&mut self, name: impl Into<String>) {
        self.default_system = Some(name.into());
    }

    /// Checks that the default system, when set, was declared.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestFault::InvalidDefault`] otherwise.
    pub fn validate_default(&self) -> Result<(), ManifestFault> {
        match &self.default_system {
            Some(name) if self.get(name).is_none() => Err(ManifestFault::InvalidDefault {
                system: name.clone(),
            }),
            _ => Ok(()),
        }
    }

    /// Looks up a raw declaration.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&RawSystem> {
        self.systems.iter().find(|s| s.name == name)
    }

    /// Declarations in source order.
    #[must_use]
    pub fn systems(&self) -> &[RawSystem] {
        &self.systems
    }

    /// The name passed to `setDefault`, if any.
    #[must_use]
    pub fn default_system(&self) -> Option<&str> {
        self.default_system.as_deref()
    }

    /// Consumes the registry into its parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<RawSystem>, Option<String>) {
        (self.systems, self.default_system)
    }
}

fn system_args(call: &Call) -> Result<(String, Map<String, Value>), ManifestFault> {
    match call.args.as_slice() {
        [Value::String(name)] => Ok((name.clone(), Map::new())),
        [Value::String(name), Value::Object(options)] => Ok((name.clone(), options.clone())),
        _ => Err(type_error(call, "(name: string, options: object)")),
    }
}

fn type_error(call: &Call, signature: &str) -> ManifestFault {
    ManifestFault::evaluation(format!(
        "TypeError: {} expects {signature} (line {})",
        call.callee, call.line
    ))
}
