// src/bindings/flatten.rs

//! Binding flattener.
//!
//! Rules:
//! - scalars are stored under the binding's own name (`""` for null)
//! - lists become `<name>_<index>` entries, 0-based
//! - maps become `<name>_<key>` entries
//!
//! Nested values below the first level are stringified with their
//! `Display` form rather than flattened further.

use tracing::trace;

use crate::errors::{Result, ScriptError};
use crate::types::{BindingValue, Bindings, FlatEnvironment};

/// Flatten `bindings` into a fresh environment map.
pub fn flatten(bindings: &Bindings) -> Result<FlatEnvironment> {
    let mut env = FlatEnvironment::new();
    flatten_into(Some(bindings), Some(&mut env))?;
    Ok(env)
}

/// Flatten `bindings` on top of an existing environment.
///
/// Missing bindings or a missing target is a no-op, not an error. Entries
/// produced from bindings replace any existing entry of the same name.
pub fn flatten_into(
    bindings: Option<&Bindings>,
    environment: Option<&mut FlatEnvironment>,
) -> Result<()> {
    let (Some(bindings), Some(environment)) = (bindings, environment) else {
        return Ok(());
    };

    for (name, value) in bindings.iter() {
        validate_name(name)?;

        match value {
            BindingValue::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    environment.insert(format!("{name}_{index}"), item.to_string());
                }
            }
            BindingValue::Map(map) => {
                for (key, item) in map.iter() {
                    environment.insert(format!("{name}_{key}"), item.to_string());
                }
            }
            scalar => {
                environment.insert(name.clone(), scalar.to_string());
            }
        }
    }

    trace!(bindings = bindings.len(), entries = environment.len(), "flattened bindings");
    Ok(())
}

/// Environment variables must be named; `=` and NUL cannot appear in a name.
fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ScriptError::InvalidBinding(
            "binding name must not be empty".to_string(),
        ));
    }
    if name.contains('=') || name.contains('\0') {
        return Err(ScriptError::InvalidBinding(format!(
            "binding name '{}' cannot be used as an environment variable name",
            name.escape_debug()
        )));
    }
    Ok(())
}
