//! Binding of untyped hook parameters into typed structs
//!
//! Hook invocations arrive with an opaque JSON payload attached. Each hook
//! declares a typed parameter struct; [`bind`] converts the payload into that
//! struct or fails with a binding error. Binding is total: a payload either
//! binds completely or is rejected, never silently half-populated.

use serde::de::DeserializeOwned;

use crate::{Error, Result};

/// Untyped parameter payload attached to a single hook invocation
///
/// Consumed exactly once by [`bind`].
pub type RawHookParams = serde_json::Value;

/// Bind a raw parameter payload to a hook's typed parameter struct
///
/// Rules:
/// - An absent payload (JSON null) binds to the struct's defaults.
/// - Unknown fields are ignored.
/// - Missing optional fields take the struct's documented defaults.
/// - A present field with the wrong type fails with [`Error::Binding`].
/// - A payload that is not structurally a mapping fails with [`Error::Binding`].
pub fn bind<T>(raw: RawHookParams) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if raw.is_null() {
        return Ok(T::default());
    }
    if !raw.is_object() {
        return Err(Error::binding(format!(
            "hook parameters must be a mapping, got {}",
            value_kind(&raw)
        )));
    }
    serde_json::from_value(raw).map_err(|e| Error::binding(format!("invalid hook parameters: {e}")))
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a mapping",
    }
}
