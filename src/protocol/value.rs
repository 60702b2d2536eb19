//! Value encoding used by the key-value service.
//!
//! The service stores strings. Structured values are stringified as JSON on
//! the way in, and stored strings that happen to be JSON are decoded on the
//! way out.

use serde_json::{Map, Value};

/// Prepare a value for storage: strings pass through unchanged, anything else
/// is stringified as JSON.
pub fn encode_value(value: Value) -> Value {
    // ---
    match value {
        Value::String(_) => value,
        other => Value::String(other.to_string()),
    }
}

/// Decode a stored value: a string that parses as JSON is returned parsed,
/// anything else is returned as is.
pub fn decode_value(value: Value) -> Value {
    // ---
    match value {
        Value::String(ref s) => serde_json::from_str(s).unwrap_or(value),
        other => other,
    }
}

/// Shallow merge of `patch` into `base` for partial updates.
///
/// When both sides are JSON objects the members of `patch` overwrite those of
/// `base`; otherwise `patch` replaces `base` entirely.
pub fn merge_values(base: Value, patch: Value) -> Value {
    // ---
    match (base, patch) {
        (Value::Object(mut base), Value::Object(patch)) => {
            merge_objects(&mut base, patch);
            Value::Object(base)
        }
        (_, patch) => patch,
    }
}

fn merge_objects(base: &mut Map<String, Value>, patch: Map<String, Value>) {
    for (k, v) in patch {
        base.insert(k, v);
    }
}
