//! Translation between the local and remote row schemas.
//!
//! Locally, fields are camelCase. Remote rows use the snake_case form of the
//! same names plus an owner column. Only top-level keys are renamed; nested
//! values such as transaction line items travel as stored.
//!
//! Everything here is pure: no IO, no clock.

use crate::{error::Result, Entity, Error};
use serde_json::{Map, Value};

/// Remote column holding the owning identity.
pub const OWNER_COLUMN: &str = "user_id";

/// `pricePerUnit` -> `price_per_unit`.
pub fn to_snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for c in name.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// `price_per_unit` -> `pricePerUnit`.
pub fn to_camel_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper_next = false;
    for c in name.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Rename the top-level keys of an object to snake_case. Other values pass
/// through unchanged.
pub fn snake_case_keys(value: Value) -> Value {
    rename_keys(value, to_snake_case)
}

/// Rename the top-level keys of an object to camelCase. Other values pass
/// through unchanged.
pub fn camel_case_keys(value: Value) -> Value {
    rename_keys(value, to_camel_case)
}

fn rename_keys(value: Value, rename: fn(&str) -> String) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, v)| (rename(&key), v))
                .collect::<Map<_, _>>(),
        ),
        other => other,
    }
}

/// Replace every empty string with `null`, recursively.
pub fn nullify_empty_strings(value: Value) -> Value {
    match value {
        Value::String(s) if s.is_empty() => Value::Null,
        Value::Array(items) => Value::Array(items.into_iter().map(nullify_empty_strings).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, nullify_empty_strings(v)))
                .collect(),
        ),
        other => other,
    }
}

/// Build the remote row for `entity`, owned by `owner`.
pub fn to_remote_row(entity: &Entity, owner: &str) -> Result<Value> {
    let row = nullify_empty_strings(snake_case_keys(entity.to_value()?));
    match row {
        Value::Object(mut map) => {
            map.insert(OWNER_COLUMN.to_string(), Value::String(owner.to_string()));
            Ok(Value::Object(map))
        }
        _ => Err(Error::InvalidRecord(format!(
            "{} {} does not encode to an object",
            entity.table(),
            entity.id()
        ))),
    }
}

/// Convert a remote row back to the local schema, dropping the owner column.
pub fn from_remote_row(row: Value) -> Value {
    match row {
        Value::Object(mut map) => {
            map.remove(OWNER_COLUMN);
            camel_case_keys(Value::Object(map))
        }
        other => other,
    }
}
