//! Accessors for caller-supplied field maps.
//!
//! `create_volume` and `patch_volume` receive their data as a [`Record`].
//! These helpers pull typed values out of it and turn anything missing or
//! malformed into [`StorageError::InvalidInput`].

use serde_json::Value;

use crate::error::{Result, StorageError};
use crate::types::Record;

/// Get a required non-negative integer field.
pub fn require_u64(fields: &Record, key: &str) -> Result<u64> {
    optional_u64(fields, key)?
        .ok_or_else(|| StorageError::InvalidInput(format!("Must provide {}", key)))
}

/// Get an optional non-negative integer field.
pub fn optional_u64(fields: &Record, key: &str) -> Result<Option<u64>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value.as_u64().map(Some).ok_or_else(|| {
            StorageError::InvalidInput(format!(
                "{} must be a non-negative integer, got {}",
                key, value
            ))
        }),
    }
}

/// Get a required non-empty string field.
pub fn require_str<'a>(fields: &'a Record, key: &str) -> Result<&'a str> {
    optional_str(fields, key)?
        .ok_or_else(|| StorageError::InvalidInput(format!("Must provide {}", key)))
}

/// Get an optional non-empty string field.
pub fn optional_str<'a>(fields: &'a Record, key: &str) -> Result<Option<&'a str>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if !s.is_empty() => Ok(Some(s.as_str())),
        Some(value) => Err(StorageError::InvalidInput(format!(
            "{} must be a non-empty string, got {}",
            key, value
        ))),
    }
}

/// Get an optional boolean field.
pub fn optional_bool(fields: &Record, key: &str) -> Result<Option<bool>> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(value) => Err(StorageError::InvalidInput(format!(
            "{} must be a boolean, got {}",
            key, value
        ))),
    }
}

/// Reject any field outside `allowed`.
pub fn reject_unknown(fields: &Record, allowed: &[&str]) -> Result<()> {
    let unknown: Vec<&str> = fields
        .keys()
        .map(String::as_str)
        .filter(|key| !allowed.contains(key))
        .collect();

    if unknown.is_empty() {
        Ok(())
    } else {
        Err(StorageError::InvalidInput(format!(
            "Fields cannot be written: {}",
            unknown.join(", ")
        )))
    }
}
