//! Schema validation for records returned by backends.
//!
//! Every volume read goes through [`normalize_volume`] or
//! [`normalize_volumes`] before it reaches a caller, so a backend that
//! produces a malformed record fails loudly with
//! [`StorageError::SchemaViolation`] instead of leaking it.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::debug;

use crate::error::{Result, StorageError};
use crate::types::{Record, Volume};

/// Name under which the volume schema is registered.
pub const VOLUME_SCHEMA: &str = "volume";

/// Value type a field must carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Boolean,
}

/// Constraints on a single field.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    /// Field name
    pub name: &'static str,
    /// Expected value type
    pub field_type: FieldType,
    /// Whether the field must be present
    pub required: bool,
    /// Minimum string length
    pub min_length: Option<usize>,
    /// Minimum integer value
    pub min: Option<i64>,
}

impl FieldRule {
    const fn string(name: &'static str, required: bool) -> Self {
        Self {
            name,
            field_type: FieldType::String,
            required,
            min_length: Some(1),
            min: None,
        }
    }

    const fn count(name: &'static str, required: bool) -> Self {
        Self {
            name,
            field_type: FieldType::Integer,
            required,
            min_length: None,
            min: Some(0),
        }
    }
}

/// A named set of field rules.
#[derive(Debug)]
pub struct Schema {
    /// Registry name
    pub name: &'static str,
    /// Declared fields
    pub fields: &'static [FieldRule],
}

impl Schema {
    fn rule(&self, field: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|rule| rule.name == field)
    }
}

static VOLUME_FIELDS: [FieldRule; 9] = [
    FieldRule::string("name", true),
    FieldRule::string("uuid", false),
    FieldRule::string("active_policy_name", false),
    FieldRule::string("junction_path", false),
    FieldRule::string("aggregate_name", false),
    FieldRule::string("state", false),
    FieldRule::count("size_used", true),
    FieldRule::count("size_total", true),
    FieldRule::string("filer_address", true),
];

static SCHEMAS: [Schema; 1] = [Schema {
    name: VOLUME_SCHEMA,
    fields: &VOLUME_FIELDS,
}];

/// Look up a registered schema by name.
pub fn schema(name: &str) -> Result<&'static Schema> {
    SCHEMAS
        .iter()
        .find(|schema| schema.name == name)
        .ok_or_else(|| StorageError::Internal(format!("No schema registered as '{}'", name)))
}

/// Validates and normalizes records against one schema.
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    schema: &'static Schema,
    allow_unknown: bool,
}

impl Validator {
    /// Create a validator for a registered schema. Unknown fields are rejected.
    pub fn new(schema_name: &str) -> Result<Self> {
        Ok(Self {
            schema: schema(schema_name)?,
            allow_unknown: false,
        })
    }

    /// Set whether fields the schema does not declare are accepted.
    pub fn allow_unknown(mut self, allow: bool) -> Self {
        self.allow_unknown = allow;
        self
    }

    /// Validate one record and return its normalized form.
    ///
    /// Normalization drops optional fields whose value is `null`.
    pub fn validate(&self, record: Record) -> Result<Record> {
        let mut violations = BTreeMap::new();
        let mut normalized = Record::new();

        for (field, value) in record {
            match self.schema.rule(&field) {
                Some(rule) => {
                    if value.is_null() && !rule.required {
                        continue;
                    }
                    if let Err(reason) = check_value(rule, &value) {
                        violations.insert(field, reason);
                        continue;
                    }
                    normalized.insert(field, value);
                }
                None if self.allow_unknown => {
                    normalized.insert(field, value);
                }
                None => {
                    violations.insert(field, "unknown field".to_string());
                }
            }
        }

        for rule in self.schema.fields.iter().filter(|rule| rule.required) {
            if !normalized.contains_key(rule.name) && !violations.contains_key(rule.name) {
                violations.insert(rule.name.to_string(), "required field".to_string());
            }
        }

        if violations.is_empty() {
            Ok(normalized)
        } else {
            debug!(schema = %self.schema.name, violations = ?violations, "Record failed validation");
            Err(StorageError::SchemaViolation {
                schema: self.schema.name.to_string(),
                fields: violations,
            })
        }
    }

    /// Validate every element of a sequence of records.
    ///
    /// Anything other than an array of objects, including a bare string, is
    /// a schema violation.
    pub fn validate_list(&self, value: Value) -> Result<Vec<Record>> {
        let items = match value {
            Value::Array(items) => items,
            other => return Err(self.not_a_list(&other)),
        };

        items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => self.validate(record),
                other => Err(self.not_a_list(&other)),
            })
            .collect()
    }

    fn not_a_list(&self, got: &Value) -> StorageError {
        StorageError::SchemaViolation {
            schema: self.schema.name.to_string(),
            fields: BTreeMap::from([(
                "_record".to_string(),
                format!("Expected a list of records, got {}", type_name(got)),
            )]),
        }
    }
}

fn check_value(rule: &FieldRule, value: &Value) -> std::result::Result<(), String> {
    match rule.field_type {
        FieldType::String => {
            let s = value.as_str().ok_or_else(|| "must be of string type".to_string())?;
            if let Some(min_length) = rule.min_length {
                if s.chars().count() < min_length {
                    return Err(format!("min length is {}", min_length));
                }
            }
        }
        FieldType::Integer => {
            let n = match (value.as_i64(), value.as_u64()) {
                (Some(n), _) => n,
                (None, Some(_)) => i64::MAX,
                (None, None) => return Err("must be of integer type".to_string()),
            };
            if let Some(min) = rule.min {
                if n < min {
                    return Err(format!("min value is {}", min));
                }
            }
        }
        FieldType::Boolean => {
            if !value.is_boolean() {
                return Err("must be of boolean type".to_string());
            }
        }
    }
    Ok(())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a record",
    }
}

/// Validate a raw volume record and convert it to a [`Volume`].
pub fn normalize_volume(record: Record, allow_unknown: bool) -> Result<Volume> {
    let record = Validator::new(VOLUME_SCHEMA)?
        .allow_unknown(allow_unknown)
        .validate(record)?;
    Volume::from_record(record)
}

/// Validate a sequence of raw volume records.
pub fn normalize_volumes(value: Value, allow_unknown: bool) -> Result<Vec<Volume>> {
    Validator::new(VOLUME_SCHEMA)?
        .allow_unknown(allow_unknown)
        .validate_list(value)?
        .into_iter()
        .map(Volume::from_record)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn valid_volume() -> Value {
        json!({
            "name": "vol1",
            "size_used": 0,
            "size_total": 100,
            "filer_address": "filer-1",
        })
    }

    fn violations(err: StorageError) -> BTreeMap<String, String> {
        match err {
            StorageError::SchemaViolation { fields, .. } => fields,
            other => panic!("expected schema violation, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_volume_passes() {
        let volume = normalize_volume(record(valid_volume()), false).unwrap();
        assert_eq!(volume.name, "vol1");
        assert_eq!(volume.size_total, 100);
        assert_eq!(volume.state, None);
    }

    #[test]
    fn test_missing_required_fields() {
        let err = normalize_volume(record(json!({"name": "vol1"})), false).unwrap_err();
        let fields = violations(err);
        assert_eq!(
            fields.keys().cloned().collect::<Vec<_>>(),
            vec!["filer_address", "size_total", "size_used"]
        );
    }

    #[test]
    fn test_constraints() {
        let mut bad = record(valid_volume());
        bad.insert("size_used".into(), json!(-5));
        bad.insert("name".into(), json!(""));
        bad.insert("size_total".into(), json!(1.5));
        let fields = violations(normalize_volume(bad, false).unwrap_err());
        assert_eq!(fields["size_used"], "min value is 0");
        assert_eq!(fields["name"], "min length is 1");
        assert_eq!(fields["size_total"], "must be of integer type");
    }

    #[test]
    fn test_unknown_fields() {
        let mut extended = record(valid_volume());
        extended.insert("max_autosize".into(), json!(4096));

        let fields = violations(normalize_volume(extended.clone(), false).unwrap_err());
        assert_eq!(fields["max_autosize"], "unknown field");

        let volume = normalize_volume(extended, true).unwrap();
        assert_eq!(volume.extra["max_autosize"], json!(4096));
    }

    #[test]
    fn test_null_optional_is_dropped() {
        let mut with_null = record(valid_volume());
        with_null.insert("active_policy_name".into(), Value::Null);
        let normalized = Validator::new(VOLUME_SCHEMA).unwrap().validate(with_null).unwrap();
        assert!(!normalized.contains_key("active_policy_name"));
    }

    #[test]
    fn test_list_validation() {
        let volumes = normalize_volumes(json!([valid_volume(), valid_volume()]), false).unwrap();
        assert_eq!(volumes.len(), 2);

        let err = normalize_volumes(json!("vol1"), false).unwrap_err();
        assert!(matches!(err, StorageError::SchemaViolation { .. }));

        let err = normalize_volumes(json!(["vol1"]), false).unwrap_err();
        assert!(matches!(err, StorageError::SchemaViolation { .. }));
    }

    #[test]
    fn test_unknown_schema() {
        assert!(matches!(Validator::new("snapshot"), Err(StorageError::Internal(_))));
    }
}
