//! Type definitions for volumes, snapshots and export policies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, StorageError};

/// A raw record: field name mapped to a JSON value.
///
/// Backends produce raw records, the schema validator normalizes them, and
/// create/patch operations receive their caller-supplied fields in this shape.
pub type Record = serde_json::Map<String, Value>;

// =============================================================================
// VOLUME
// =============================================================================

/// A normalized volume record.
///
/// The named fields are the stable shape every backend agrees on. Anything a
/// backend adds on top lands in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    /// Volume identity within the backend
    pub name: String,
    /// Backend-assigned unique identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    /// Name of the export policy currently applied to the volume
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_policy_name: Option<String>,
    /// Filesystem path the volume is mounted under on the filer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub junction_path: Option<String>,
    /// Storage pool the volume was allocated from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_name: Option<String>,
    /// Backend-reported state (e.g. "online")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Bytes in use
    pub size_used: u64,
    /// Provisioned capacity in bytes
    pub size_total: u64,
    /// Node or server hosting the volume
    pub filer_address: String,
    /// Backend-specific fields
    #[serde(flatten)]
    pub extra: Record,
}

impl Volume {
    /// Build a typed volume from a record that already passed schema validation.
    pub fn from_record(record: Record) -> Result<Self> {
        serde_json::from_value(Value::Object(record)).map_err(|e| {
            StorageError::Internal(format!("Validated volume record did not decode: {}", e))
        })
    }

    /// Flatten the volume back into a raw record.
    pub fn to_record(&self) -> Record {
        match serde_json::to_value(self) {
            Ok(Value::Object(record)) => record,
            _ => Record::new(),
        }
    }
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// A point-in-time capture of a volume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot name, unique within its volume
    pub name: String,
    /// Backend-specific capture metadata
    #[serde(flatten)]
    pub metadata: Record,
}

impl Snapshot {
    /// Create a snapshot descriptor without metadata.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Record::new(),
        }
    }

    /// Attach a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// =============================================================================
// EXPORT POLICIES
// =============================================================================

/// A named, ordered set of export rules.
///
/// A policy with an empty rule list is a real policy; it is not the same as
/// the absence of a policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPolicy {
    /// Policy name
    pub name: String,
    /// Access rules: IP addresses with an optional mask
    pub rules: Vec<String>,
}

impl ExportPolicy {
    /// Create a policy, dropping duplicate rules.
    pub fn new(name: impl Into<String>, rules: &[String]) -> Self {
        Self {
            name: name.into(),
            rules: dedup_rules(rules),
        }
    }
}

/// Remove duplicate rules, keeping the order of first occurrence.
pub fn dedup_rules(rules: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(rules.len());
    for rule in rules {
        if !unique.contains(rule) {
            unique.push(rule.clone());
        }
    }
    unique
}
