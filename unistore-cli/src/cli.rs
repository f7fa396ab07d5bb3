//! Command-line argument parsing.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Value;

/// unistore - Manage volumes on any storage backend
#[derive(Parser, Debug)]
#[command(name = "unistore")]
#[command(about = "unistore - Manage volumes on any storage backend")]
#[command(version)]
pub struct Args {
    /// Path to configuration file (optional, defaults used if not found)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Inventory file of the in-memory backend
    #[arg(long, global = true, env = "UNISTORE_INVENTORY")]
    pub inventory: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Storage operations.
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    // ========================================================================
    // Volumes
    // ========================================================================
    /// List all volumes
    Volumes,

    /// Show one volume
    GetVolume { volume: String },

    /// Create a volume
    CreateVolume {
        volume: String,
        /// Volume field as key=value; values are parsed as JSON when possible
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Update writable fields of a volume
    PatchVolume {
        volume: String,
        /// Volume field as key=value; values are parsed as JSON when possible
        #[arg(short, long = "field", value_parser = parse_field)]
        fields: Vec<(String, Value)>,
    },

    /// Restrict (delete) a volume
    RestrictVolume { volume: String },

    // ========================================================================
    // Locks
    // ========================================================================
    /// Show the lock holder of a volume
    Locks { volume: String },

    /// Lock a volume on behalf of a host
    CreateLock { volume: String, owner: String },

    /// Release a lock held by a host
    RemoveLock { volume: String, owner: String },

    // ========================================================================
    // Export policies
    // ========================================================================
    /// List export policies of a volume
    Policies { volume: String },

    /// Show the rules of a policy
    GetPolicy { volume: String, policy: String },

    /// Create a policy
    CreatePolicy {
        volume: String,
        policy: String,
        /// Access rule (IP address with optional mask); repeatable
        #[arg(short, long = "rule")]
        rules: Vec<String>,
    },

    /// Remove a policy
    RemovePolicy { volume: String, policy: String },

    /// Make sure a rule is part of a policy
    AddRule {
        volume: String,
        policy: String,
        rule: String,
    },

    /// Make sure a rule is not part of a policy
    RemoveRule {
        volume: String,
        policy: String,
        rule: String,
    },

    // ========================================================================
    // Snapshots & clones
    // ========================================================================
    /// Create a volume from a snapshot of another
    CloneVolume {
        clone: String,
        from_volume: String,
        from_snapshot: String,
    },

    /// Take a snapshot
    CreateSnapshot { volume: String, snapshot: String },

    /// Show one snapshot
    GetSnapshot { volume: String, snapshot: String },

    /// Delete a snapshot
    DeleteSnapshot { volume: String, snapshot: String },

    /// List snapshots of a volume
    Snapshots { volume: String },

    /// Roll a volume back to a snapshot
    RollbackVolume { volume: String, snapshot: String },
}

impl Command {
    /// Whether the command can change backend state.
    pub fn is_mutating(&self) -> bool {
        !matches!(
            self,
            Self::Volumes
                | Self::GetVolume { .. }
                | Self::Locks { .. }
                | Self::Policies { .. }
                | Self::GetPolicy { .. }
                | Self::GetSnapshot { .. }
                | Self::Snapshots { .. }
        )
    }
}

/// Parse a `key=value` field. The value is read as JSON, falling back to a
/// plain string, so `size_total=100` is a number and `name=vol1` a string.
pub fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty field name in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}
