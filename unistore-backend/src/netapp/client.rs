//! The NetApp filer as seen by the adapter.
//!
//! [`FilerClient`] is the small set of operations the adapter needs from a
//! vendor SDK. Implementations wrap whatever transport talks to the cluster;
//! the adapter never sees their native errors, only [`FilerError`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::StorageError;

/// Errors reported by a filer client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FilerError {
    /// The filer has no object with that name.
    #[error("entry doesn't exist: {0}")]
    NotFound(String),

    /// The filer refused the request as invalid.
    #[error("invalid request: {0}")]
    Rejected(String),

    /// The filer already has an object with that name.
    #[error("duplicate entry: {0}")]
    Duplicate(String),

    /// The filer could not be reached or failed internally.
    #[error("filer unavailable: {0}")]
    Unavailable(String),
}

/// Result type alias for filer calls.
pub type FilerResult<T> = std::result::Result<T, FilerError>;

impl From<FilerError> for StorageError {
    fn from(err: FilerError) -> Self {
        match err {
            FilerError::NotFound(msg) => StorageError::NotFound(msg),
            FilerError::Rejected(msg) => StorageError::InvalidInput(msg),
            FilerError::Duplicate(msg) => StorageError::AlreadyExists(msg),
            FilerError::Unavailable(msg) => {
                StorageError::Internal(format!("Filer call failed: {}", msg))
            }
        }
    }
}

/// A volume as reported by the filer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilerVolume {
    /// Filer-native volume name
    pub name: String,
    /// Filer-assigned UUID
    pub uuid: Option<String>,
    /// Node currently hosting the volume
    pub node_name: String,
    /// Junction path in the namespace (None when unmounted)
    pub junction_path: Option<String>,
    /// Aggregate the volume lives on
    pub containing_aggregate_name: Option<String>,
    /// "online", "restricted" or "offline"
    pub state: Option<String>,
    /// Export policy applied to the volume
    pub active_policy_name: Option<String>,
    /// Provisioned size in bytes
    pub size_total_bytes: u64,
    /// Used size in bytes
    pub size_used_bytes: u64,
    /// Autosize on/off
    pub autosize_enabled: bool,
    /// Autosize growth step in bytes
    pub autosize_increment: u64,
    /// Autosize ceiling in bytes
    pub max_autosize: u64,
    /// Share of the volume reserved for snapshots
    pub snapshot_reserve_percent: Option<u32>,
}

impl FilerVolume {
    /// Whether the volume is usable, i.e. neither restricted nor offline.
    pub fn is_active(&self) -> bool {
        !matches!(self.state.as_deref(), Some("restricted") | Some("offline"))
    }
}

/// Filter for volume listings. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VolumeFilter {
    /// Filer-native volume name
    pub name: Option<String>,
    /// Junction path
    pub junction_path: Option<String>,
    /// Hosting node
    pub node_name: Option<String>,
}

impl VolumeFilter {
    /// Match any volume.
    pub fn all() -> Self {
        Self::default()
    }

    /// Match a junction path.
    pub fn with_junction_path(mut self, junction_path: impl Into<String>) -> Self {
        self.junction_path = Some(junction_path.into());
        self
    }

    /// Match a hosting node.
    pub fn with_node_name(mut self, node_name: Option<String>) -> Self {
        self.node_name = node_name;
        self
    }

    /// Whether `volume` satisfies the filter.
    pub fn matches(&self, volume: &FilerVolume) -> bool {
        self.name.as_ref().map_or(true, |n| *n == volume.name)
            && self
                .junction_path
                .as_ref()
                .map_or(true, |p| volume.junction_path.as_ref() == Some(p))
            && self.node_name.as_ref().map_or(true, |n| *n == volume.node_name)
    }
}

/// A storage aggregate (pool of disks).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Aggregate {
    /// Aggregate name
    pub name: String,
    /// Node the aggregate is homed on
    pub node_name: String,
    /// Free bytes
    pub bytes_available: u64,
}

/// One rule of an export policy, with its filer-side index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRule {
    /// Rule index within the policy
    pub index: u32,
    /// Client match: IP address with optional mask
    pub rule: String,
}

/// A lock held on a file in a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilerLock {
    /// Address of the client holding the lock
    pub client_address: String,
}

/// Autosize settings of a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutosizeSettings {
    /// Autosize on/off
    pub enabled: bool,
    /// Growth step in bytes
    pub increment_bytes: u64,
    /// Ceiling in bytes
    pub max_size_bytes: u64,
}

/// Parameters for creating a volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVolumeRequest {
    /// Filer-native volume name
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Junction path to mount the volume under
    pub junction_path: String,
    /// Aggregate to allocate from
    pub aggregate_name: String,
}

/// Parameters for cloning a volume from a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneVolumeRequest {
    /// Filer-native name of the parent volume
    pub parent_volume: String,
    /// Snapshot of the parent to clone from
    pub parent_snapshot: String,
    /// Filer-native name for the clone
    pub clone_name: String,
    /// Junction path to mount the clone under
    pub junction_path: String,
}

/// Operations the NetApp adapter needs from the filer.
///
/// All volume arguments are filer-native volume names.
#[async_trait]
pub trait FilerClient: Send + Sync + std::fmt::Debug {
    /// List volumes matching the filter.
    async fn volumes(&self, filter: &VolumeFilter) -> FilerResult<Vec<FilerVolume>>;

    /// List all aggregates.
    async fn aggregates(&self) -> FilerResult<Vec<Aggregate>>;

    /// Create and mount a volume.
    async fn create_volume(&self, request: &CreateVolumeRequest) -> FilerResult<()>;

    /// Put a volume in the restricted state.
    async fn restrict_volume(&self, volume: &str) -> FilerResult<()>;

    /// Change the autosize settings of a volume.
    async fn set_volume_autosize(&self, volume: &str, settings: &AutosizeSettings) -> FilerResult<()>;

    /// Rules of an export policy.
    async fn export_rules_of(&self, policy: &str) -> FilerResult<Vec<ExportRule>>;

    /// Create an export policy with an initial rule set.
    async fn create_export_policy(&self, policy: &str, rules: &[String]) -> FilerResult<()>;

    /// Delete an export policy.
    async fn delete_export_policy(&self, policy: &str) -> FilerResult<()>;

    /// Make `policy` the active export policy of a volume.
    async fn set_volume_export_policy(&self, volume: &str, policy: &str) -> FilerResult<()>;

    /// Append a rule to an export policy.
    async fn add_export_rule(&self, policy: &str, rule: &str) -> FilerResult<()>;

    /// Remove the rule at `index` from an export policy.
    async fn remove_export_rule(&self, policy: &str, index: u32) -> FilerResult<()>;

    /// Snapshot names of a volume.
    async fn snapshots_of(&self, volume: &str) -> FilerResult<Vec<String>>;

    /// Take a snapshot.
    async fn create_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()>;

    /// Delete a snapshot.
    async fn delete_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()>;

    /// Restore a volume from one of its snapshots.
    async fn rollback_volume_from_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()>;

    /// Create a FlexClone of a volume from a snapshot.
    async fn clone_volume(&self, request: &CloneVolumeRequest) -> FilerResult<()>;

    /// Locks currently held on files of a volume.
    async fn locks_on(&self, volume: &str) -> FilerResult<Vec<FilerLock>>;

    /// Break the locks a client holds on a volume.
    async fn break_lock(&self, volume: &str, client_address: &str) -> FilerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn volume(state: Option<&str>) -> FilerVolume {
        FilerVolume {
            name: "vol_toto".to_string(),
            uuid: None,
            node_name: "node-1".to_string(),
            junction_path: Some("/ORA/dbs00/TOTO".to_string()),
            containing_aggregate_name: None,
            state: state.map(str::to_string),
            active_policy_name: None,
            size_total_bytes: 0,
            size_used_bytes: 0,
            autosize_enabled: false,
            autosize_increment: 0,
            max_autosize: 0,
            snapshot_reserve_percent: None,
        }
    }

    #[test]
    fn test_error_mapping() {
        let cases = [
            (FilerError::NotFound("x".into()), ErrorKind::NotFound),
            (FilerError::Rejected("x".into()), ErrorKind::InvalidInput),
            (FilerError::Duplicate("x".into()), ErrorKind::AlreadyExists),
            (FilerError::Unavailable("x".into()), ErrorKind::Internal),
        ];
        for (err, kind) in cases {
            assert_eq!(StorageError::from(err).kind(), kind);
        }
    }

    #[test]
    fn test_active_states() {
        assert!(volume(Some("online")).is_active());
        assert!(volume(None).is_active());
        assert!(!volume(Some("restricted")).is_active());
        assert!(!volume(Some("offline")).is_active());
    }

    #[test]
    fn test_filter_matches() {
        let vol = volume(Some("online"));
        assert!(VolumeFilter::all().matches(&vol));
        assert!(VolumeFilter::all()
            .with_junction_path("/ORA/dbs00/TOTO")
            .with_node_name(Some("node-1".into()))
            .matches(&vol));
        assert!(!VolumeFilter::all().with_junction_path("/other").matches(&vol));
        assert!(!VolumeFilter::all()
            .with_junction_path("/ORA/dbs00/TOTO")
            .with_node_name(Some("node-2".into()))
            .matches(&vol));
    }
}
