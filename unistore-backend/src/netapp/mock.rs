//! Mock NetApp filer for testing and development.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tracing::{debug, info};
use uuid::Uuid;

use super::client::{
    Aggregate, AutosizeSettings, CloneVolumeRequest, CreateVolumeRequest, ExportRule,
    FilerClient, FilerError, FilerLock, FilerResult, FilerVolume, VolumeFilter,
};

/// Node name given to volumes created on the mock filer.
pub const MOCK_NODE_NAME: &str = "mock-node-1";

#[derive(Debug, Default)]
struct FilerState {
    volumes: Vec<FilerVolume>,
    aggregates: Vec<Aggregate>,
    policies: BTreeMap<String, Vec<ExportRule>>,
    snapshots: BTreeMap<String, Vec<String>>,
    locks: BTreeMap<String, Vec<FilerLock>>,
    unavailable: bool,
    failing: BTreeSet<String>,
}

impl FilerState {
    fn reachable(&self, operation: &str) -> FilerResult<()> {
        if self.unavailable {
            return Err(FilerError::Unavailable("connection refused".to_string()));
        }
        if self.failing.contains(operation) {
            return Err(FilerError::Unavailable(format!("{} timed out", operation)));
        }
        Ok(())
    }

    fn volume_mut(&mut self, name: &str) -> FilerResult<&mut FilerVolume> {
        self.volumes
            .iter_mut()
            .find(|v| v.name == name)
            .ok_or_else(|| FilerError::NotFound(format!("volume {}", name)))
    }

    fn rules_mut(&mut self, policy: &str) -> FilerResult<&mut Vec<ExportRule>> {
        self.policies
            .get_mut(policy)
            .ok_or_else(|| FilerError::NotFound(format!("export policy {}", policy)))
    }

    fn snapshots_mut(&mut self, volume: &str) -> FilerResult<&mut Vec<String>> {
        self.snapshots
            .get_mut(volume)
            .ok_or_else(|| FilerError::NotFound(format!("volume {}", volume)))
    }
}

/// Mock filer for testing.
///
/// Simulates a single-SVM cluster in memory. Useful for:
/// - Exercising the NetApp adapter without a cluster
/// - Injecting client-held locks and transport outages
#[derive(Debug)]
pub struct MockFiler {
    state: RwLock<FilerState>,
}

impl MockFiler {
    /// Create a mock filer with a root aggregate and two data aggregates.
    pub fn new() -> Self {
        info!("Creating mock filer");
        let filer = Self::empty();
        if let Ok(mut state) = filer.state.write() {
            state.aggregates = [
                ("aggr0_root", 8 << 40),
                ("aggr1_data", 1 << 40),
                ("aggr2_data", 2 << 40),
            ]
            .into_iter()
            .map(|(name, bytes_available)| Aggregate {
                name: name.to_string(),
                node_name: MOCK_NODE_NAME.to_string(),
                bytes_available,
            })
            .collect();
        }
        filer
    }

    /// Create a mock filer without any aggregate.
    pub fn empty() -> Self {
        Self {
            state: RwLock::new(FilerState::default()),
        }
    }

    /// Add an aggregate homed on [`MOCK_NODE_NAME`].
    pub fn with_aggregate(self, name: impl Into<String>, bytes_available: u64) -> Self {
        self.with_node_aggregate(MOCK_NODE_NAME, name, bytes_available)
    }

    /// Add an aggregate homed on another node of the cluster.
    pub fn with_node_aggregate(
        self,
        node_name: impl Into<String>,
        name: impl Into<String>,
        bytes_available: u64,
    ) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.aggregates.push(Aggregate {
                name: name.into(),
                node_name: node_name.into(),
                bytes_available,
            });
        }
        self
    }

    /// Add a pre-existing volume.
    pub fn with_volume(self, volume: FilerVolume) -> Self {
        if let Ok(mut state) = self.state.write() {
            state.snapshots.entry(volume.name.clone()).or_default();
            state.volumes.push(volume);
        }
        self
    }

    /// Simulate an NFS client holding a lock on a volume.
    pub fn hold_lock(&self, volume: &str, client_address: &str) -> FilerResult<()> {
        let mut state = self.admin()?;
        state.volume_mut(volume)?;
        state
            .locks
            .entry(volume.to_string())
            .or_default()
            .push(FilerLock {
                client_address: client_address.to_string(),
            });
        Ok(())
    }

    /// Make every subsequent call fail as if the cluster were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) -> FilerResult<()> {
        self.admin()?.unavailable = unavailable;
        Ok(())
    }

    /// Make one filer operation (named after its [`FilerClient`] method)
    /// fail as if the call timed out, or succeed again.
    pub fn set_failing(&self, operation: &str, failing: bool) -> FilerResult<()> {
        let mut state = self.admin()?;
        if failing {
            state.failing.insert(operation.to_string());
        } else {
            state.failing.remove(operation);
        }
        Ok(())
    }

    /// Direct view of a volume, bypassing outage simulation.
    pub fn inspect_volume(&self, name: &str) -> Option<FilerVolume> {
        self.admin()
            .ok()
            .and_then(|state| state.volumes.iter().find(|v| v.name == name).cloned())
    }

    fn read(&self, operation: &str) -> FilerResult<RwLockReadGuard<'_, FilerState>> {
        let state = self
            .state
            .read()
            .map_err(|_| FilerError::Unavailable("Lock poisoned".to_string()))?;
        state.reachable(operation)?;
        Ok(state)
    }

    fn write(&self, operation: &str) -> FilerResult<RwLockWriteGuard<'_, FilerState>> {
        let state = self
            .state
            .write()
            .map_err(|_| FilerError::Unavailable("Lock poisoned".to_string()))?;
        state.reachable(operation)?;
        Ok(state)
    }

    /// Like `write`, but reachable while the filer is marked unavailable.
    fn admin(&self) -> FilerResult<RwLockWriteGuard<'_, FilerState>> {
        self.state
            .write()
            .map_err(|_| FilerError::Unavailable("Lock poisoned".to_string()))
    }
}

impl Default for MockFiler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FilerClient for MockFiler {
    async fn volumes(&self, filter: &VolumeFilter) -> FilerResult<Vec<FilerVolume>> {
        let state = self.read("volumes")?;
        Ok(state
            .volumes
            .iter()
            .filter(|v| filter.matches(v))
            .cloned()
            .collect())
    }

    async fn aggregates(&self) -> FilerResult<Vec<Aggregate>> {
        Ok(self.read("aggregates")?.aggregates.clone())
    }

    async fn create_volume(&self, request: &CreateVolumeRequest) -> FilerResult<()> {
        let mut state = self.write("create_volume")?;

        if state.volumes.iter().any(|v| v.name == request.name) {
            return Err(FilerError::Duplicate(format!("volume {}", request.name)));
        }
        let node_name = state
            .aggregates
            .iter()
            .find(|a| a.name == request.aggregate_name)
            .map(|a| a.node_name.clone())
            .ok_or_else(|| {
                FilerError::Rejected(format!(
                    "aggregate {} does not exist",
                    request.aggregate_name
                ))
            })?;

        state.volumes.push(FilerVolume {
            name: request.name.clone(),
            uuid: Some(Uuid::new_v4().to_string()),
            node_name,
            junction_path: Some(request.junction_path.clone()),
            containing_aggregate_name: Some(request.aggregate_name.clone()),
            state: Some("online".to_string()),
            active_policy_name: None,
            size_total_bytes: request.size_bytes,
            size_used_bytes: 0,
            autosize_enabled: false,
            autosize_increment: 0,
            max_autosize: request.size_bytes,
            snapshot_reserve_percent: Some(5),
        });
        state.snapshots.insert(request.name.clone(), Vec::new());
        debug!(volume = %request.name, "Mock volume created");
        Ok(())
    }

    async fn restrict_volume(&self, volume: &str) -> FilerResult<()> {
        let mut state = self.write("restrict_volume")?;
        state.volume_mut(volume)?.state = Some("restricted".to_string());
        state.locks.remove(volume);
        Ok(())
    }

    async fn set_volume_autosize(&self, volume: &str, settings: &AutosizeSettings) -> FilerResult<()> {
        let mut state = self.write("set_volume_autosize")?;
        let vol = state.volume_mut(volume)?;
        vol.autosize_enabled = settings.enabled;
        vol.autosize_increment = settings.increment_bytes;
        vol.max_autosize = settings.max_size_bytes;
        Ok(())
    }

    async fn export_rules_of(&self, policy: &str) -> FilerResult<Vec<ExportRule>> {
        self.read("export_rules_of")?
            .policies
            .get(policy)
            .cloned()
            .ok_or_else(|| FilerError::NotFound(format!("export policy {}", policy)))
    }

    async fn create_export_policy(&self, policy: &str, rules: &[String]) -> FilerResult<()> {
        let mut state = self.write("create_export_policy")?;
        if state.policies.contains_key(policy) {
            return Err(FilerError::Duplicate(format!("export policy {}", policy)));
        }
        let rules = rules
            .iter()
            .zip(1..)
            .map(|(rule, index)| ExportRule {
                index,
                rule: rule.clone(),
            })
            .collect();
        state.policies.insert(policy.to_string(), rules);
        Ok(())
    }

    async fn delete_export_policy(&self, policy: &str) -> FilerResult<()> {
        let mut state = self.write("delete_export_policy")?;
        if state.policies.remove(policy).is_none() {
            return Err(FilerError::NotFound(format!("export policy {}", policy)));
        }
        for vol in state.volumes.iter_mut() {
            if vol.active_policy_name.as_deref() == Some(policy) {
                vol.active_policy_name = None;
            }
        }
        Ok(())
    }

    async fn set_volume_export_policy(&self, volume: &str, policy: &str) -> FilerResult<()> {
        let mut state = self.write("set_volume_export_policy")?;
        state.rules_mut(policy)?;
        state.volume_mut(volume)?.active_policy_name = Some(policy.to_string());
        Ok(())
    }

    async fn add_export_rule(&self, policy: &str, rule: &str) -> FilerResult<()> {
        let mut state = self.write("add_export_rule")?;
        let rules = state.rules_mut(policy)?;
        let index = rules.iter().map(|r| r.index).max().unwrap_or(0) + 1;
        rules.push(ExportRule {
            index,
            rule: rule.to_string(),
        });
        Ok(())
    }

    async fn remove_export_rule(&self, policy: &str, index: u32) -> FilerResult<()> {
        let mut state = self.write("remove_export_rule")?;
        let rules = state.rules_mut(policy)?;
        let before = rules.len();
        rules.retain(|r| r.index != index);
        if rules.len() == before {
            return Err(FilerError::NotFound(format!("rule {} of {}", index, policy)));
        }
        Ok(())
    }

    async fn snapshots_of(&self, volume: &str) -> FilerResult<Vec<String>> {
        self.read("snapshots_of")?
            .snapshots
            .get(volume)
            .cloned()
            .ok_or_else(|| FilerError::NotFound(format!("volume {}", volume)))
    }

    async fn create_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()> {
        let mut state = self.write("create_snapshot")?;
        let snapshots = state.snapshots_mut(volume)?;
        if snapshots.iter().any(|s| s == snapshot) {
            return Err(FilerError::Duplicate(format!("snapshot {}", snapshot)));
        }
        snapshots.push(snapshot.to_string());
        Ok(())
    }

    async fn delete_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()> {
        let mut state = self.write("delete_snapshot")?;
        let snapshots = state.snapshots_mut(volume)?;
        let before = snapshots.len();
        snapshots.retain(|s| s != snapshot);
        if snapshots.len() == before {
            return Err(FilerError::NotFound(format!("snapshot {}", snapshot)));
        }
        Ok(())
    }

    async fn rollback_volume_from_snapshot(&self, volume: &str, snapshot: &str) -> FilerResult<()> {
        let mut state = self.write("rollback_volume_from_snapshot")?;
        if !state.snapshots_mut(volume)?.iter().any(|s| s == snapshot) {
            return Err(FilerError::NotFound(format!("snapshot {}", snapshot)));
        }
        Ok(())
    }

    async fn clone_volume(&self, request: &CloneVolumeRequest) -> FilerResult<()> {
        let mut state = self.write("clone_volume")?;

        if !state
            .snapshots_mut(&request.parent_volume)?
            .iter()
            .any(|s| *s == request.parent_snapshot)
        {
            return Err(FilerError::NotFound(format!(
                "snapshot {}",
                request.parent_snapshot
            )));
        }
        if state.volumes.iter().any(|v| v.name == request.clone_name) {
            return Err(FilerError::Duplicate(format!("volume {}", request.clone_name)));
        }

        let mut clone = state.volume_mut(&request.parent_volume)?.clone();
        clone.name = request.clone_name.clone();
        clone.uuid = Some(Uuid::new_v4().to_string());
        clone.junction_path = Some(request.junction_path.clone());
        clone.active_policy_name = None;
        clone.state = Some("online".to_string());

        state.snapshots.insert(clone.name.clone(), Vec::new());
        state.volumes.push(clone);
        Ok(())
    }

    async fn locks_on(&self, volume: &str) -> FilerResult<Vec<FilerLock>> {
        let state = self.read("locks_on")?;
        if !state.volumes.iter().any(|v| v.name == volume) {
            return Err(FilerError::NotFound(format!("volume {}", volume)));
        }
        Ok(state.locks.get(volume).cloned().unwrap_or_default())
    }

    async fn break_lock(&self, volume: &str, client_address: &str) -> FilerResult<()> {
        let mut state = self.write("break_lock")?;
        state.volume_mut(volume)?;
        if let Some(locks) = state.locks.get_mut(volume) {
            locks.retain(|l| l.client_address != client_address);
        }
        Ok(())
    }
}
