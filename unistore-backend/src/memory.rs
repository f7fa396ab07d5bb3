//! Reference in-memory storage backend.
//!
//! Holds every entity in process memory and follows the contract to the
//! letter. It serves as the conformance baseline for other backends and as a
//! test double for callers.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{policy_404, snapshot_404, vol_404, Result, StorageError};
use crate::fields;
use crate::schema::{self, Validator, VOLUME_SCHEMA};
use crate::traits::StorageBackend;
use crate::types::{ExportPolicy, Record, Snapshot, Volume};

/// Filer address given to volumes created without one.
pub const DEFAULT_FILER_ADDRESS: &str = "memory-filer";

/// Fields callers may not change through `patch_volume`.
const READ_ONLY_FIELDS: &[&str] = &["name", "uuid"];

/// A snapshot together with the volume record it captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSnapshot {
    /// Snapshot name
    pub name: String,
    /// Capture time
    pub created_at: DateTime<Utc>,
    /// Volume record at capture time
    pub volume: Record,
}

impl StoredSnapshot {
    fn describe(&self) -> Snapshot {
        let mut snapshot =
            Snapshot::new(&self.name).with_metadata("created_at", self.created_at.to_rfc3339());
        for key in ["size_used", "size_total"] {
            if let Some(value) = self.volume.get(key) {
                snapshot = snapshot.with_metadata(key, value.clone());
            }
        }
        snapshot
    }
}

/// Complete state of a [`MemoryBackend`].
///
/// All four maps are keyed by volume name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Inventory {
    /// Volume records
    pub volumes: BTreeMap<String, Record>,
    /// Lock holders
    pub locks: BTreeMap<String, String>,
    /// Export policies in creation order
    pub policies: BTreeMap<String, Vec<ExportPolicy>>,
    /// Snapshots in creation order
    pub snapshots: BTreeMap<String, Vec<StoredSnapshot>>,
}

impl Inventory {
    fn ensure_volume(&self, volume_name: &str) -> Result<()> {
        if self.volumes.contains_key(volume_name) {
            Ok(())
        } else {
            Err(StorageError::NotFound(vol_404(volume_name)))
        }
    }

    fn snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<&StoredSnapshot> {
        self.ensure_volume(volume_name)?;
        self.snapshots
            .get(volume_name)
            .and_then(|snaps| snaps.iter().find(|s| s.name == snapshot_name))
            .ok_or_else(|| StorageError::NotFound(snapshot_404(volume_name, snapshot_name)))
    }

    fn policy(&self, volume_name: &str, policy_name: &str) -> Result<&ExportPolicy> {
        self.ensure_volume(volume_name)?;
        self.policies
            .get(volume_name)
            .and_then(|policies| policies.iter().find(|p| p.name == policy_name))
            .ok_or_else(|| StorageError::NotFound(policy_404(volume_name, policy_name)))
    }

    fn policy_mut(&mut self, volume_name: &str, policy_name: &str) -> Result<&mut ExportPolicy> {
        self.ensure_volume(volume_name)?;
        self.policies
            .get_mut(volume_name)
            .and_then(|policies| policies.iter_mut().find(|p| p.name == policy_name))
            .ok_or_else(|| StorageError::NotFound(policy_404(volume_name, policy_name)))
    }

    /// Insert a fresh volume with empty dependent state.
    fn install(&mut self, volume_name: &str, record: Record) {
        self.volumes.insert(volume_name.to_string(), record);
        self.locks.remove(volume_name);
        self.policies.insert(volume_name.to_string(), Vec::new());
        self.snapshots.insert(volume_name.to_string(), Vec::new());
    }
}

/// Validate caller-supplied volume data. Violations are the caller's fault.
fn validate_input(record: Record) -> Result<Record> {
    Validator::new(VOLUME_SCHEMA)?
        .allow_unknown(true)
        .validate(record)
        .map_err(|e| match e {
            StorageError::SchemaViolation { fields, .. } => StorageError::InvalidInput(
                fields
                    .iter()
                    .map(|(field, reason)| format!("{}: {}", field, reason))
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            other => other,
        })
}

/// In-memory storage backend.
///
/// A single lock guards the whole inventory, so every check-then-write
/// sequence (existence checks, lock ownership, clone source and target) is
/// atomic with respect to concurrent callers.
#[derive(Debug)]
pub struct MemoryBackend {
    state: RwLock<Inventory>,
    filer_address: String,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::from_inventory(Inventory::default())
    }

    /// Create a backend seeded with existing state.
    pub fn from_inventory(inventory: Inventory) -> Self {
        info!(volumes = inventory.volumes.len(), "Creating in-memory storage backend");
        Self {
            state: RwLock::new(inventory),
            filer_address: DEFAULT_FILER_ADDRESS.to_string(),
        }
    }

    /// Set the filer address given to volumes created without one.
    pub fn with_filer_address(mut self, filer_address: impl Into<String>) -> Self {
        self.filer_address = filer_address.into();
        self
    }

    /// Copy of the current state.
    pub fn inventory(&self) -> Result<Inventory> {
        Ok(self.read()?.clone())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Inventory>> {
        self.state
            .read()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inventory>> {
        self.state
            .write()
            .map_err(|_| StorageError::Internal("Lock poisoned".to_string()))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    #[instrument(skip(self))]
    async fn volumes(&self) -> Result<Vec<Volume>> {
        let records: Vec<Value> = {
            let state = self.read()?;
            state.volumes.values().cloned().map(Value::Object).collect()
        };
        schema::normalize_volumes(Value::Array(records), true)
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn get_volume(&self, volume_name: &str) -> Result<Volume> {
        debug!("Trying to get volume");
        let record = {
            let state = self.read()?;
            state
                .volumes
                .get(volume_name)
                .cloned()
                .ok_or_else(|| StorageError::NotFound(vol_404(volume_name)))?
        };
        schema::normalize_volume(record, true)
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn create_volume(&self, volume_name: &str, fields: Record) -> Result<()> {
        info!(fields = ?fields, "Adding new volume");

        if volume_name.is_empty() {
            return Err(StorageError::InvalidInput("Volume name must not be empty".to_string()));
        }
        let size_total = fields::require_u64(&fields, "size_total")?;
        let size_used = fields::optional_u64(&fields, "size_used")?.unwrap_or(0);
        if let Some(name) = fields::optional_str(&fields, "name")? {
            if name != volume_name {
                return Err(StorageError::InvalidInput(format!(
                    "name '{}' does not match the volume identity '{}'",
                    name, volume_name
                )));
            }
        }
        let filer_address = fields::optional_str(&fields, "filer_address")?
            .unwrap_or(self.filer_address.as_str())
            .to_string();

        let mut record = fields;
        record.insert("name".into(), volume_name.into());
        record.insert("size_used".into(), size_used.into());
        record.insert("size_total".into(), size_total.into());
        record.insert("filer_address".into(), filer_address.into());
        record
            .entry("uuid")
            .or_insert_with(|| Uuid::new_v4().to_string().into());
        record.entry("state").or_insert_with(|| "online".into());
        let record = validate_input(record)?;

        let mut state = self.write()?;
        if state.volumes.contains_key(volume_name) {
            return Err(StorageError::AlreadyExists(format!(
                "Volume {} already exists!",
                volume_name
            )));
        }
        state.install(volume_name, record);

        info!("Volume created");
        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn patch_volume(&self, volume_name: &str, fields: Record) -> Result<()> {
        info!(fields = ?fields, "Updating volume");

        let mut state = self.write()?;
        let current = state
            .volumes
            .get(volume_name)
            .ok_or_else(|| StorageError::NotFound(vol_404(volume_name)))?;

        if let Some(field) = fields.keys().find(|k| READ_ONLY_FIELDS.contains(&k.as_str())) {
            return Err(StorageError::InvalidInput(format!("{} is read-only", field)));
        }

        let mut patched = current.clone();
        patched.extend(fields);
        let patched = validate_input(patched)?;
        state.volumes.insert(volume_name.to_string(), patched);

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn restrict_volume(&self, volume_name: &str) -> Result<()> {
        info!("Restricting volume");

        let mut state = self.write()?;
        state
            .volumes
            .remove(volume_name)
            .ok_or_else(|| StorageError::NotFound(vol_404(volume_name)))?;
        state.locks.remove(volume_name);
        state.policies.remove(volume_name);
        state.snapshots.remove(volume_name);

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn locks(&self, volume_name: &str) -> Result<Option<String>> {
        let state = self.read()?;
        state.ensure_volume(volume_name)?;
        Ok(state.locks.get(volume_name).cloned())
    }

    #[instrument(skip_all, fields(volume = %volume_name, owner = %host_owner))]
    async fn create_lock(&self, volume_name: &str, host_owner: &str) -> Result<()> {
        info!("Host owner is locking volume");

        let mut state = self.write()?;
        state.ensure_volume(volume_name)?;

        match state.locks.get(volume_name) {
            Some(holder) if holder != host_owner => Err(StorageError::Conflict(format!(
                "{} is already locked by {}!",
                volume_name, holder
            ))),
            _ => {
                state
                    .locks
                    .insert(volume_name.to_string(), host_owner.to_string());
                Ok(())
            }
        }
    }

    #[instrument(skip_all, fields(volume = %volume_name, owner = %host_owner))]
    async fn remove_lock(&self, volume_name: &str, host_owner: &str) -> Result<()> {
        let mut state = self.write()?;
        state.ensure_volume(volume_name)?;

        if state.locks.get(volume_name).map(String::as_str) == Some(host_owner) {
            state.locks.remove(volume_name);
            info!("Lock removed");
        } else {
            debug!("Lock not held by this owner, nothing to remove");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn policies(&self, volume_name: &str) -> Result<Vec<ExportPolicy>> {
        let state = self.read()?;
        state.ensure_volume(volume_name)?;
        Ok(state.policies.get(volume_name).cloned().unwrap_or_default())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn get_policy(&self, volume_name: &str, policy_name: &str) -> Result<Vec<String>> {
        let state = self.read()?;
        Ok(state.policy(volume_name, policy_name)?.rules.clone())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn create_policy(
        &self,
        volume_name: &str,
        policy_name: &str,
        rules: &[String],
    ) -> Result<()> {
        info!(rules = ?rules, "Adding policy");

        let mut state = self.write()?;
        state.ensure_volume(volume_name)?;

        let policies = state.policies.entry(volume_name.to_string()).or_default();
        if policies.iter().any(|p| p.name == policy_name) {
            return Err(StorageError::AlreadyExists(format!(
                "Policy {} already exists on volume {}",
                policy_name, volume_name
            )));
        }
        policies.push(ExportPolicy::new(policy_name, rules));

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn remove_policy(&self, volume_name: &str, policy_name: &str) -> Result<()> {
        info!("Removing policy");

        let mut state = self.write()?;
        state.policy(volume_name, policy_name)?;
        if let Some(policies) = state.policies.get_mut(volume_name) {
            policies.retain(|p| p.name != policy_name);
        }

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name, rule = %rule))]
    async fn ensure_policy_rule_present(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        let policy = state.policy_mut(volume_name, policy_name)?;

        if !policy.rules.iter().any(|r| r == rule) {
            policy.rules.push(rule.to_string());
            info!("Rule added");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name, rule = %rule))]
    async fn ensure_policy_rule_absent(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()> {
        let mut state = self.write()?;
        let policy = state.policy_mut(volume_name, policy_name)?;

        let before = policy.rules.len();
        policy.rules.retain(|r| r != rule);
        if policy.rules.len() != before {
            info!("Rule removed");
        }
        Ok(())
    }

    #[instrument(skip_all, fields(clone = %clone_volume_name, source = %from_volume_name, snapshot = %from_snapshot_name))]
    async fn clone_volume(
        &self,
        clone_volume_name: &str,
        from_volume_name: &str,
        from_snapshot_name: &str,
    ) -> Result<()> {
        info!("Cloning volume from snapshot");

        let mut state = self.write()?;
        let mut record = state
            .snapshot(from_volume_name, from_snapshot_name)?
            .volume
            .clone();

        if state.volumes.contains_key(clone_volume_name) {
            return Err(StorageError::AlreadyExists(format!(
                "Name already in use: {}",
                clone_volume_name
            )));
        }

        record.insert("name".into(), clone_volume_name.into());
        record.insert("uuid".into(), Uuid::new_v4().to_string().into());
        record.remove("active_policy_name");
        state.install(clone_volume_name, record);

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn create_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        info!("Creating snapshot");

        let mut state = self.write()?;
        let volume = state
            .volumes
            .get(volume_name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(vol_404(volume_name)))?;

        if snapshot_name.is_empty() {
            return Err(StorageError::InvalidInput(
                "Snapshot name must not be empty".to_string(),
            ));
        }

        let snapshots = state.snapshots.entry(volume_name.to_string()).or_default();
        if snapshots.iter().any(|s| s.name == snapshot_name) {
            return Err(StorageError::AlreadyExists(format!(
                "Snapshot {} already exists for volume {}",
                snapshot_name, volume_name
            )));
        }
        snapshots.push(StoredSnapshot {
            name: snapshot_name.to_string(),
            created_at: Utc::now(),
            volume,
        });

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn get_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<Snapshot> {
        debug!("Fetching snapshot");
        let state = self.read()?;
        Ok(state.snapshot(volume_name, snapshot_name)?.describe())
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn delete_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        info!("Deleting snapshot");

        let mut state = self.write()?;
        state.snapshot(volume_name, snapshot_name)?;
        if let Some(snapshots) = state.snapshots.get_mut(volume_name) {
            snapshots.retain(|s| s.name != snapshot_name);
        }

        Ok(())
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn get_snapshots(&self, volume_name: &str) -> Result<Vec<Snapshot>> {
        let state = self.read()?;
        state.ensure_volume(volume_name)?;
        Ok(state
            .snapshots
            .get(volume_name)
            .map(|snaps| snaps.iter().map(StoredSnapshot::describe).collect())
            .unwrap_or_default())
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %restore_snapshot_name))]
    async fn rollback_volume(&self, volume_name: &str, restore_snapshot_name: &str) -> Result<()> {
        info!("Restoring volume to snapshot");

        let mut state = self.write()?;
        let captured = state
            .snapshot(volume_name, restore_snapshot_name)?
            .volume
            .clone();
        state.volumes.insert(volume_name.to_string(), captured);

        Ok(())
    }
}
