//! NetApp storage backend.
//!
//! Adapts a NetApp ONTAP filer to the storage contract. The filer is reached
//! through a [`FilerClient`]; this module only decides which calls to make
//! and what they mean to a caller.
//!
//! ## Addressing
//! - Volumes are addressed by junction path, optionally prefixed by the node
//!   hosting them (`node:/junction/path`, see [`VolumeKey`])
//! - The filer-native volume name is a separate field, given as `name` on
//!   creation and reported as `name` on reads
//! - Restricted and offline volumes are treated as gone
//!
//! ## Differences from the reference backend
//! - A volume has at most one export policy: the one active on it
//! - Host locks cannot be taken, only broken
//! - `patch_volume` only touches the autosize settings
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use unistore_backend::{NetappBackend, StorageBackend};
//!
//! let backend = NetappBackend::new(Arc::new(ontap_client));
//! backend.create_volume("dbnasr0009:/ORA/dbs00/TOTO", fields).await?;
//! let volume = backend.get_volume("/ORA/dbs00/TOTO").await?;
//! ```

mod client;
mod key;
mod mock;

pub use client::{
    Aggregate, AutosizeSettings, CloneVolumeRequest, CreateVolumeRequest, ExportRule,
    FilerClient, FilerError, FilerLock, FilerResult, FilerVolume, VolumeFilter,
};
pub use key::VolumeKey;
pub use mock::{MockFiler, MOCK_NODE_NAME};

use std::cmp::Reverse;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::{
    annotate, policy_404, snapshot_404, vol_404, Annotate, ErrorKind, Result, StorageError,
};
use crate::fields;
use crate::schema::{normalize_volume, normalize_volumes};
use crate::traits::StorageBackend;
use crate::types::{dedup_rules, ExportPolicy, Record, Snapshot, Volume};

/// Aggregates whose name starts with this prefix hold the root volume of a
/// node and are never picked for new volumes.
pub const RESERVED_AGGREGATE_PREFIX: &str = "aggr0";

/// Fields accepted by `create_volume`.
const CREATE_FIELDS: &[&str] = &["name", "size_total", "aggregate_name"];

/// Fields accepted by `patch_volume`.
const AUTOSIZE_FIELDS: &[&str] = &["autosize_enabled", "autosize_increment", "max_autosize"];

/// Await a filer call and translate its error.
async fn filer_call<T, F>(call: F) -> Result<T>
where
    F: Future<Output = FilerResult<T>>,
{
    call.await.map_err(|e| {
        warn!(error = %e, "Filer call failed");
        StorageError::from(e)
    })
}

/// NetApp storage backend.
#[derive(Debug, Clone)]
pub struct NetappBackend {
    client: Arc<dyn FilerClient>,
    reserved_aggregate_prefix: String,
}

impl NetappBackend {
    /// Create a backend on top of a filer client.
    pub fn new(client: Arc<dyn FilerClient>) -> Self {
        Self {
            client,
            reserved_aggregate_prefix: RESERVED_AGGREGATE_PREFIX.to_string(),
        }
    }

    /// Override the prefix of aggregates excluded from automatic placement.
    pub fn with_reserved_aggregate_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.reserved_aggregate_prefix = prefix.into();
        self
    }

    /// Find the active filer volume behind a volume key.
    async fn resolve(&self, volume_name: &str) -> Result<FilerVolume> {
        let key = VolumeKey::parse(volume_name);
        let filter = VolumeFilter::all()
            .with_junction_path(key.junction_path)
            .with_node_name(key.node_name);

        filer_call(self.client.volumes(&filter))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))?
            .into_iter()
            .find(FilerVolume::is_active)
            .ok_or_else(|| StorageError::NotFound(vol_404(volume_name)))
    }

    /// Resolve a volume and check that `policy_name` is its active policy.
    async fn active_policy(&self, volume_name: &str, policy_name: &str) -> Result<FilerVolume> {
        let volume = self.resolve(volume_name).await?;
        if volume.active_policy_name.as_deref() == Some(policy_name) {
            Ok(volume)
        } else {
            Err(StorageError::NotFound(policy_404(volume_name, policy_name)))
        }
    }

    async fn policy_rules(&self, volume_name: &str, policy_name: &str) -> Result<Vec<ExportRule>> {
        filer_call(self.client.export_rules_of(policy_name))
            .await
            .annotate(ErrorKind::NotFound, policy_404(volume_name, policy_name))
    }

    /// Check that a snapshot exists on a resolved volume.
    async fn require_snapshot(
        &self,
        volume: &FilerVolume,
        volume_name: &str,
        snapshot_name: &str,
    ) -> Result<()> {
        let snapshots = filer_call(self.client.snapshots_of(&volume.name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))?;

        if snapshots.iter().any(|s| s == snapshot_name) {
            Ok(())
        } else {
            Err(StorageError::NotFound(snapshot_404(volume_name, snapshot_name)))
        }
    }

    /// Pick the aggregate with the most free space, skipping reserved ones.
    ///
    /// With a node given, only aggregates homed on that node are considered.
    async fn pick_aggregate(&self, node_name: Option<&str>) -> Result<String> {
        info!("Aggregate not provided, using the one with the most free space");

        let mut aggregates = filer_call(self.client.aggregates()).await?;
        aggregates.retain(|a| node_name.map_or(true, |n| a.node_name == n));
        aggregates.sort_by_key(|a| Reverse(a.bytes_available));

        for aggregate in aggregates {
            if aggregate.name.starts_with(&self.reserved_aggregate_prefix) {
                debug!(aggregate = %aggregate.name, "Skipping reserved aggregate");
                continue;
            }
            info!(aggregate = %aggregate.name, node = %aggregate.node_name, "Picked aggregate");
            return Ok(aggregate.name);
        }

        Err(StorageError::Internal(
            "Could not find a suitable aggregate!".to_string(),
        ))
    }

    /// Check that an explicitly requested aggregate is homed on `node_name`.
    async fn require_aggregate_on(&self, aggregate_name: &str, node_name: &str) -> Result<()> {
        let aggregates = filer_call(self.client.aggregates()).await?;
        if aggregates
            .iter()
            .any(|a| a.name == aggregate_name && a.node_name == node_name)
        {
            Ok(())
        } else {
            Err(StorageError::InvalidInput(format!(
                "Aggregate {} is not hosted on node {}",
                aggregate_name, node_name
            )))
        }
    }
}

/// Raw record of a filer volume, before schema normalization.
fn volume_record(volume: &FilerVolume) -> Record {
    let mut record = Record::new();
    record.insert("name".into(), volume.name.clone().into());
    record.insert("uuid".into(), volume.uuid.clone().into());
    record.insert("junction_path".into(), volume.junction_path.clone().into());
    record.insert(
        "aggregate_name".into(),
        volume.containing_aggregate_name.clone().into(),
    );
    record.insert("state".into(), volume.state.clone().into());
    record.insert(
        "active_policy_name".into(),
        volume.active_policy_name.clone().into(),
    );
    record.insert("size_used".into(), volume.size_used_bytes.into());
    record.insert("size_total".into(), volume.size_total_bytes.into());
    record.insert("filer_address".into(), volume.node_name.clone().into());
    record.insert("autosize_enabled".into(), volume.autosize_enabled.into());
    record.insert("autosize_increment".into(), volume.autosize_increment.into());
    record.insert("max_autosize".into(), volume.max_autosize.into());
    record.insert(
        "snapshot_reserve_percent".into(),
        volume.snapshot_reserve_percent.into(),
    );
    record
}

#[async_trait]
impl StorageBackend for NetappBackend {
    #[instrument(skip(self))]
    async fn volumes(&self) -> Result<Vec<Volume>> {
        let records: Vec<Value> = filer_call(self.client.volumes(&VolumeFilter::all()))
            .await?
            .iter()
            .filter(|v| v.is_active())
            .map(|v| Value::Object(volume_record(v)))
            .collect();

        debug!(count = records.len(), "Listed filer volumes");
        normalize_volumes(Value::Array(records), true)
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn get_volume(&self, volume_name: &str) -> Result<Volume> {
        let volume = self.resolve(volume_name).await?;
        normalize_volume(volume_record(&volume), true)
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn create_volume(&self, volume_name: &str, fields: Record) -> Result<()> {
        let key = VolumeKey::parse_absolute(volume_name)?;

        fields::reject_unknown(&fields, CREATE_FIELDS)?;
        let name = fields::require_str(&fields, "name")?;
        let size_bytes = fields::require_u64(&fields, "size_total")?;

        match self.resolve(volume_name).await {
            Ok(_) => {
                return Err(StorageError::AlreadyExists(format!(
                    "Volume {} already exists!",
                    volume_name
                )))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        // The node of a new volume is the home node of its aggregate.
        let node_name = key.node_name.as_deref();
        let aggregate_name = match (fields::optional_str(&fields, "aggregate_name")?, node_name) {
            (Some(aggregate), Some(node)) => {
                self.require_aggregate_on(aggregate, node).await?;
                aggregate.to_string()
            }
            (Some(aggregate), None) => aggregate.to_string(),
            (None, node) => self.pick_aggregate(node).await?,
        };

        info!(filer_name = %name, aggregate = %aggregate_name, size_bytes, "Creating filer volume");

        let request = CreateVolumeRequest {
            name: name.to_string(),
            size_bytes,
            junction_path: key.junction_path,
            aggregate_name,
        };
        filer_call(self.client.create_volume(&request))
            .await
            .annotate(
                ErrorKind::AlreadyExists,
                format!("Volume {} already exists!", volume_name),
            )
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn patch_volume(&self, volume_name: &str, fields: Record) -> Result<()> {
        fields::reject_unknown(&fields, AUTOSIZE_FIELDS)?;
        let current = self.resolve(volume_name).await?;

        let settings = AutosizeSettings {
            enabled: fields::optional_bool(&fields, "autosize_enabled")?
                .unwrap_or(current.autosize_enabled),
            increment_bytes: fields::optional_u64(&fields, "autosize_increment")?
                .unwrap_or(current.autosize_increment),
            max_size_bytes: fields::optional_u64(&fields, "max_autosize")?
                .unwrap_or(current.max_autosize),
        };

        info!(?settings, "Updating autosize settings");
        filer_call(self.client.set_volume_autosize(&current.name, &settings))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn restrict_volume(&self, volume_name: &str) -> Result<()> {
        let volume = self.resolve(volume_name).await?;
        info!(filer_name = %volume.name, "Restricting volume");

        filer_call(self.client.restrict_volume(&volume.name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn locks(&self, volume_name: &str) -> Result<Option<String>> {
        let volume = self.resolve(volume_name).await?;
        let locks = filer_call(self.client.locks_on(&volume.name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))?;

        if locks.len() > 1 {
            debug!(count = locks.len(), "Several clients hold locks, reporting the first");
        }
        Ok(locks.into_iter().next().map(|l| l.client_address))
    }

    #[instrument(skip_all, fields(volume = %volume_name, owner = %host_owner))]
    async fn create_lock(&self, volume_name: &str, host_owner: &str) -> Result<()> {
        self.resolve(volume_name).await?;
        Err(StorageError::Unsupported(
            "NetApp volumes cannot be locked on behalf of a host".to_string(),
        ))
    }

    #[instrument(skip_all, fields(volume = %volume_name, owner = %host_owner))]
    async fn remove_lock(&self, volume_name: &str, host_owner: &str) -> Result<()> {
        let volume = self.resolve(volume_name).await?;
        let locks = filer_call(self.client.locks_on(&volume.name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))?;

        if !locks.iter().any(|l| l.client_address == host_owner) {
            debug!("Lock not held by this owner, nothing to remove");
            return Ok(());
        }

        info!("Breaking lock");
        filer_call(self.client.break_lock(&volume.name, host_owner))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn policies(&self, volume_name: &str) -> Result<Vec<ExportPolicy>> {
        let volume = self.resolve(volume_name).await?;
        let Some(policy_name) = volume.active_policy_name else {
            return Ok(Vec::new());
        };

        let rules: Vec<String> = self
            .policy_rules(volume_name, &policy_name)
            .await?
            .into_iter()
            .map(|r| r.rule)
            .collect();
        Ok(vec![ExportPolicy::new(policy_name, &rules)])
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn get_policy(&self, volume_name: &str, policy_name: &str) -> Result<Vec<String>> {
        self.active_policy(volume_name, policy_name).await?;
        Ok(self
            .policy_rules(volume_name, policy_name)
            .await?
            .into_iter()
            .map(|r| r.rule)
            .collect())
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn create_policy(
        &self,
        volume_name: &str,
        policy_name: &str,
        rules: &[String],
    ) -> Result<()> {
        let volume = self.resolve(volume_name).await?;
        let exists = format!("Policy {} already exists on volume {}", policy_name, volume_name);

        if volume.active_policy_name.as_deref() == Some(policy_name) {
            return Err(StorageError::AlreadyExists(exists));
        }
        if let Some(previous) = &volume.active_policy_name {
            warn!(previous = %previous, "Volume already has an active export policy");
            return Err(StorageError::Conflict(format!(
                "Volume {} already exports through policy {}",
                volume_name, previous
            )));
        }

        info!(rules = ?rules, "Adding policy");
        filer_call(self.client.create_export_policy(policy_name, &dedup_rules(rules)))
            .await
            .annotate(ErrorKind::AlreadyExists, exists)?;
        filer_call(self.client.set_volume_export_policy(&volume.name, policy_name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name))]
    async fn remove_policy(&self, volume_name: &str, policy_name: &str) -> Result<()> {
        self.active_policy(volume_name, policy_name).await?;
        info!("Removing policy");

        filer_call(self.client.delete_export_policy(policy_name))
            .await
            .annotate(ErrorKind::NotFound, policy_404(volume_name, policy_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name, rule = %rule))]
    async fn ensure_policy_rule_present(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()> {
        self.active_policy(volume_name, policy_name).await?;
        let rules = self.policy_rules(volume_name, policy_name).await?;

        if rules.iter().any(|r| r.rule == rule) {
            return Ok(());
        }

        info!("Adding rule");
        filer_call(self.client.add_export_rule(policy_name, rule))
            .await
            .annotate(ErrorKind::NotFound, policy_404(volume_name, policy_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name, policy = %policy_name, rule = %rule))]
    async fn ensure_policy_rule_absent(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()> {
        self.active_policy(volume_name, policy_name).await?;

        let mut indices: Vec<u32> = self
            .policy_rules(volume_name, policy_name)
            .await?
            .into_iter()
            .filter(|r| r.rule == rule)
            .map(|r| r.index)
            .collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));

        for index in indices {
            info!(index, "Removing rule");
            filer_call(self.client.remove_export_rule(policy_name, index))
                .await
                .annotate(ErrorKind::NotFound, policy_404(volume_name, policy_name))?;
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
        let in_use = format!("Name already in use: {}", clone_volume_name);

        let source = self.resolve(from_volume_name).await?;
        self.require_snapshot(&source, from_volume_name, from_snapshot_name)
            .await?;

        let key = VolumeKey::parse_absolute(clone_volume_name)?;
        match self.resolve(clone_volume_name).await {
            Ok(_) => return Err(StorageError::AlreadyExists(in_use)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let request = CloneVolumeRequest {
            parent_volume: source.name,
            parent_snapshot: from_snapshot_name.to_string(),
            clone_name: key.derived_volume_name(),
            junction_path: key.junction_path,
        };
        info!(filer_name = %request.clone_name, "Cloning volume from snapshot");

        annotate(ErrorKind::AlreadyExists, in_use, async {
            filer_call(self.client.clone_volume(&request))
                .await
                .annotate(
                    ErrorKind::NotFound,
                    snapshot_404(from_volume_name, from_snapshot_name),
                )
        })
        .await
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn create_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let volume = self.resolve(volume_name).await?;

        if snapshot_name.is_empty() {
            return Err(StorageError::InvalidInput(
                "Snapshot name must not be empty".to_string(),
            ));
        }

        let exists = format!(
            "Snapshot {} already exists for volume {}",
            snapshot_name, volume_name
        );
        match self.require_snapshot(&volume, volume_name, snapshot_name).await {
            Ok(()) => return Err(StorageError::AlreadyExists(exists)),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        info!("Creating snapshot");
        annotate(ErrorKind::AlreadyExists, exists, async {
            filer_call(self.client.create_snapshot(&volume.name, snapshot_name))
                .await
                .annotate(ErrorKind::NotFound, vol_404(volume_name))
        })
        .await
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn get_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<Snapshot> {
        let volume = self.resolve(volume_name).await?;
        self.require_snapshot(&volume, volume_name, snapshot_name)
            .await?;
        Ok(Snapshot::new(snapshot_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %snapshot_name))]
    async fn delete_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()> {
        let volume = self.resolve(volume_name).await?;
        self.require_snapshot(&volume, volume_name, snapshot_name)
            .await?;

        info!("Deleting snapshot");
        filer_call(self.client.delete_snapshot(&volume.name, snapshot_name))
            .await
            .annotate(ErrorKind::NotFound, snapshot_404(volume_name, snapshot_name))
    }

    #[instrument(skip_all, fields(volume = %volume_name))]
    async fn get_snapshots(&self, volume_name: &str) -> Result<Vec<Snapshot>> {
        let volume = self.resolve(volume_name).await?;
        let names = filer_call(self.client.snapshots_of(&volume.name))
            .await
            .annotate(ErrorKind::NotFound, vol_404(volume_name))?;
        Ok(names.into_iter().map(Snapshot::new).collect())
    }

    #[instrument(skip_all, fields(volume = %volume_name, snapshot = %restore_snapshot_name))]
    async fn rollback_volume(&self, volume_name: &str, restore_snapshot_name: &str) -> Result<()> {
        let volume = self.resolve(volume_name).await?;
        self.require_snapshot(&volume, volume_name, restore_snapshot_name)
            .await?;

        info!("Restoring volume to snapshot");
        filer_call(
            self.client
                .rollback_volume_from_snapshot(&volume.name, restore_snapshot_name),
        )
        .await
        .annotate(
            ErrorKind::NotFound,
            snapshot_404(volume_name, restore_snapshot_name),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TOTO: &str = "/ORA/dbs00/TOTO";

    fn fields(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn backend() -> (Arc<MockFiler>, NetappBackend) {
        let filer = Arc::new(MockFiler::new());
        let backend = NetappBackend::new(filer.clone());
        (filer, backend)
    }

    async fn backend_with_volume() -> (Arc<MockFiler>, NetappBackend) {
        let (filer, backend) = backend();
        backend
            .create_volume(TOTO, fields(json!({"name": "toto", "size_total": 4096})))
            .await
            .unwrap();
        (filer, backend)
    }

    #[tokio::test]
    async fn test_picks_largest_non_reserved_aggregate() {
        let (filer, backend) = backend_with_volume().await;
        let vol = filer.inspect_volume("toto").unwrap();
        assert_eq!(vol.containing_aggregate_name.as_deref(), Some("aggr2_data"));

        let volume = backend.get_volume(TOTO).await.unwrap();
        assert_eq!(volume.name, "toto");
        assert_eq!(volume.junction_path.as_deref(), Some(TOTO));
        assert_eq!(volume.aggregate_name.as_deref(), Some("aggr2_data"));
        assert_eq!(volume.filer_address, MOCK_NODE_NAME);
        assert_eq!(volume.size_total, 4096);
        assert_eq!(volume.extra["autosize_enabled"], json!(false));
        assert_eq!(volume.extra["snapshot_reserve_percent"], json!(5));
    }

    #[tokio::test]
    async fn test_explicit_aggregate() {
        let (filer, backend) = backend();
        backend
            .create_volume(
                "/data/a",
                fields(json!({"name": "a", "size_total": 1, "aggregate_name": "aggr1_data"})),
            )
            .await
            .unwrap();
        let vol = filer.inspect_volume("a").unwrap();
        assert_eq!(vol.containing_aggregate_name.as_deref(), Some("aggr1_data"));
    }

    #[tokio::test]
    async fn test_no_suitable_aggregate() {
        let filer = Arc::new(MockFiler::empty().with_aggregate("aggr0_node1", 1 << 40));
        let backend = NetappBackend::new(filer);
        let err = backend
            .create_volume("/data/a", fields(json!({"name": "a", "size_total": 1})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::Internal("Could not find a suitable aggregate!".to_string())
        );
    }

    #[tokio::test]
    async fn test_create_volume_validation() {
        let (_filer, backend) = backend_with_volume().await;

        let cases = [
            ("/data/a", json!({"size_total": 1})),
            ("/data/a", json!({"name": "a"})),
            ("/data/a", json!({"name": "a", "size_total": 1, "state": "online"})),
            ("relative", json!({"name": "a", "size_total": 1})),
        ];
        for (path, data) in cases {
            let err = backend.create_volume(path, fields(data)).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidInput, "{}", path);
        }

        let err = backend
            .create_volume(TOTO, fields(json!({"name": "toto2", "size_total": 1})))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::AlreadyExists(format!("Volume {} already exists!", TOTO))
        );
    }

    #[tokio::test]
    async fn test_patch_autosize_defaults_from_current() {
        let (filer, backend) = backend_with_volume().await;

        backend
            .patch_volume(TOTO, fields(json!({"autosize_enabled": true})))
            .await
            .unwrap();
        let vol = filer.inspect_volume("toto").unwrap();
        assert!(vol.autosize_enabled);
        assert_eq!(vol.max_autosize, 4096);

        backend
            .patch_volume(TOTO, fields(json!({"max_autosize": 8192, "autosize_increment": 512})))
            .await
            .unwrap();
        let volume = backend.get_volume(TOTO).await.unwrap();
        assert_eq!(volume.extra["autosize_enabled"], json!(true));
        assert_eq!(volume.extra["max_autosize"], json!(8192));
        assert_eq!(volume.extra["autosize_increment"], json!(512));

        let err = backend
            .patch_volume(TOTO, fields(json!({"size_total": 1})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_locks() {
        let (filer, backend) = backend_with_volume().await;
        assert_eq!(backend.locks(TOTO).await.unwrap(), None);

        let err = backend.create_lock(TOTO, "hostA").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unsupported);
        let err = backend.create_lock("/nope", "hostA").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        filer.hold_lock("toto", "10.0.0.7").unwrap();
        filer.hold_lock("toto", "10.0.0.8").unwrap();
        assert_eq!(backend.locks(TOTO).await.unwrap().as_deref(), Some("10.0.0.7"));

        backend.remove_lock(TOTO, "10.9.9.9").await.unwrap();
        assert_eq!(backend.locks(TOTO).await.unwrap().as_deref(), Some("10.0.0.7"));

        backend.remove_lock(TOTO, "10.0.0.7").await.unwrap();
        assert_eq!(backend.locks(TOTO).await.unwrap().as_deref(), Some("10.0.0.8"));
    }

    #[tokio::test]
    async fn test_single_active_policy() {
        let (_filer, backend) = backend_with_volume().await;
        assert!(backend.policies(TOTO).await.unwrap().is_empty());

        let rules = vec!["10.0.0.1".to_string(), "10.0.0.1".to_string()];
        backend.create_policy(TOTO, "p1", &rules).await.unwrap();
        assert_eq!(
            backend.policies(TOTO).await.unwrap(),
            vec![ExportPolicy::new("p1", &["10.0.0.1".to_string()])]
        );

        let err = backend.get_policy(TOTO, "p2").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        backend.remove_policy(TOTO, "p1").await.unwrap();
        assert!(backend.policies(TOTO).await.unwrap().is_empty());
        backend.create_policy(TOTO, "p1", &[]).await.unwrap();
        assert!(backend.get_policy(TOTO, "p1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rule_absent_removes_every_copy() {
        let (filer, backend) = backend_with_volume().await;
        backend.create_policy(TOTO, "p1", &[]).await.unwrap();
        filer.add_export_rule("p1", "10.0.0.5").await.unwrap();
        filer.add_export_rule("p1", "10.0.0.6").await.unwrap();
        filer.add_export_rule("p1", "10.0.0.5").await.unwrap();

        backend
            .ensure_policy_rule_absent(TOTO, "p1", "10.0.0.5")
            .await
            .unwrap();
        assert_eq!(backend.get_policy(TOTO, "p1").await.unwrap(), vec!["10.0.0.6"]);
    }

    #[tokio::test]
    async fn test_node_prefix_disambiguates() {
        let other_node = FilerVolume {
            name: "toto_replica".to_string(),
            uuid: None,
            node_name: "node-2".to_string(),
            junction_path: Some(TOTO.to_string()),
            containing_aggregate_name: Some("aggr1_data".to_string()),
            state: Some("online".to_string()),
            active_policy_name: None,
            size_total_bytes: 10,
            size_used_bytes: 1,
            autosize_enabled: false,
            autosize_increment: 0,
            max_autosize: 0,
            snapshot_reserve_percent: None,
        };
        let filer = Arc::new(MockFiler::new().with_volume(other_node));
        let backend = NetappBackend::new(filer);
        backend
            .create_volume(
                &format!("{}:{}", MOCK_NODE_NAME, TOTO),
                fields(json!({"name": "toto", "size_total": 4096})),
            )
            .await
            .unwrap();

        let local = backend
            .get_volume(&format!("{}:{}", MOCK_NODE_NAME, TOTO))
            .await
            .unwrap();
        assert_eq!(local.name, "toto");
        let pinned = backend
            .get_volume(&format!("node-2:{}", TOTO))
            .await
            .unwrap();
        assert_eq!(pinned.name, "toto_replica");
        let err = backend
            .get_volume(&format!("node-3:{}", TOTO))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), format!("No such volume: node-3:{}", TOTO));
    }

    #[tokio::test]
    async fn test_node_prefix_places_volume_on_that_node() {
        let filer = Arc::new(MockFiler::new().with_node_aggregate("node-2", "aggr3_node2", 1 << 30));
        let backend = NetappBackend::new(filer.clone());

        backend
            .create_volume("node-2:/data/a", fields(json!({"name": "a", "size_total": 10})))
            .await
            .unwrap();
        let volume = backend.get_volume("node-2:/data/a").await.unwrap();
        assert_eq!(volume.name, "a");
        assert_eq!(volume.filer_address, "node-2");
        assert_eq!(volume.aggregate_name.as_deref(), Some("aggr3_node2"));
        let err = backend
            .get_volume(&format!("{}:/data/a", MOCK_NODE_NAME))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = backend
            .create_volume(
                "node-2:/data/b",
                fields(json!({"name": "b", "size_total": 10, "aggregate_name": "aggr1_data"})),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StorageError::InvalidInput("Aggregate aggr1_data is not hosted on node node-2".to_string())
        );

        let err = backend
            .create_volume("node-3:/data/c", fields(json!({"name": "c", "size_total": 10})))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert!(filer.inspect_volume("b").is_none());
        assert!(filer.inspect_volume("c").is_none());
    }

    #[tokio::test]
    async fn test_create_policy_keeps_existing_active_policy() {
        let (filer, backend) = backend_with_volume().await;
        backend
            .create_policy(TOTO, "p1", &["10.0.0.1".to_string()])
            .await
            .unwrap();

        let err = backend.create_policy(TOTO, "p2", &[]).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(
            filer.inspect_volume("toto").unwrap().active_policy_name.as_deref(),
            Some("p1")
        );
        assert!(filer.export_rules_of("p2").await.is_err());

        backend.remove_policy(TOTO, "p1").await.unwrap();
        backend.create_policy(TOTO, "p2", &[]).await.unwrap();
        assert_eq!(backend.policies(TOTO).await.unwrap()[0].name, "p2");
    }

    #[tokio::test]
    async fn test_snapshot_lookup_failure_is_not_absence() {
        let (filer, backend) = backend_with_volume().await;
        filer.set_failing("snapshots_of", true).unwrap();

        let err = backend.create_snapshot(TOTO, "snap1").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        filer.set_failing("snapshots_of", false).unwrap();
        assert!(backend.get_snapshots(TOTO).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_restricted_volume_is_invisible() {
        let (_filer, backend) = backend_with_volume().await;
        backend.restrict_volume(TOTO).await.unwrap();

        assert!(backend.volumes().await.unwrap().is_empty());
        let err = backend.get_snapshots(TOTO).await.unwrap_err();
        assert_eq!(err, StorageError::NotFound(vol_404(TOTO)));
    }

    #[tokio::test]
    async fn test_clone_derives_filer_name() {
        let (filer, backend) = backend_with_volume().await;
        backend.create_snapshot(TOTO, "snap1").await.unwrap();
        backend
            .clone_volume("/ORA/dbs00/TOTO-clone", TOTO, "snap1")
            .await
            .unwrap();

        let clone = filer.inspect_volume("ORA_dbs00_TOTO_clone").unwrap();
        assert_eq!(clone.junction_path.as_deref(), Some("/ORA/dbs00/TOTO-clone"));
        assert_eq!(clone.size_total_bytes, 4096);
    }

    #[tokio::test]
    async fn test_unavailable_filer_is_internal() {
        let (filer, backend) = backend_with_volume().await;
        filer.set_unavailable(true).unwrap();

        let err = backend.get_volume(TOTO).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
        let err = backend.volumes().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_malformed_filer_record_fails_loudly() {
        let nameless_node = FilerVolume {
            name: "broken".to_string(),
            uuid: None,
            node_name: String::new(),
            junction_path: Some("/broken".to_string()),
            containing_aggregate_name: None,
            state: None,
            active_policy_name: None,
            size_total_bytes: 1,
            size_used_bytes: 0,
            autosize_enabled: false,
            autosize_increment: 0,
            max_autosize: 0,
            snapshot_reserve_percent: None,
        };
        let backend = NetappBackend::new(Arc::new(MockFiler::new().with_volume(nameless_node)));

        let err = backend.get_volume("/broken").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaViolation);
    }
}
