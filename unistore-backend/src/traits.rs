//! Storage backend contract.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExportPolicy, Record, Snapshot, Volume};

/// Storage backend trait - implemented by each storage technology.
///
/// Every backend must provide every operation. A backend that has no way of
/// performing an operation returns [`StorageError::Unsupported`] rather than
/// silently succeeding.
///
/// The same logical condition maps to the same error kind on every backend:
/// a missing entity is [`StorageError::NotFound`], malformed or incomplete
/// data is [`StorageError::InvalidInput`], and identity collisions are
/// [`StorageError::AlreadyExists`] or [`StorageError::Conflict`].
///
/// [`StorageError::Unsupported`]: crate::error::StorageError::Unsupported
/// [`StorageError::NotFound`]: crate::error::StorageError::NotFound
/// [`StorageError::InvalidInput`]: crate::error::StorageError::InvalidInput
/// [`StorageError::AlreadyExists`]: crate::error::StorageError::AlreadyExists
/// [`StorageError::Conflict`]: crate::error::StorageError::Conflict
#[async_trait]
pub trait StorageBackend: Send + Sync + Debug {
    // =========================================================================
    // Volumes
    // =========================================================================

    /// All active volumes, normalized against the volume schema.
    async fn volumes(&self) -> Result<Vec<Volume>>;

    /// A single active volume.
    async fn get_volume(&self, volume_name: &str) -> Result<Volume>;

    /// Create a new volume.
    ///
    /// `fields` must contain at least `size_total`. Backends may require
    /// further fields.
    async fn create_volume(&self, volume_name: &str, fields: Record) -> Result<()>;

    /// Update writable attributes of a volume in place.
    async fn patch_volume(&self, volume_name: &str, fields: Record) -> Result<()>;

    /// Restrict or delete a volume.
    ///
    /// Afterwards the volume no longer appears in [`volumes`](Self::volumes)
    /// or [`get_volume`](Self::get_volume), and its snapshots, locks and
    /// policies are gone with it. Re-creating a volume with the same name
    /// right away is not guaranteed to work.
    async fn restrict_volume(&self, volume_name: &str) -> Result<()>;

    // =========================================================================
    // Locks
    // =========================================================================

    /// The host currently holding a lock on the volume, if any.
    async fn locks(&self, volume_name: &str) -> Result<Option<String>>;

    /// Install a lock held by `host_owner`.
    ///
    /// Locking again as the same owner succeeds without change.
    async fn create_lock(&self, volume_name: &str, host_owner: &str) -> Result<()>;

    /// Remove the lock if it is held by `host_owner`; otherwise do nothing.
    async fn remove_lock(&self, volume_name: &str, host_owner: &str) -> Result<()>;

    // =========================================================================
    // Export policies
    // =========================================================================

    /// Export policies of a volume, in order. An empty list means no policies.
    async fn policies(&self, volume_name: &str) -> Result<Vec<ExportPolicy>>;

    /// The rules of one policy.
    async fn get_policy(&self, volume_name: &str, policy_name: &str) -> Result<Vec<String>>;

    /// Create a policy. Duplicate rules are dropped, first occurrence wins.
    async fn create_policy(
        &self,
        volume_name: &str,
        policy_name: &str,
        rules: &[String],
    ) -> Result<()>;

    /// Remove a policy; its name can be reused afterwards.
    async fn remove_policy(&self, volume_name: &str, policy_name: &str) -> Result<()>;

    /// Idempotently make sure `rule` is part of the policy.
    async fn ensure_policy_rule_present(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()>;

    /// Idempotently make sure `rule` is not part of the policy.
    async fn ensure_policy_rule_absent(
        &self,
        volume_name: &str,
        policy_name: &str,
        rule: &str,
    ) -> Result<()>;

    // =========================================================================
    // Snapshots & clones
    // =========================================================================

    /// Create `clone_volume_name` from a snapshot of another volume.
    async fn clone_volume(
        &self,
        clone_volume_name: &str,
        from_volume_name: &str,
        from_snapshot_name: &str,
    ) -> Result<()>;

    /// Capture the current state of a volume.
    async fn create_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()>;

    /// A single snapshot.
    async fn get_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<Snapshot>;

    /// Delete a snapshot, or the closest equivalent the backend offers.
    async fn delete_snapshot(&self, volume_name: &str, snapshot_name: &str) -> Result<()>;

    /// All snapshots of a volume.
    async fn get_snapshots(&self, volume_name: &str) -> Result<Vec<Snapshot>>;

    /// Roll a volume back to a snapshot.
    async fn rollback_volume(&self, volume_name: &str, restore_snapshot_name: &str) -> Result<()>;
}
