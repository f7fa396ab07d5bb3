//! Dispatch of CLI commands onto a storage backend.

use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use unistore_backend::{Record, StorageBackend};

use crate::cli::Command;

fn to_json<T: Serialize>(value: T) -> anyhow::Result<Value> {
    Ok(serde_json::to_value(value)?)
}

fn done() -> anyhow::Result<Value> {
    Ok(json!({ "status": "ok" }))
}

fn record(fields: &[(String, Value)]) -> Record {
    fields.iter().cloned().collect()
}

/// Run one command and return its JSON result.
pub async fn run(backend: &dyn StorageBackend, command: &Command) -> anyhow::Result<Value> {
    debug!(?command, "Running command");

    match command {
        Command::Volumes => to_json(backend.volumes().await?),
        Command::GetVolume { volume } => to_json(backend.get_volume(volume).await?),
        Command::CreateVolume { volume, fields } => {
            backend.create_volume(volume, record(fields)).await?;
            done()
        }
        Command::PatchVolume { volume, fields } => {
            backend.patch_volume(volume, record(fields)).await?;
            done()
        }
        Command::RestrictVolume { volume } => {
            backend.restrict_volume(volume).await?;
            done()
        }

        Command::Locks { volume } => to_json(json!({ "owner": backend.locks(volume).await? })),
        Command::CreateLock { volume, owner } => {
            backend.create_lock(volume, owner).await?;
            done()
        }
        Command::RemoveLock { volume, owner } => {
            backend.remove_lock(volume, owner).await?;
            done()
        }

        Command::Policies { volume } => to_json(backend.policies(volume).await?),
        Command::GetPolicy { volume, policy } => to_json(backend.get_policy(volume, policy).await?),
        Command::CreatePolicy {
            volume,
            policy,
            rules,
        } => {
            backend.create_policy(volume, policy, rules).await?;
            done()
        }
        Command::RemovePolicy { volume, policy } => {
            backend.remove_policy(volume, policy).await?;
            done()
        }
        Command::AddRule {
            volume,
            policy,
            rule,
        } => {
            backend.ensure_policy_rule_present(volume, policy, rule).await?;
            done()
        }
        Command::RemoveRule {
            volume,
            policy,
            rule,
        } => {
            backend.ensure_policy_rule_absent(volume, policy, rule).await?;
            done()
        }

        Command::CloneVolume {
            clone,
            from_volume,
            from_snapshot,
        } => {
            backend.clone_volume(clone, from_volume, from_snapshot).await?;
            done()
        }
        Command::CreateSnapshot { volume, snapshot } => {
            backend.create_snapshot(volume, snapshot).await?;
            done()
        }
        Command::GetSnapshot { volume, snapshot } => {
            to_json(backend.get_snapshot(volume, snapshot).await?)
        }
        Command::DeleteSnapshot { volume, snapshot } => {
            backend.delete_snapshot(volume, snapshot).await?;
            done()
        }
        Command::Snapshots { volume } => to_json(backend.get_snapshots(volume).await?),
        Command::RollbackVolume { volume, snapshot } => {
            backend.rollback_volume(volume, snapshot).await?;
            done()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unistore_backend::{ErrorKind, MemoryBackend, StorageError};

    #[tokio::test]
    async fn test_create_then_list() {
        let backend = MemoryBackend::new();
        let create = Command::CreateVolume {
            volume: "vol1".into(),
            fields: vec![("size_total".into(), json!(100))],
        };
        assert_eq!(run(&backend, &create).await.unwrap(), json!({"status": "ok"}));

        let listed = run(&backend, &Command::Volumes).await.unwrap();
        assert_eq!(listed[0]["name"], json!("vol1"));
        assert_eq!(listed[0]["size_total"], json!(100));

        let locks = run(&backend, &Command::Locks { volume: "vol1".into() }).await.unwrap();
        assert_eq!(locks, json!({"owner": null}));
    }

    #[tokio::test]
    async fn test_backend_errors_surface() {
        let backend = MemoryBackend::new();
        let err = run(&backend, &Command::GetVolume { volume: "ghost".into() })
            .await
            .unwrap_err();
        let storage = err.downcast_ref::<StorageError>().unwrap();
        assert_eq!(storage.kind(), ErrorKind::NotFound);
    }
}
