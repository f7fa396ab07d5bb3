//! Inventory file of the in-memory backend.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};
use unistore_backend::Inventory;

/// Load the inventory, starting empty when the file does not exist yet.
pub fn load(path: &Path) -> Result<Inventory> {
    if !path.exists() {
        info!(path = %path.display(), "No inventory file yet, starting empty");
        return Ok(Inventory::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory: {}", path.display()))?;
    let inventory: Inventory = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse inventory: {}", path.display()))?;

    debug!(path = %path.display(), volumes = inventory.volumes.len(), "Loaded inventory");
    Ok(inventory)
}

/// Save the inventory, replacing the file atomically.
pub fn save(path: &Path, inventory: &Inventory) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let yaml = serde_yaml::to_string(inventory).context("Failed to serialize inventory")?;

    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml)
        .with_context(|| format!("Failed to write inventory: {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace inventory: {}", path.display()))?;

    debug!(path = %path.display(), volumes = inventory.volumes.len(), "Saved inventory");
    Ok(())
}
