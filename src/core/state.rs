//! Resource snapshot — persisted deck and consumable state.
//!
//! The snapshot is JSON over ordered maps, so saving what was just loaded
//! reproduces the file byte for byte. Writes are atomic (temp file + rename).
//! Concurrent writers are not supported; the last writer wins.

use super::types::{Mount, Slot};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// A pipette and the volume range it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipetteSpec {
    pub model: String,
    pub min_volume: u32,
    pub max_volume: u32,
}

impl PipetteSpec {
    pub fn covers(&self, volume: u32) -> bool {
        self.min_volume <= volume && volume <= self.max_volume
    }
}

/// Everything the resource manager knows, in persistable form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceManagerState {
    #[serde(default)]
    pub slot_to_labware: BTreeMap<Slot, String>,

    #[serde(default)]
    pub alias_to_slot: BTreeMap<String, Slot>,

    #[serde(default)]
    pub mount_to_pipette: BTreeMap<Mount, PipetteSpec>,

    /// Times each well was aspirated from or dispensed into, per slot
    #[serde(default)]
    pub well_usage: BTreeMap<Slot, BTreeMap<String, u32>>,

    /// Next unused tip index, per tip-rack slot
    #[serde(default)]
    pub tip_cursor: BTreeMap<Slot, u32>,
}

/// Default snapshot path for a recipe: `<stem>_resources.json` beside it.
pub fn default_snapshot_path(recipe: &Path) -> PathBuf {
    let stem = recipe
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "recipe".to_string());
    recipe.with_file_name(format!("{}_resources.json", stem))
}

/// Serialize a snapshot.
pub fn to_json(state: &ResourceManagerState) -> Result<String, String> {
    let mut json =
        serde_json::to_string_pretty(state).map_err(|e| format!("serialize error: {}", e))?;
    json.push('\n');
    Ok(json)
}

/// Deserialize a snapshot.
pub fn from_json(json: &str) -> Result<ResourceManagerState, String> {
    serde_json::from_str(json).map_err(|e| format!("invalid resource snapshot: {}", e))
}

/// Load a snapshot. Returns None if the file doesn't exist.
pub fn load_snapshot(path: &Path) -> Result<Option<ResourceManagerState>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("cannot read {}: {}", path.display(), e))?;
    let state = from_json(&content).map_err(|e| format!("{} ({})", e, path.display()))?;
    Ok(Some(state))
}

/// Save a snapshot atomically (write to temp, then rename).
pub fn save_snapshot(path: &Path, state: &ResourceManagerState) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("cannot create dir {}: {}", parent.display(), e))?;
        }
    }

    let json = to_json(state)?;

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);
    std::fs::write(&tmp_path, &json)
        .map_err(|e| format!("cannot write {}: {}", tmp_path.display(), e))?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        format!(
            "cannot rename {} → {}: {}",
            tmp_path.display(),
            path.display(),
            e
        )
    })?;

    Ok(())
}
