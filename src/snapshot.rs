use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use tracing::info;

use crate::error::{EngineError, Result};
use crate::store::MemoryStore;
use crate::types::{Match, Tournament};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    #[serde(default)]
    pub tournaments: Vec<Tournament>,
    #[serde(default)]
    pub matches: Vec<Match>,
    #[serde(default)]
    pub next_id: u64,
}

pub fn save_snapshot(store: &MemoryStore, path: &Path) -> Result<()> {
    let snapshot = store.snapshot();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| EngineError::Storage(format!("create snapshot dir {}: {e}", parent.display())))?;
    }
    let payload = serde_json::to_string_pretty(&snapshot).map_err(|e| EngineError::Storage(e.to_string()))?;
    fs::write(path, payload)
        .map_err(|e| EngineError::Storage(format!("write snapshot {}: {e}", path.display())))?;
    info!(
        "saved {} tournaments ({} matches) to {}",
        snapshot.tournaments.len(),
        snapshot.matches.len(),
        path.display()
    );
    Ok(())
}

/// A missing file loads as an empty store.
pub fn load_snapshot(path: &Path) -> Result<MemoryStore> {
    if !path.is_file() {
        return Ok(MemoryStore::new());
    }
    let data = fs::read_to_string(path)
        .map_err(|e| EngineError::Storage(format!("read snapshot {}: {e}", path.display())))?;
    let snapshot = serde_json::from_str::<StoreSnapshot>(&data)
        .map_err(|e| EngineError::Storage(format!("parse snapshot {}: {e}", path.display())))?;
    info!(
        "loaded {} tournaments from {}",
        snapshot.tournaments.len(),
        path.display()
    );
    Ok(MemoryStore::from_snapshot(snapshot))
}
