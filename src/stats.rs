use chrono::Local;
use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use crate::error::{EngineError, Result};
use crate::types::{ItemId, PoolId};

/// Receives one call per completed tournament. The counter it feeds lives
/// outside the engine.
pub trait ChampionSink: Send + Sync {
    fn record_champion(&self, pool_id: PoolId, item_id: ItemId) -> Result<()>;
}

impl<T: ChampionSink + ?Sized> ChampionSink for Arc<T> {
    fn record_champion(&self, pool_id: PoolId, item_id: ItemId) -> Result<()> {
        (**self).record_champion(pool_id, item_id)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ChampionSink for NoopSink {
    fn record_champion(&self, _pool_id: PoolId, _item_id: ItemId) -> Result<()> {
        Ok(())
    }
}

/// In-memory "times this item has won" counter.
#[derive(Debug, Clone, Default)]
pub struct ChampionTally {
    wins: Arc<Mutex<HashMap<(PoolId, ItemId), u64>>>,
}

impl ChampionTally {
    pub fn new() -> Self {
        ChampionTally::default()
    }

    pub fn wins_for(&self, pool_id: PoolId, item_id: ItemId) -> u64 {
        let guard = self.wins.lock().unwrap_or_else(|e| e.into_inner());
        guard.get(&(pool_id, item_id)).copied().unwrap_or(0)
    }

    pub fn total_for_pool(&self, pool_id: PoolId) -> u64 {
        let guard = self.wins.lock().unwrap_or_else(|e| e.into_inner());
        guard
            .iter()
            .filter(|((pool, _), _)| *pool == pool_id)
            .map(|(_, count)| *count)
            .sum()
    }
}

impl ChampionSink for ChampionTally {
    fn record_champion(&self, pool_id: PoolId, item_id: ItemId) -> Result<()> {
        let mut guard = self.wins.lock().unwrap_or_else(|e| e.into_inner());
        *guard.entry((pool_id, item_id)).or_insert(0) += 1;
        Ok(())
    }
}

/// Appends one timestamped line per champion to a text file.
#[derive(Debug, Clone)]
pub struct CompletionLog {
    path: PathBuf,
}

impl CompletionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CompletionLog { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChampionSink for CompletionLog {
    fn record_champion(&self, pool_id: PoolId, item_id: ItemId) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| EngineError::Storage(format!("create log dir {}: {e}", dir.display())))?;
        }
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.3f");
        let entry = format!("[{timestamp}] pool={pool_id} winner={item_id}\n");
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EngineError::Storage(format!("open completion log {}: {e}", self.path.display())))?;
        file.write_all(entry.as_bytes())
            .map_err(|e| EngineError::Storage(format!("write completion log {}: {e}", self.path.display())))
    }
}
