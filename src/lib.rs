pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod rounds;
pub mod seeding;
pub mod bracket;
pub mod resolver;
pub mod advancer;
pub mod engine;
pub mod ranking;
pub mod store;
pub mod snapshot;
pub mod stats;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use ranking::{rank_items, RankingRow};
pub use rounds::RoundLabel;
pub use seeding::{FixedSeeding, IdentitySeeding, RandomSeeding, Seeding};
pub use stats::{ChampionSink, ChampionTally, CompletionLog, NoopSink};
pub use store::{MemoryStore, TournamentStore};
pub use types::*;

use std::path::Path;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;

// ── Entry point ────────────────────────────────────────────────────────

/// A ready engine plus the log writer guard, which must outlive it.
pub struct Runtime<K: ChampionSink = ChampionTally> {
    pub engine: Engine<MemoryStore, K>,
    pub log_guard: Option<WorkerGuard>,
}

/// Loads `.env` next to the config file, the config itself, logging, and the
/// snapshot named by the config.
pub fn open<K: ChampionSink>(config_path: &Path, sink: K) -> Result<Runtime<K>> {
    config::load_env_file(&config_path.with_file_name(".env"));
    let config = config::load_config_from(config_path)?;
    let log_guard = logging::init_tracing(config.log_dir.as_deref());
    info!("bracket engine starting with config {}", config_path.display());

    let store = match config.snapshot_path.as_deref() {
        Some(path) => snapshot::load_snapshot(path)?,
        None => MemoryStore::new(),
    };
    let engine = Engine::new(store, sink, config)?;
    Ok(Runtime { engine, log_guard })
}

/// Writes the store to the configured snapshot path, if any.
pub fn persist<K: ChampionSink>(engine: &Engine<MemoryStore, K>) -> Result<()> {
    match engine.config().snapshot_path.as_deref() {
        Some(path) => snapshot::save_snapshot(engine.store(), path),
        None => Ok(()),
    }
}
