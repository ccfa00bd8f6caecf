use serde::{Deserialize, Serialize};
use std::{
    env,
    fs,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use crate::error::{EngineError, Result};
use crate::types::{DEFAULT_MAX_ITEMS, DEFAULT_MIN_ITEMS, MIN_BRACKET_ITEMS};

pub const ENV_MIN_ITEMS: &str = "BRACKET_MIN_ITEMS";
pub const ENV_MAX_ITEMS: &str = "BRACKET_MAX_ITEMS";
pub const ENV_SHUFFLE_SEED: &str = "BRACKET_SHUFFLE_SEED";
pub const ENV_SNAPSHOT_PATH: &str = "BRACKET_SNAPSHOT_PATH";
pub const ENV_LOG_DIR: &str = "BRACKET_LOG_DIR";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
  /// Smallest pool a tournament may be started from.
  pub min_items: usize,
  pub max_items: usize,
  /// Fixes the shuffle so brackets are reproducible.
  pub shuffle_seed: Option<u64>,
  pub snapshot_path: Option<PathBuf>,
  pub log_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
  fn default() -> Self {
    EngineConfig {
      min_items: DEFAULT_MIN_ITEMS,
      max_items: DEFAULT_MAX_ITEMS,
      shuffle_seed: None,
      snapshot_path: None,
      log_dir: None,
    }
  }
}

impl EngineConfig {
  pub fn validate(&self) -> Result<()> {
    if self.min_items < MIN_BRACKET_ITEMS {
      return Err(EngineError::InvalidInput(format!(
        "minItems must be at least {MIN_BRACKET_ITEMS}, got {}",
        self.min_items
      )));
    }
    if self.max_items < self.min_items {
      return Err(EngineError::InvalidInput(format!(
        "maxItems ({}) is below minItems ({})",
        self.max_items, self.min_items
      )));
    }
    Ok(())
  }

  pub fn check_item_count(&self, count: usize) -> Result<()> {
    if count < self.min_items || count > self.max_items {
      return Err(EngineError::InvalidInput(format!(
        "pool has {count} items; tournaments need {}..={}",
        self.min_items, self.max_items
      )));
    }
    Ok(())
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

/// Fills fields still at their defaults from the process environment.
pub fn apply_env_defaults(config: EngineConfig) -> EngineConfig {
  apply_env_from(config, env_default)
}

pub fn apply_env_from(mut config: EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> EngineConfig {
  let defaults = EngineConfig::default();
  if config.min_items == defaults.min_items {
    if let Some(value) = parse_number(&lookup, ENV_MIN_ITEMS) {
      config.min_items = value;
    }
  }
  if config.max_items == defaults.max_items {
    if let Some(value) = parse_number(&lookup, ENV_MAX_ITEMS) {
      config.max_items = value;
    }
  }
  if config.shuffle_seed.is_none() {
    config.shuffle_seed = parse_number(&lookup, ENV_SHUFFLE_SEED);
  }
  if config.snapshot_path.is_none() {
    config.snapshot_path = lookup(ENV_SNAPSHOT_PATH).map(PathBuf::from);
  }
  if config.log_dir.is_none() {
    config.log_dir = lookup(ENV_LOG_DIR).map(PathBuf::from);
  }
  config
}

fn parse_number<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
  let raw = lookup(key)?;
  match raw.parse::<T>() {
    Ok(value) => Some(value),
    Err(_) => {
      tracing::warn!("ignoring {key}={raw}: not a number");
      None
    }
  }
}

/// Reads `path` when it exists, then overlays the environment and validates.
pub fn load_config_from(path: &Path) -> Result<EngineConfig> {
  let config = if path.is_file() {
    let data = fs::read_to_string(path)
      .map_err(|e| EngineError::Storage(format!("read config {}: {e}", path.display())))?;
    serde_json::from_str::<EngineConfig>(&data)
      .map_err(|e| EngineError::Storage(format!("parse config {}: {e}", path.display())))?
  } else {
    EngineConfig::default()
  };
  let config = apply_env_defaults(config);
  config.validate()?;
  Ok(config)
}

pub fn save_config_to(path: &Path, config: &EngineConfig) -> Result<()> {
  let payload = serde_json::to_string_pretty(config).map_err(|e| EngineError::Storage(e.to_string()))?;
  fs::write(path, payload).map_err(|e| EngineError::Storage(format!("write config {}: {e}", path.display())))
}

/// Exports `KEY=value` lines from `path` unless the variable is already set.
pub fn load_env_file(path: &Path) {
  if !path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(path) {
    Ok(data) => data,
    Err(e) => {
      tracing::warn!("read env file {}: {e}", path.display());
      return;
    }
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

/// Parses one `.env` line into a variable. Keys must be a single word;
/// `#` starts a comment only at the start of a line or after whitespace.
pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let line = line.trim();
  if line.starts_with('#') {
    return None;
  }
  let line = line.strip_prefix("export ").map_or(line, str::trim_start);
  let (key, value) = line.split_once('=')?;
  let key = key.trim();
  if key.is_empty() || key.contains(char::is_whitespace) {
    return None;
  }
  Some((key.to_string(), env_value(value.trim()).to_string()))
}

fn env_value(raw: &str) -> &str {
  let quoted = ['"', '\''].into_iter().find_map(|quote| {
    raw.strip_prefix(quote).and_then(|rest| rest.strip_suffix(quote))
  });
  if let Some(inner) = quoted {
    return inner;
  }
  match raw.find(" #").or_else(|| raw.find("\t#")) {
    Some(idx) => raw[..idx].trim_end(),
    None if raw.starts_with('#') => "",
    None => raw,
  }
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}
