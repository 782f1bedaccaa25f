//! Operational knobs loaded from `~/.beadforge/config.toml`, falling back to
//! defaults when absent. This is deliberately a small internal settings
//! struct for the intervals/timeouts/caps the components reference by name
//! (dispatcher tick, heartbeat, lock TTL, lessons tail) — not a pluggable
//! external configuration-loading subsystem.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub locks: LocksConfig,
    #[serde(default)]
    pub lessons: LessonsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatcher: DispatcherConfig::default(),
            workers: WorkersConfig::default(),
            locks: LocksConfig::default(),
            lessons: LessonsConfig::default(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Config::default())
        }
    }

    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".beadforge")
            .join("config.toml")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_staleness_multiplier")]
    pub staleness_multiplier: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
            heartbeat_interval_secs: default_heartbeat_secs(),
            staleness_multiplier: default_staleness_multiplier(),
        }
    }
}

fn default_tick_secs() -> u64 {
    10
}
fn default_heartbeat_secs() -> u64 {
    30
}
fn default_staleness_multiplier() -> u32 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_task_timeout_secs")]
    pub task_timeout_secs: u64,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            task_timeout_secs: default_task_timeout_secs(),
            pool_size: default_pool_size(),
        }
    }
}

fn default_task_timeout_secs() -> u64 {
    30 * 60
}
fn default_pool_size() -> u32 {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocksConfig {
    #[serde(default = "default_lock_ttl_secs")]
    pub default_ttl_secs: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_lock_ttl_secs(),
        }
    }
}

fn default_lock_ttl_secs() -> u64 {
    10 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LessonsConfig {
    #[serde(default = "default_lessons_tail_chars")]
    pub tail_chars: usize,
}

impl Default for LessonsConfig {
    fn default() -> Self {
        Self {
            tail_chars: default_lessons_tail_chars(),
        }
    }
}

fn default_lessons_tail_chars() -> usize {
    4_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let cfg = Config::default();
        let text = cfg.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.dispatcher.tick_interval_secs, cfg.dispatcher.tick_interval_secs);
    }

    #[test]
    fn missing_sections_fall_back_to_defaults() {
        let parsed: Config = toml::from_str("").unwrap();
        assert_eq!(parsed.workers.pool_size, 4);
        assert_eq!(parsed.locks.default_ttl_secs, 600);
    }
}
