//! TOML-based application configuration.
//!
//! Holds every tunable the engine uses:
//! - SM-2 card scheduling constants
//! - memory model constants and knowledge-state thresholds
//! - due-list weights, path planner and study plan settings
//! - analytics list sizes
//! - storage backend and default learner
//!
//! Configuration is stored at `<data dir>/config.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::data_dir;
use crate::cards::{Sm2Config, StudyPlanner};
use crate::error::ConfigError;
use crate::memory::{
    AnalyticsConfig, DueWeights, MemoryModelConfig, PlannerConfig, MAX_SCHEDULE_DAYS,
};

/// Where learner profiles are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One SQLite database for every learner.
    #[default]
    Sqlite,
    /// One JSON document per learner.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Learner used when a command does not name one.
    pub default_user: String,
    pub storage: StorageConfig,
    pub cards: Sm2Config,
    pub study_plan: StudyPlanner,
    pub memory: MemoryModelConfig,
    pub due: DueWeights,
    pub planner: PlannerConfig,
    pub analytics: AnalyticsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_user: "default".to_string(),
            storage: StorageConfig::default(),
            cards: Sm2Config::default(),
            study_plan: StudyPlanner::default(),
            memory: MemoryModelConfig::default(),
            due: DueWeights::default(),
            planner: PlannerConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value.parse::<bool>().map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<f64>() {
                        serde_json::Number::from_f64(n)
                            .map(serde_json::Value::Number)
                            .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as number")));
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    serde_json::from_str(value).map_err(|e| invalid(e.to_string()))?
                }
                _ => serde_json::Value::String(value.into()),
            };
            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown())
    }

    fn collect_leaves(prefix: &str, value: &serde_json::Value, out: &mut Vec<(String, String)>) {
        match value {
            serde_json::Value::Object(map) => {
                for (k, v) in map {
                    let key = if prefix.is_empty() {
                        k.clone()
                    } else {
                        format!("{prefix}.{k}")
                    };
                    Self::collect_leaves(&key, v, out);
                }
            }
            serde_json::Value::String(s) => out.push((prefix.to_string(), s.clone())),
            other => out.push((prefix.to_string(), other.to_string())),
        }
    }

    /// Reject combinations the engine cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };

        let c = &self.cards;
        if !(c.min_ease <= c.initial_ease && c.initial_ease <= c.max_ease) {
            return Err(invalid("cards.initial_ease", "must lie within min_ease..=max_ease"));
        }
        if c.pass_threshold > 5 {
            return Err(invalid("cards.pass_threshold", "must be at most 5"));
        }
        if c.max_interval_days == 0 {
            return Err(invalid("cards.max_interval_days", "must be positive"));
        }

        let m = &self.memory;
        for (key, days) in [
            ("memory.base_interval_days", m.base_interval_days),
            ("memory.failed_interval_days", m.failed_interval_days),
            ("memory.max_interval_days", m.max_interval_days),
        ] {
            if !(days.is_finite() && days > 0.0 && days <= MAX_SCHEDULE_DAYS) {
                return Err(invalid(key, "must be a positive number of days up to 36500"));
            }
        }
        if m.decay_min > m.decay_max {
            return Err(invalid("memory.decay_min", "must not exceed decay_max"));
        }
        if m.difficulty_min > m.difficulty_max || m.difficulty_min <= 0.0 {
            return Err(invalid(
                "memory.difficulty_min",
                "must be positive and not exceed difficulty_max",
            ));
        }
        if m.min_interval_days > m.max_interval_days || m.min_interval_days <= 0.0 {
            return Err(invalid(
                "memory.min_interval_days",
                "must be positive and not exceed max_interval_days",
            ));
        }
        if !(0.0..=1.0).contains(&m.response_time_alpha) || !(0.0..=1.0).contains(&m.confidence_alpha) {
            return Err(invalid("memory", "smoothing factors must lie in 0..=1"));
        }

        if self.study_plan.cycle_days == 0 {
            return Err(invalid("study_plan.cycle_days", "must be positive"));
        }
        if self.default_user.trim().is_empty() {
            return Err(invalid("default_user", "must not be empty"));
        }
        Ok(())
    }

    pub fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from the data directory, writing the defaults on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from an explicit path, writing the defaults if it is missing.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                })?;
                cfg.validate()?;
                debug!(path = %path.display(), "configuration loaded");
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to the data directory.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Persist to an explicit path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Every leaf key with its value, sorted by key.
    pub fn entries(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        if let Ok(json) = serde_json::to_value(self) {
            Self::collect_leaves("", &json, &mut out);
        }
        out.sort();
        out
    }

    /// Change a value by dot-separated key without saving.
    ///
    /// The whole configuration is validated afterwards; on error `self` is
    /// left unchanged.
    pub fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json = serde_json::to_value(&*self).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Set a value by dot-separated key and save to the data directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed,
    /// or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.apply(key, value)?;
        self.save()
    }

    /// Load from disk, returning default on error.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            warn!(error = %e, "falling back to default configuration");
            Self::default()
        })
    }
}
