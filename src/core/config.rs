use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::bounds::PhysicalBounds;
use crate::core::domain::SearchConfig;
use crate::core::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Concurrent optimizer workers.
    pub workers: usize,
    /// Terminal jobs older than this are eligible for eviction.
    pub retention_hours: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            retention_hours: 24,
        }
    }
}

/// Top-level engine configuration. Every section falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub bounds: PhysicalBounds,
    pub search: SearchConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: EngineConfig = serde_json::from_str(&text)?;
        cfg.check()?;
        Ok(cfg)
    }

    pub fn check(&self) -> Result<(), ConfigError> {
        if !self.bounds.is_well_formed() {
            return Err(ConfigError::Invalid("every bound needs finite min < max".into()));
        }
        if self.scheduler.workers == 0 {
            return Err(ConfigError::Invalid("scheduler.workers must be at least 1".into()));
        }
        let s = &self.search;
        if s.max_iterations == 0 || s.patience == 0 {
            return Err(ConfigError::Invalid("search.max_iterations and search.patience must be positive".into()));
        }
        if !(s.of_ratio_step > 0.0 && s.pressure_step > 0.0) {
            return Err(ConfigError::Invalid("search step sizes must be positive".into()));
        }
        if !(s.of_ratio_radius > 0.0 && s.pressure_radius > 0.0) {
            return Err(ConfigError::Invalid("search radii must be positive".into()));
        }
        if s.trajectory_limit < 2 {
            return Err(ConfigError::Invalid("search.trajectory_limit must be at least 2".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{ "search": { "max_iterations": 50 }, "scheduler": { "workers": 4 } }"#)
                .unwrap();
        assert_eq!(cfg.search.max_iterations, 50);
        assert_eq!(cfg.search.patience, SearchConfig::default().patience);
        assert_eq!(cfg.scheduler.workers, 4);
        assert_eq!(cfg.scheduler.retention_hours, 24);
        assert!(cfg.check().is_ok());
    }

    #[test]
    fn zero_workers_rejected() {
        let mut cfg = EngineConfig::default();
        cfg.scheduler.workers = 0;
        assert!(matches!(cfg.check(), Err(ConfigError::Invalid(_))));
    }
}
