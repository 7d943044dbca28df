//! # Game Configuration
//!
//! ```toml
//! max_delta = 0.05
//! timing_logs = true
//! log_level = "tessera=debug,info"
//!
//! [world]
//! max_entities = 4096
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::WorldConfig;
use tracing::info;

use crate::error::{GameError, GameResult};

/// Configuration for a [`Game`](crate::Game).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GameConfig {
    /// Store sizing.
    pub world: WorldConfig,
    /// Upper clamp for a single tick's delta time, in seconds.
    pub max_delta: f32,
    /// Log ticks that exceed the budget.
    pub timing_logs: bool,
    /// Tick budget in milliseconds.
    pub tick_budget_ms: f64,
    /// Log filter directive for binaries (`RUST_LOG` wins when set).
    pub log_level: Option<String>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            world: WorldConfig::default(),
            max_delta: 0.1,
            timing_logs: false,
            tick_budget_ms: 16.666,
            log_level: None,
        }
    }
}

impl GameConfig {
    /// Parses and validates a configuration from TOML.
    ///
    /// # Errors
    ///
    /// [`GameError::ConfigParse`] or a validation error.
    pub fn from_toml_str(source: &str) -> GameResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration file.
    ///
    /// # Errors
    ///
    /// [`GameError::ConfigRead`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: impl AsRef<Path>) -> GameResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| GameError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&source)?;
        info!(path = %path.display(), "game config loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// [`GameError::InvalidConfig`] or the world config's error.
    pub fn validate(&self) -> GameResult<()> {
        if !(self.max_delta.is_finite() && self.max_delta > 0.0) {
            return Err(GameError::InvalidConfig("max_delta must be a positive number".into()));
        }
        if !(self.tick_budget_ms.is_finite() && self.tick_budget_ms > 0.0) {
            return Err(GameError::InvalidConfig("tick_budget_ms must be a positive number".into()));
        }
        self.world.validate()?;
        Ok(())
    }

    /// Tick budget as a duration.
    #[must_use]
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs_f64(self.tick_budget_ms / 1000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tick_budget().as_micros(), 16_666);
    }

    #[test]
    fn test_nested_world_table() {
        let config = GameConfig::from_toml_str(
            "max_delta = 0.05\ntiming_logs = true\n[world]\nmax_entities = 128\n",
        )
        .unwrap();
        assert!(config.timing_logs);
        assert_eq!(config.world.max_entities, 128);
        assert_eq!(config.world.component_pool_size, 16);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            GameConfig::from_toml_str("max_delta = -1.0"),
            Err(GameError::InvalidConfig(_))
        ));
        assert!(matches!(
            GameConfig::from_toml_str("[world]\nmax_entities = 0"),
            Err(GameError::Store(_))
        ));
        assert!(matches!(
            GameConfig::from_toml_str("unknown = 1"),
            Err(GameError::ConfigParse(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            GameConfig::load("/nonexistent/tessera.toml"),
            Err(GameError::ConfigRead { .. })
        ));
    }
}
