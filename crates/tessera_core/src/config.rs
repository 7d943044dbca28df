//! # Store Configuration
//!
//! Sizing knobs for a [`World`](crate::World). Loaded once at startup,
//! either built in code or parsed from TOML.
//!
//! ```toml
//! max_entities = 4096
//! component_pool_size = 32
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ecs::{EntityId, MAX_COMPONENT_TYPES};
use crate::error::{EcsError, EcsResult};

/// Default number of simultaneously live entities (2^16).
pub const DEFAULT_MAX_ENTITIES: u32 = 1 << 16;

/// Configuration for a world.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldConfig {
    /// Maximum number of live entity signifiers.
    pub max_entities: u32,
    /// Maximum number of registered component types.
    pub max_component_types: usize,
    /// Entity records pre-allocated in the entity pool.
    pub entity_pool_size: usize,
    /// Instances pre-allocated in each component pool.
    pub component_pool_size: usize,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            max_entities: DEFAULT_MAX_ENTITIES,
            max_component_types: MAX_COMPONENT_TYPES,
            entity_pool_size: 64,
            component_pool_size: 16,
        }
    }
}

impl WorldConfig {
    /// Parses a configuration from a TOML string and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] on parse or validation failure.
    pub fn from_toml_str(source: &str) -> EcsResult<Self> {
        let config: Self =
            toml::from_str(source).map_err(|e| EcsError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> EcsResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| EcsError::InvalidConfig(format!("{}: {e}", path.display())))?;
        let config = Self::from_toml_str(&source)?;
        tracing::info!(path = %path.display(), ?config, "world config loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> EcsResult<()> {
        if self.max_entities == 0 {
            return Err(EcsError::InvalidConfig("max_entities must be > 0".into()));
        }
        // Signifier 0 is reserved, so one slot of the 24-bit space is unusable.
        if self.max_entities > EntityId::MAX_SIGNIFIER {
            return Err(EcsError::InvalidConfig(format!(
                "max_entities must be <= {}",
                EntityId::MAX_SIGNIFIER
            )));
        }
        if self.max_component_types == 0 || self.max_component_types > MAX_COMPONENT_TYPES {
            return Err(EcsError::InvalidConfig(format!(
                "max_component_types must be in 1..={MAX_COMPONENT_TYPES}"
            )));
        }
        Ok(())
    }
}
