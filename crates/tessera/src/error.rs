//! # Driver Error Types

use std::path::PathBuf;

use tessera_core::EcsError;
use thiserror::Error;

/// Errors surfaced by the tick driver.
#[derive(Error, Debug)]
pub enum GameError {
    /// The store rejected an operation or configuration.
    #[error("store error: {0}")]
    Store(#[from] EcsError),

    /// The config file could not be read.
    #[error("failed to read config `{path}`: {source}")]
    ConfigRead {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`GameConfig`](crate::GameConfig).
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A config value is out of range.
    #[error("invalid game config: {0}")]
    InvalidConfig(String),
}

/// Result type for driver operations.
pub type GameResult<T> = Result<T, GameError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_converts() {
        let err: GameError = EcsError::IdSpaceExhausted { max: 4 }.into();
        assert!(matches!(err, GameError::Store(EcsError::IdSpaceExhausted { max: 4 })));
        assert_eq!(err.to_string(), "store error: entity id space exhausted: 4 live entities");
    }
}
