//! Session configuration, read from TOML.

use lg_engine::EngineConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("grid must have at least one track and one scene")]
    EmptyGrid,
}

/// Everything needed to build a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopgridConfig {
    pub tracks: usize,
    pub scenes: usize,
    /// How often the butler thread polls clip ports, in milliseconds
    pub butler_poll_ms: u64,
    pub engine: EngineConfig,
}

impl Default for LoopgridConfig {
    fn default() -> Self {
        Self {
            tracks: 4,
            scenes: 4,
            butler_poll_ms: 5,
            engine: EngineConfig::default(),
        }
    }
}

impl LoopgridConfig {
    /// Parse a TOML document. Missing fields keep their defaults.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracks == 0 || self.scenes == 0 {
            return Err(ConfigError::EmptyGrid);
        }
        Ok(())
    }
}
