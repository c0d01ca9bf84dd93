use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracecheck_core::PoolConfig;

use crate::error::ConfigError;

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TracecheckConfig {
    /// Record pool sizing.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Registry behaviour.
    #[serde(default)]
    pub validator: ValidatorConfig,
}

impl TracecheckConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(source)?)
    }

    /// Read and parse the file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&source)
    }
}

/// Configuration for a [`Validator`](crate::Validator).
#[derive(Debug, Clone, Deserialize)]
pub struct ValidatorConfig {
    /// Whether events flagged as non-public are evaluated.
    #[serde(default = "default_accept_private")]
    pub accept_private: bool,
    /// Timeout used by `wait_for_finished`, in milliseconds.
    #[serde(default = "default_wait_timeout_ms")]
    pub default_wait_timeout_ms: u64,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            accept_private: default_accept_private(),
            default_wait_timeout_ms: default_wait_timeout_ms(),
        }
    }
}

impl ValidatorConfig {
    pub fn default_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.default_wait_timeout_ms)
    }
}

fn default_accept_private() -> bool {
    true
}

fn default_wait_timeout_ms() -> u64 {
    5_000
}
