//! TOML configuration files.
//!
//! ```toml
//! [engine]
//! fuel_metering = true
//! cache_dir = "/var/cache/tagbridge"
//!
//! [execution]
//! max_fuel = 5_000_000_000
//! max_memory_mb = 128
//!
//! [guest]
//! binary_path = "/usr/share/tagbridge/taglib.wasm"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Top-level configuration file structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Runtime configuration, flattened to the top level of the file.
    #[serde(flatten)]
    pub runtime: RuntimeConfig,
}

impl ConfigFile {
    /// Load configuration from a TOML file.
    ///
    /// Relative `guest.binary_path` and `engine.cache_dir` values are resolved
    /// against the directory containing the file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
            path: path.display().to_string(),
            source: e,
        })?;

        let mut config = Self::from_toml(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigFileError> {
        toml::from_str(content).map_err(|e| ConfigFileError::Parse {
            message: e.to_string(),
        })
    }

    /// Consume the file and return the runtime configuration.
    pub fn into_runtime(self) -> RuntimeConfig {
        self.runtime
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let guest = &mut self.runtime.guest;
        if let Some(binary) = guest.binary_path.as_mut().filter(|p| p.is_relative()) {
            *binary = base.join(&*binary);
        }
        let engine = &mut self.runtime.engine;
        if let Some(dir) = engine.cache_dir.as_mut().filter(|p| p.is_relative()) {
            *dir = base.join(&*dir);
        }
    }
}

/// Configuration file errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// Failed to read configuration file.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse configuration file.
    #[error("Failed to parse config file: {message}")]
    Parse { message: String },
}
