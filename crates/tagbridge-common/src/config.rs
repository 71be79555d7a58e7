//! Configuration structures for tagbridge.
//!
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (pooling, fuel, compilation cache)
//! - [`ExecutionConfig`]: Per-instance limits (fuel, memory, deadline)
//! - [`GuestConfig`]: Where the guest binary lives and how its results are scanned

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// Can be loaded from TOML (see [`crate::config_file::ConfigFile`]) or JSON.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Per-instance execution configuration.
    #[serde(default)]
    pub execution: ExecutionConfig,

    /// Guest binary configuration.
    #[serde(default)]
    pub guest: GuestConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable the pooling allocator.
    ///
    /// Pre-allocates instance slots, which pays off when many operations run
    /// back to back. Off by default because every operation is a short-lived
    /// single instance.
    #[serde(default)]
    pub pooling_allocator: bool,

    /// Maximum concurrent instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per pooled instance slot in megabytes.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Enable fuel metering.
    ///
    /// When enabled, each instance may spend at most
    /// [`ExecutionConfig::max_fuel`] across all of its calls.
    #[serde(default)]
    pub fuel_metering: bool,

    /// Cache compiled machine code on disk.
    #[serde(default = "defaults::cache_compiled_modules")]
    pub cache_compiled_modules: bool,

    /// Directory for the compilation cache.
    ///
    /// Defaults to `tagbridge-wasm` under the system temp directory.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: false,
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            fuel_metering: false,
            cache_compiled_modules: defaults::cache_compiled_modules(),
            cache_dir: None,
        }
    }
}

impl EngineConfig {
    /// The compilation cache directory, or `None` when caching is disabled.
    pub fn resolved_cache_dir(&self) -> Option<PathBuf> {
        if !self.cache_compiled_modules {
            return None;
        }
        Some(
            self.cache_dir
                .clone()
                .unwrap_or_else(|| std::env::temp_dir().join(defaults::CACHE_DIR_NAME)),
        )
    }
}

/// Per-instance execution configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutionConfig {
    /// Fuel granted to each instance when fuel metering is enabled.
    #[serde(default = "defaults::max_fuel")]
    pub max_fuel: u64,

    /// Maximum linear memory per instance in megabytes.
    ///
    /// Growth beyond this is refused, which the guest allocator reports as
    /// the null sentinel.
    #[serde(default = "defaults::max_memory_mb")]
    pub max_memory_mb: u32,

    /// Deadline in milliseconds used by the async deadline wrapper.
    #[serde(default = "defaults::timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_fuel: defaults::max_fuel(),
            max_memory_mb: defaults::max_memory_mb(),
            timeout_ms: defaults::timeout_ms(),
        }
    }
}

impl ExecutionConfig {
    /// Get the deadline as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Maximum linear memory in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb as usize) * 1024 * 1024
    }
}

/// Guest binary configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GuestConfig {
    /// Path to the guest `.wasm` binary.
    ///
    /// Required when the runtime is built from configuration alone.
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Size in bytes of the first window read when scanning a guest string
    /// for its NUL terminator. Later windows double in size.
    #[serde(default = "defaults::initial_scan_window")]
    pub initial_scan_window: u32,
}

impl Default for GuestConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            initial_scan_window: defaults::initial_scan_window(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const CACHE_DIR_NAME: &str = "tagbridge-wasm";

    pub const fn max_instances() -> u32 {
        64
    }

    pub const fn instance_memory_mb() -> u32 {
        256
    }

    pub const fn cache_compiled_modules() -> bool {
        true
    }

    pub const fn max_fuel() -> u64 {
        10_000_000_000
    }

    pub const fn max_memory_mb() -> u32 {
        256
    }

    pub const fn timeout_ms() -> u64 {
        30_000
    }

    pub const fn initial_scan_window() -> u32 {
        64
    }
}
