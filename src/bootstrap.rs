//! One-time construction of the shared guest runtime.

use std::path::PathBuf;
use std::time::Instant;

use tracing::{info, instrument};

use tagbridge_common::{BridgeError, RuntimeConfig};
use tagbridge_core::{CompiledModule, GuestRuntime, WasmEngine};

/// Where the guest binary comes from.
#[derive(Clone)]
pub enum GuestSource {
    /// Wasm bytes already in memory.
    Bytes(Vec<u8>),
    /// Wasm file read on first use.
    File(PathBuf),
}

impl GuestSource {
    fn load(self) -> Result<Vec<u8>, BridgeError> {
        match self {
            GuestSource::Bytes(bytes) => Ok(bytes),
            GuestSource::File(path) => {
                std::fs::read(&path).map_err(|source| BridgeError::GuestLoad { path, source })
            }
        }
    }
}

impl std::fmt::Debug for GuestSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GuestSource::Bytes(bytes) => write!(f, "Bytes({} bytes)", bytes.len()),
            GuestSource::File(path) => f.debug_tuple("File").field(path).finish(),
        }
    }
}

/// Load, compile and link the guest.
///
/// Consumes `source`, so in-memory guest bytes are released once the
/// module is compiled.
#[instrument(skip(config))]
pub fn build_runtime(source: GuestSource, config: &RuntimeConfig) -> Result<GuestRuntime, BridgeError> {
    let start = Instant::now();

    let engine = WasmEngine::new(&config.engine)?;
    let bytes = source.load()?;

    let module = match config.engine.resolved_cache_dir() {
        Some(dir) => CompiledModule::from_bytes_cached(engine.inner(), &bytes, &dir)?,
        None => CompiledModule::from_bytes(engine.inner(), &bytes)?,
    };
    drop(bytes);

    let linker = tagbridge_host::new_linker(&engine)?;
    let runtime = GuestRuntime::new(
        engine,
        module,
        &linker,
        config.execution.clone(),
        config.guest.initial_scan_window,
    )?;

    info!(
        content_hash = %runtime.module().content_hash(),
        from_cache = runtime.module().is_from_cache(),
        duration_ms = start.elapsed().as_millis(),
        "Guest runtime ready"
    );

    Ok(runtime)
}
