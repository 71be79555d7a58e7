//! Per-instance store context.
//!
//! - [`GuestContext`]: the data owned by one instance's [`Store`]
//! - [`InstanceMetrics`]: fuel and wall-clock figures for one operation

use std::time::{Duration, Instant};

use uuid::Uuid;
use wasmtime::{Store, StoreLimits, StoreLimitsBuilder};
use wasmtime_wasi::preview1::WasiP1Ctx;

use crate::WasmEngine;
use crate::mount::Mount;
use tagbridge_common::{BridgeError, ExecutionConfig};

/// State for one instance. Created with the instance, dropped with it.
pub struct GuestContext {
    /// WASI preview1 context holding the single preopened mount.
    wasi: WasiP1Ctx,

    /// Memory growth limits.
    limits: StoreLimits,

    /// Unique identifier for tracing this operation.
    pub operation_id: String,

    /// Metrics for this operation.
    pub metrics: InstanceMetrics,

    start_time: Instant,
}

/// Metrics for one instance.
#[derive(Debug, Clone, Default)]
pub struct InstanceMetrics {
    /// Fuel consumed across every call into the instance.
    pub fuel_consumed: u64,

    /// Exported calls made, allocator calls included.
    pub calls: u32,

    /// Linear memory size at close, in bytes.
    pub memory_bytes: usize,

    /// Lifetime of the instance.
    pub duration: Option<Duration>,
}

impl GuestContext {
    /// Create a context with the given WASI context and memory cap.
    pub fn new(wasi: WasiP1Ctx, max_memory_bytes: usize) -> Self {
        let limits = StoreLimitsBuilder::new()
            .memory_size(max_memory_bytes)
            .instances(1)
            .build();

        Self {
            wasi,
            limits,
            operation_id: Uuid::new_v4().to_string(),
            metrics: InstanceMetrics::default(),
            start_time: Instant::now(),
        }
    }

    /// WASI context, for linking the preview1 imports.
    pub fn wasi(&mut self) -> &mut WasiP1Ctx {
        &mut self.wasi
    }

    /// Finalize metrics at close.
    pub fn finalize_metrics(&mut self, memory_bytes: usize) {
        self.metrics.memory_bytes = memory_bytes;
        self.metrics.duration = Some(self.start_time.elapsed());
    }
}

/// Create a store for one instance using `mount`.
///
/// # Errors
///
/// Returns an error if the mount cannot be opened or fuel cannot be set.
pub fn create_store(
    engine: &WasmEngine,
    config: &ExecutionConfig,
    mount: &Mount,
) -> Result<Store<GuestContext>, BridgeError> {
    let context = GuestContext::new(mount.build_wasi()?, config.max_memory_bytes());
    let mut store = Store::new(engine.inner(), context);

    store.limiter(|ctx| &mut ctx.limits);

    if engine.is_fuel_metered() {
        store
            .set_fuel(config.max_fuel)
            .map_err(|e| BridgeError::invalid_config(format!("Failed to set fuel: {e}")))?;
    }

    Ok(store)
}

/// Get remaining fuel from a store.
pub fn get_remaining_fuel(store: &Store<GuestContext>) -> Option<u64> {
    store.get_fuel().ok()
}
