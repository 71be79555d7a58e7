//! Module instance lifecycle.
//!
//! A [`ModuleInstance`] is created for exactly one operation and torn down
//! right after it:
//!
//! 1. Fresh store with its own limits, fuel and single directory mount
//! 2. Instantiate from the pre-linked template
//! 3. Run the guest's `_initialize` export, if any
//! 4. Serve exported calls ([`ModuleInstance::invoke`])
//! 5. Run `__wasm_call_dtors`, if exported, and release everything
//!
//! [`with_instance`] drives steps 1 to 5 and guarantees step 5 on every exit
//! path.

use std::time::Instant;

use tracing::{debug, error, instrument, warn};
use wasmtime::{Instance, Memory, Store, Trap, TypedFunc};

use crate::memory::Arena;
use crate::mount::Mount;
use crate::runtime::{GuestRuntime, MALLOC_EXPORT};
use crate::store::{GuestContext, InstanceMetrics, create_store, get_remaining_fuel};
use tagbridge_common::BridgeError;

const MEMORY_EXPORT: &str = "memory";
const INITIALIZE_EXPORT: &str = "_initialize";
const FINALIZE_EXPORT: &str = "__wasm_call_dtors";

/// One isolated, single-use guest instance.
pub struct ModuleInstance {
    pub(crate) store: Store<GuestContext>,
    pub(crate) instance: Instance,
    memory: Memory,
    malloc: TypedFunc<u32, u32>,
    pub(crate) initial_scan_window: u32,
    closed: bool,
}

impl ModuleInstance {
    /// Create a fresh instance that sees only `mount`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::Instantiate`] if the mount cannot be opened, the
    ///   guest cannot be instantiated, or `_initialize` traps.
    /// - [`BridgeError::ExportNotFound`] / [`BridgeError::SignatureMismatch`]
    ///   if the guest lacks a usable memory or allocator.
    #[instrument(skip_all, fields(directory = %mount.directory().display(), mode = ?mount.mode()))]
    pub fn instantiate(runtime: &GuestRuntime, mount: &Mount) -> Result<Self, BridgeError> {
        let start = Instant::now();
        let mut store = create_store(runtime.engine(), runtime.execution(), mount)?;

        let instance = runtime
            .instance_pre()
            .instantiate(&mut store)
            .map_err(|e| BridgeError::instantiate(format!("{e:#}")))?;

        let memory = instance
            .get_memory(&mut store, MEMORY_EXPORT)
            .ok_or_else(|| BridgeError::ExportNotFound {
                name: MEMORY_EXPORT.to_string(),
            })?;

        let malloc = instance
            .get_typed_func::<u32, u32>(&mut store, MALLOC_EXPORT)
            .map_err(|e| BridgeError::signature_mismatch(MALLOC_EXPORT, e.to_string()))?;

        if let Some(init) = instance.get_func(&mut store, INITIALIZE_EXPORT) {
            let init = init
                .typed::<(), ()>(&store)
                .map_err(|e| BridgeError::signature_mismatch(INITIALIZE_EXPORT, e.to_string()))?;

            tracked_call(&mut store, INITIALIZE_EXPORT, |store| init.call(store, ())).map_err(
                |e| match e {
                    BridgeError::Trap { message, .. } => BridgeError::instantiate(format!(
                        "'{INITIALIZE_EXPORT}' trapped: {message}"
                    )),
                    other => other,
                },
            )?;
        }

        debug!(
            operation_id = %store.data().operation_id,
            duration_us = start.elapsed().as_micros(),
            "Instance ready"
        );

        Ok(Self {
            store,
            instance,
            memory,
            malloc,
            initial_scan_window: runtime.initial_scan_window(),
            closed: false,
        })
    }

    /// Tear the instance down, running the guest finalizer if it has one.
    ///
    /// Consumes the instance, so it cannot be closed twice.
    ///
    /// # Errors
    ///
    /// [`BridgeError::Close`] if the finalizer traps.
    pub fn close(mut self) -> Result<InstanceMetrics, BridgeError> {
        self.closed = true;

        let finalized = match self.instance.get_func(&mut self.store, FINALIZE_EXPORT) {
            Some(dtors) => match dtors.typed::<(), ()>(&self.store) {
                Ok(dtors) => tracked_call(&mut self.store, FINALIZE_EXPORT, |store| {
                    dtors.call(store, ())
                })
                .map_err(|e| BridgeError::close(e.to_string())),
                Err(e) => Err(BridgeError::close(format!(
                    "'{FINALIZE_EXPORT}' has an unexpected signature: {e}"
                ))),
            },
            None => Ok(()),
        };

        let memory_bytes = self.memory.data_size(&self.store);
        let ctx = self.store.data_mut();
        ctx.finalize_metrics(memory_bytes);

        let metrics = ctx.metrics.clone();
        debug!(
            operation_id = %ctx.operation_id,
            calls = metrics.calls,
            fuel_consumed = metrics.fuel_consumed,
            memory_bytes = metrics.memory_bytes,
            duration_ms = metrics.duration.map_or(0, |d| d.as_millis()),
            "Instance closed"
        );

        finalized.map(|()| metrics)
    }

    /// Unique identifier of this instance's operation.
    pub fn operation_id(&self) -> &str {
        &self.store.data().operation_id
    }

    /// Metrics gathered so far.
    pub fn metrics(&self) -> &InstanceMetrics {
        &self.store.data().metrics
    }

    /// Current size of linear memory in bytes.
    pub fn memory_size(&self) -> usize {
        self.memory.data_size(&self.store)
    }
}

impl Arena for ModuleInstance {
    fn data(&self) -> &[u8] {
        self.memory.data(&self.store)
    }

    fn data_mut(&mut self) -> &mut [u8] {
        self.memory.data_mut(&mut self.store)
    }

    fn malloc(&mut self, size: u32) -> Result<u32, BridgeError> {
        let malloc = &self.malloc;
        tracked_call(&mut self.store, MALLOC_EXPORT, |store| malloc.call(store, size))
    }
}

impl Drop for ModuleInstance {
    fn drop(&mut self) {
        if !self.closed {
            warn!(
                operation_id = %self.store.data().operation_id,
                "Instance dropped without close; releasing without finalizer"
            );
        }
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("operation_id", &self.store.data().operation_id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

/// Run `op` against a fresh instance and close it on every exit path.
///
/// If `op` fails and closing fails as well, the result is
/// [`BridgeError::CloseAfterFailure`] with `op`'s error first.
pub fn with_instance<T, F>(runtime: &GuestRuntime, mount: &Mount, op: F) -> Result<T, BridgeError>
where
    F: FnOnce(&mut ModuleInstance) -> Result<T, BridgeError>,
{
    let mut instance = ModuleInstance::instantiate(runtime, mount)?;
    let outcome = op(&mut instance);

    match (outcome, instance.close()) {
        (Ok(value), Ok(_)) => Ok(value),
        (Ok(_), Err(close)) => Err(close),
        (Err(original), Ok(_)) => Err(original),
        (Err(original), Err(close)) => {
            warn!(error = %close, "Instance close failed after operation failure");
            Err(BridgeError::close_after_failure(original, close))
        }
    }
}

/// Call into the guest, recording fuel and call count on the store.
pub(crate) fn tracked_call<R>(
    store: &mut Store<GuestContext>,
    export: &str,
    call: impl FnOnce(&mut Store<GuestContext>) -> wasmtime::Result<R>,
) -> Result<R, BridgeError> {
    let initial_fuel = get_remaining_fuel(store);
    let result = call(store);

    let remaining = get_remaining_fuel(store);
    let metrics = &mut store.data_mut().metrics;
    metrics.calls += 1;
    if let (Some(before), Some(after)) = (initial_fuel, remaining) {
        metrics.fuel_consumed += before.saturating_sub(after);
    }

    result.map_err(|e| call_error(export, e))
}

/// Classify an error raised while the guest was running.
fn call_error(export: &str, error: wasmtime::Error) -> BridgeError {
    if error
        .downcast_ref::<Trap>()
        .is_some_and(|trap| *trap == Trap::OutOfFuel)
    {
        warn!(export, "Execution terminated: fuel exhausted");
        return BridgeError::FuelExhausted;
    }

    let error = match error.downcast::<BridgeError>() {
        Ok(host) => {
            error!(export, error = %host, "Host intrinsic failed during guest call");
            return host;
        }
        Err(error) => error,
    };

    let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));
    let message = error.root_cause().to_string();
    debug!(export, message = %message, code = ?code, "Guest trapped");

    BridgeError::trap(export, message, code)
}
