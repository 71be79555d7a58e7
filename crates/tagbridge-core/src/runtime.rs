//! The shared guest runtime.
//!
//! A [`GuestRuntime`] bundles the engine, the compiled guest module and a
//! pre-linked instantiation template. It is built once, then only read, so
//! any number of threads can instantiate from it concurrently.

use wasmtime::{InstancePre, Linker};

use crate::store::GuestContext;
use crate::{CompiledModule, WasmEngine};
use tagbridge_common::{BridgeError, ExecutionConfig};

/// Name of the guest allocator export.
pub const MALLOC_EXPORT: &str = "malloc";

/// Engine, compiled module and resolved imports, ready to instantiate.
pub struct GuestRuntime {
    engine: WasmEngine,
    module: CompiledModule,
    pre: InstancePre<GuestContext>,
    execution: ExecutionConfig,
    initial_scan_window: u32,
}

impl GuestRuntime {
    /// Resolve the module's imports against `linker`.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::ExportNotFound`] if the guest has no allocator.
    /// - [`BridgeError::Instantiate`] if an import cannot be resolved.
    pub fn new(
        engine: WasmEngine,
        module: CompiledModule,
        linker: &Linker<GuestContext>,
        execution: ExecutionConfig,
        initial_scan_window: u32,
    ) -> Result<Self, BridgeError> {
        if !module.exported_functions().any(|name| name == MALLOC_EXPORT) {
            return Err(BridgeError::ExportNotFound {
                name: MALLOC_EXPORT.to_string(),
            });
        }

        let pre = linker
            .instantiate_pre(module.inner())
            .map_err(|e| BridgeError::instantiate(format!("Failed to link guest imports: {e}")))?;

        Ok(Self {
            engine,
            module,
            pre,
            execution,
            initial_scan_window: initial_scan_window.max(1),
        })
    }

    pub fn engine(&self) -> &WasmEngine {
        &self.engine
    }

    pub fn module(&self) -> &CompiledModule {
        &self.module
    }

    /// Limits applied to every instance.
    pub fn execution(&self) -> &ExecutionConfig {
        &self.execution
    }

    /// First string scan window, in bytes.
    pub fn initial_scan_window(&self) -> u32 {
        self.initial_scan_window
    }

    pub(crate) fn instance_pre(&self) -> &InstancePre<GuestContext> {
        &self.pre
    }
}

impl std::fmt::Debug for GuestRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuestRuntime")
            .field("module", &self.module)
            .field("initial_scan_window", &self.initial_scan_window)
            .finish_non_exhaustive()
    }
}
