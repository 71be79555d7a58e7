//! Host import registration for Wasmtime linkers.

use wasmtime::Linker;

use tagbridge_common::BridgeError;
use tagbridge_core::{GuestContext, WasmEngine};

use crate::intrinsics::register_intrinsics;

/// Create a linker with every host import the guest needs.
///
/// # Errors
///
/// Returns an error if registration fails.
pub fn new_linker(engine: &WasmEngine) -> Result<Linker<GuestContext>, BridgeError> {
    let mut linker = Linker::new(engine.inner());
    register_all(&mut linker)?;
    Ok(linker)
}

/// Register all host imports on a core module linker:
/// - `wasi_snapshot_preview1::*`, backed by the instance's single mount
/// - `env::__cxa_allocate_exception` and `env::__cxa_throw` stubs
///
/// # Errors
///
/// Returns an error if function registration fails.
pub fn register_all(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    register_wasi(linker)?;
    register_intrinsics(linker)?;
    Ok(())
}

/// Register the WASI preview1 imports.
pub fn register_wasi(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    wasmtime_wasi::preview1::add_to_linker_sync(linker, GuestContext::wasi).map_err(|e| {
        BridgeError::invalid_config(format!("Failed to register WASI imports: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tagbridge_common::EngineConfig;

    #[test]
    fn test_register_wasi() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let mut linker = Linker::new(engine.inner());

        assert!(register_wasi(&mut linker).is_ok());
    }

    #[test]
    fn test_new_linker() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        assert!(new_linker(&engine).is_ok());
    }
}
