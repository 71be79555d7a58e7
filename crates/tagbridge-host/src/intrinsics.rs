//! Stub intrinsics for the guest's C++ runtime.
//!
//! The guest is compiled without exception support, but its libc++ still
//! imports the exception-raising entry points. They are linked so the module
//! instantiates, and fail loudly if ever reached.

use tracing::error;
use wasmtime::{Caller, Linker};

use tagbridge_common::BridgeError;
use tagbridge_core::GuestContext;

/// Import module that holds the intrinsics.
pub const ENV_MODULE: &str = "env";

/// `__cxa_allocate_exception(size: i32) -> i32`
pub const ALLOCATE_EXCEPTION: &str = "__cxa_allocate_exception";

/// `__cxa_throw(thrown: i32, type_info: i32, dtor: i32)`
pub const THROW: &str = "__cxa_throw";

/// Register both stubs in the `env` module.
///
/// # Errors
///
/// Returns an error if either name is already defined on `linker`.
pub fn register_intrinsics(linker: &mut Linker<GuestContext>) -> Result<(), BridgeError> {
    linker
        .func_wrap(
            ENV_MODULE,
            ALLOCATE_EXCEPTION,
            |caller: Caller<'_, GuestContext>, size: i32| -> wasmtime::Result<i32> {
                error!(
                    operation_id = %caller.data().operation_id,
                    size,
                    "Guest tried to allocate a C++ exception"
                );
                Err(unsupported(ALLOCATE_EXCEPTION))
            },
        )
        .map_err(|e| registration_failed(ALLOCATE_EXCEPTION, &e))?;

    linker
        .func_wrap(
            ENV_MODULE,
            THROW,
            |caller: Caller<'_, GuestContext>, thrown: i32, _type_info: i32, _dtor: i32| -> wasmtime::Result<()> {
                error!(
                    operation_id = %caller.data().operation_id,
                    thrown,
                    "Guest tried to throw a C++ exception"
                );
                Err(unsupported(THROW))
            },
        )
        .map_err(|e| registration_failed(THROW, &e))?;

    Ok(())
}

fn unsupported(name: &str) -> wasmtime::Error {
    wasmtime::Error::new(BridgeError::UnsupportedIntrinsic {
        name: name.to_string(),
    })
}

fn registration_failed(name: &str, e: &wasmtime::Error) -> BridgeError {
    BridgeError::invalid_config(format!("Failed to register '{ENV_MODULE}::{name}': {e}"))
}
