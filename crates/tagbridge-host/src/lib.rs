//! Host imports for the tagbridge guest.
//!
//! The guest is a WASI reactor built from C++. It imports two things from
//! the host:
//!
//! - [`wasmtime_wasi`] preview1, so its libc can reach the one directory
//!   mounted for the current operation
//! - [`intrinsics`]: C++ exception entry points, linked as stubs that fail
//!   with [`tagbridge_common::BridgeError::UnsupportedIntrinsic`]

pub mod intrinsics;
pub mod linker;

pub use linker::{new_linker, register_all};
