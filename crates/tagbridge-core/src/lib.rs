//! Core guest runtime for tagbridge.
//!
//! This crate owns everything on the host side of the guest ABI:
//! - [`WasmEngine`]: configured Wasmtime engine
//! - [`CompiledModule`]: compiled guest, optionally cached on disk
//! - [`ModuleCache`]: build-once gate for the shared [`GuestRuntime`]
//! - [`ModuleInstance`]: single-use, single-mount instance lifecycle
//! - [`codec`]: value encoder and decoder over guest linear memory
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │          ModuleCache<GuestRuntime>  (built once)        │
//! │  - WasmEngine                                           │
//! │  - CompiledModule (content hash, .cwasm cache)          │
//! │  - InstancePre (host imports resolved)                  │
//! └─────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │        ModuleInstance  (one per operation)              │
//! │  - Store<GuestContext>: WASI mount, limits, fuel        │
//! │  - Linear memory seen through the Arena trait           │
//! │  - invoke(): encode args, call, decode one word         │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod codec;
pub mod dispatch;
pub mod engine;
pub mod instance;
pub mod memory;
pub mod module;
pub mod mount;
pub mod runtime;
pub mod store;

pub use cache::ModuleCache;
pub use codec::{DecodedResult, EncodedValue, FixedStruct, ResultKind};
pub use engine::WasmEngine;
pub use instance::{ModuleInstance, with_instance};
pub use memory::{Arena, GuestPtr};
pub use module::CompiledModule;
pub use mount::{Mount, MountMode};
pub use runtime::GuestRuntime;
pub use store::{GuestContext, InstanceMetrics};
