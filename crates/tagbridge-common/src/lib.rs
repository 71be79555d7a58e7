//! Common types, errors, and configuration for tagbridge.
//!
//! This crate provides shared functionality used across the workspace:
//! - [`BridgeError`], the error taxonomy for every boundary operation
//! - Configuration structures and TOML file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, ExecutionConfig, GuestConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError};
pub use error::BridgeError;
