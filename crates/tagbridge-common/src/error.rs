//! Error types for tagbridge.
//!
//! [`BridgeError`] covers every failure that can happen on the way across
//! the host/guest boundary. The variants fall into a few families:
//!
//! - **Build**: the guest binary could not be loaded or compiled, or the
//!   on-disk compilation cache could not be used. Fatal on first use and
//!   memoized, never retried.
//! - **Lifecycle**: an instance could not be created or closed.
//! - **Resource**: the guest allocator returned the null sentinel, fuel ran
//!   out, or a deadline passed.
//! - **Guest-signaled**: the guest returned its failure sentinel for the
//!   operation (`InvalidFile`, `SaveFailed`).
//! - **Protocol**: the guest trapped, or the host and guest disagree about
//!   the ABI (`MemoryFault`, `SignatureMismatch`, ...).

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

/// Top-level error for every boundary operation.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The guest binary failed to compile.
    #[error("Compilation failed: {reason}")]
    CompilationFailed {
        /// Description of the compilation failure.
        reason: String,
    },

    /// The guest binary could not be read from disk.
    #[error("Failed to read guest binary '{}': {source}", path.display())]
    GuestLoad {
        /// Path of the guest binary.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The compilation cache directory or an artifact in it could not be used.
    #[error("Compilation cache I/O failed at '{}': {source}", path.display())]
    CacheIo {
        /// Cache path that failed.
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The one-time build failed; every caller observes this same outcome.
    #[error("Guest runtime unavailable: {0}")]
    BuildFailed(#[source] Arc<BridgeError>),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The guest invoked a host intrinsic that this deployment never supports.
    #[error("Guest invoked unsupported intrinsic '{name}'")]
    UnsupportedIntrinsic {
        /// Import name of the intrinsic.
        name: String,
    },

    /// A fresh instance could not be created or initialized.
    #[error("Instantiation failed: {reason}")]
    Instantiate {
        /// Description of the failure.
        reason: String,
    },

    /// Tearing down an instance failed.
    #[error("Instance close failed: {reason}")]
    Close {
        /// Description of the failure.
        reason: String,
    },

    /// The operation failed and closing its instance failed too.
    #[error("{original} (instance close also failed: {close})")]
    CloseAfterFailure {
        /// The error the operation itself produced.
        #[source]
        original: Box<BridgeError>,
        /// The close failure that followed it.
        close: Box<BridgeError>,
    },

    /// The guest allocator returned the null sentinel.
    #[error("Guest allocation of {size} bytes failed: resource exhausted")]
    AllocationFailed {
        /// Requested allocation size in bytes.
        size: u32,
    },

    /// Execution exhausted the configured fuel limit.
    #[error("Fuel exhausted: CPU limit exceeded")]
    FuelExhausted,

    /// The operation did not finish before its deadline and was abandoned.
    #[error("Execution timeout after {duration_ms}ms")]
    ExecutionTimeout {
        /// The timeout duration in milliseconds.
        duration_ms: u64,
    },

    /// The guest rejected the file as unreadable or unsupported.
    #[error("Invalid file: {}", path.display())]
    InvalidFile {
        /// Host path of the file.
        path: PathBuf,
    },

    /// The guest could not save the file.
    #[error("Can't save file: {}", path.display())]
    SaveFailed {
        /// Host path of the file.
        path: PathBuf,
    },

    /// The guest trapped during an exported call.
    #[error("Wasm trap in '{export}': {message}")]
    Trap {
        /// Export being called when the trap happened.
        export: String,
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },

    /// A guest offset did not resolve inside linear memory.
    #[error("Memory fault: {len} bytes at offset {offset} outside {memory_size}-byte memory")]
    MemoryFault {
        /// Offending guest offset.
        offset: u64,
        /// Number of bytes that were accessed.
        len: u64,
        /// Size of linear memory at the time of access.
        memory_size: u64,
    },

    /// The guest does not export the requested function.
    #[error("Export not found: {name}")]
    ExportNotFound {
        /// Export name.
        name: String,
    },

    /// The export's signature does not match the declared call shape.
    #[error("Signature mismatch for '{export}': {reason}")]
    SignatureMismatch {
        /// Export name.
        export: String,
        /// Description of the mismatch.
        reason: String,
    },

    /// A decoded result was not of the kind the caller asked for.
    #[error("Expected {expected} result, got {found}")]
    ResultKindMismatch {
        /// Kind the caller expected.
        expected: &'static str,
        /// Kind that was decoded.
        found: &'static str,
    },

    /// The runtime handle was shut down.
    #[error("Runtime has been shut down")]
    ShutDown,

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            reason: reason.into(),
        }
    }

    /// Create a new `CacheIo` error.
    pub fn cache_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::CacheIo {
            path: path.into(),
            source,
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a new `Instantiate` error.
    pub fn instantiate(reason: impl Into<String>) -> Self {
        Self::Instantiate {
            reason: reason.into(),
        }
    }

    /// Create a new `Close` error.
    pub fn close(reason: impl Into<String>) -> Self {
        Self::Close {
            reason: reason.into(),
        }
    }

    /// Create a new `Trap` error.
    pub fn trap(export: impl Into<String>, message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            export: export.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a new `MemoryFault` error.
    pub fn memory_fault(offset: u64, len: u64, memory_size: usize) -> Self {
        Self::MemoryFault {
            offset,
            len,
            memory_size: memory_size as u64,
        }
    }

    /// Create a new `SignatureMismatch` error.
    pub fn signature_mismatch(export: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SignatureMismatch {
            export: export.into(),
            reason: reason.into(),
        }
    }

    /// Combine an operation failure with the close failure that followed it.
    ///
    /// The original error stays first in the chain.
    pub fn close_after_failure(original: BridgeError, close: BridgeError) -> Self {
        Self::CloseAfterFailure {
            original: Box::new(original),
            close: Box::new(close),
        }
    }

    /// The error the operation itself produced, looking through close failures.
    pub fn original(&self) -> &BridgeError {
        match self {
            Self::CloseAfterFailure { original, .. } => original.original(),
            other => other,
        }
    }

    /// Returns `true` for errors that indicate a broken build or a host/guest
    /// ABI mismatch. These must never be swallowed.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::CompilationFailed { .. }
            | Self::GuestLoad { .. }
            | Self::CacheIo { .. }
            | Self::BuildFailed(_)
            | Self::InvalidConfig { .. }
            | Self::UnsupportedIntrinsic { .. }
            | Self::MemoryFault { .. }
            | Self::ExportNotFound { .. }
            | Self::SignatureMismatch { .. }
            | Self::ResultKindMismatch { .. } => true,
            Self::CloseAfterFailure { original, .. } => original.is_fatal(),
            _ => false,
        }
    }

    /// Returns `true` if this error indicates a resource limit was exceeded.
    pub fn is_resource_limit(&self) -> bool {
        matches!(
            self.original(),
            Self::AllocationFailed { .. } | Self::FuelExhausted | Self::ExecutionTimeout { .. }
        )
    }

    /// Returns `true` if the guest itself reported the failure through a
    /// sentinel result rather than faulting.
    pub fn is_guest_signaled(&self) -> bool {
        matches!(
            self.original(),
            Self::InvalidFile { .. } | Self::SaveFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = BridgeError::AllocationFailed { size: 12 };
        assert_eq!(
            err.to_string(),
            "Guest allocation of 12 bytes failed: resource exhausted"
        );

        let err = BridgeError::FuelExhausted;
        assert_eq!(err.to_string(), "Fuel exhausted: CPU limit exceeded");
    }

    #[test]
    fn test_close_after_failure_keeps_original() {
        let err = BridgeError::close_after_failure(
            BridgeError::trap("taglib_file_tags", "unreachable", None),
            BridgeError::close("finalizer trapped"),
        );

        assert!(matches!(err.original(), BridgeError::Trap { .. }));
        assert!(err.to_string().starts_with("Wasm trap in 'taglib_file_tags'"));
        assert!(err.to_string().contains("finalizer trapped"));

        let source = err.source().unwrap();
        assert!(source.to_string().contains("unreachable"));
    }

    #[test]
    fn test_is_fatal() {
        assert!(BridgeError::memory_fault(10, 4, 8).is_fatal());
        assert!(
            BridgeError::UnsupportedIntrinsic {
                name: "__cxa_throw".into()
            }
            .is_fatal()
        );
        assert!(BridgeError::BuildFailed(Arc::new(BridgeError::compilation_failed("x"))).is_fatal());
        assert!(!BridgeError::trap("f", "boom", None).is_fatal());
        assert!(
            !BridgeError::InvalidFile {
                path: "a.mp3".into()
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_is_resource_limit() {
        assert!(BridgeError::AllocationFailed { size: 1 }.is_resource_limit());
        assert!(BridgeError::FuelExhausted.is_resource_limit());
        assert!(BridgeError::ExecutionTimeout { duration_ms: 100 }.is_resource_limit());
        assert!(!BridgeError::ShutDown.is_resource_limit());
    }

    #[test]
    fn test_guest_signaled_is_not_a_trap() {
        let invalid = BridgeError::InvalidFile {
            path: "x.flac".into(),
        };
        let trap = BridgeError::trap("taglib_file_tags", "unreachable", None);

        assert!(invalid.is_guest_signaled());
        assert!(!trap.is_guest_signaled());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "missing");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }
}
