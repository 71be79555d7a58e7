//! Build-once cache for the shared guest runtime.
//!
//! [`ModuleCache`] owns a one-shot build closure and a [`OnceLock`] holding
//! its outcome. The first [`ModuleCache::acquire`] runs the closure; callers
//! arriving while it runs block on the lock and then read the same stored
//! outcome. A failed build is stored too and never retried.

use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tracing::{debug, error};

use tagbridge_common::BridgeError;

type BuildFn<T> = Box<dyn FnOnce() -> Result<T, BridgeError> + Send>;

/// Memoized outcome of a one-time build.
pub struct ModuleCache<T> {
    cell: OnceLock<Result<Arc<T>, Arc<BridgeError>>>,
    build: Mutex<Option<BuildFn<T>>>,
}

impl<T> ModuleCache<T> {
    /// Create a cache around `build`. Nothing runs until the first acquire.
    pub fn new<F>(build: F) -> Self
    where
        F: FnOnce() -> Result<T, BridgeError> + Send + 'static,
    {
        Self {
            cell: OnceLock::new(),
            build: Mutex::new(Some(Box::new(build))),
        }
    }

    /// Get the built value, building it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::BuildFailed`] wrapping the stored build error.
    /// Every caller gets a clone of the same `Arc`.
    pub fn acquire(&self) -> Result<Arc<T>, BridgeError> {
        let outcome = self.cell.get_or_init(|| {
            // Only reachable once: OnceLock serializes initializers.
            let Some(build) = self.build.lock().take() else {
                return Err(Arc::new(BridgeError::invalid_config(
                    "guest runtime build closure already consumed",
                )));
            };

            debug!("Building guest runtime");
            match build() {
                Ok(value) => Ok(Arc::new(value)),
                Err(e) => {
                    error!(error = %e, "Guest runtime build failed");
                    Err(Arc::new(e))
                }
            }
        });

        match outcome {
            Ok(value) => Ok(Arc::clone(value)),
            Err(e) => Err(BridgeError::BuildFailed(Arc::clone(e))),
        }
    }

    /// The built value, if a build already succeeded. Never triggers a build.
    pub fn get(&self) -> Option<Arc<T>> {
        match self.cell.get() {
            Some(Ok(value)) => Some(Arc::clone(value)),
            _ => None,
        }
    }

    /// Whether the build has run, successfully or not.
    pub fn is_built(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> std::fmt::Debug for ModuleCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self.cell.get() {
            None => "pending",
            Some(Ok(_)) => "ready",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("ModuleCache")
            .field("state", &state)
            .finish_non_exhaustive()
    }
}
