//! Guest module compilation and the on-disk compilation cache.
//!
//! [`CompiledModule`] wraps a Wasmtime [`Module`]. It is compiled once per
//! process and is immutable afterwards, so any number of instances can be
//! created from it concurrently.
//!
//! When a cache directory is configured, the compiled machine code is
//! written to `<cache_dir>/<key>.cwasm` and loaded from there on the next
//! process start instead of being recompiled.

use std::fmt::Write as _;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};
use wasmtime::{Engine, Module};

use tagbridge_common::BridgeError;

/// Bumped whenever the cache key inputs change shape.
const CACHE_KEY_VERSION: &[u8] = b"tagbridge-cache-v1\0";

/// A compiled guest module.
///
/// Cloning is cheap; the underlying Wasmtime module is reference counted.
#[derive(Clone)]
pub struct CompiledModule {
    module: Module,

    /// SHA-256 of the original Wasm bytes, hex encoded.
    content_hash: String,

    /// Whether the module was loaded from the on-disk cache.
    from_cache: bool,
}

impl CompiledModule {
    /// Compile a module from WebAssembly bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid Wasm module.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_bytes(engine: &Engine, bytes: &[u8]) -> Result<Self, BridgeError> {
        let start = Instant::now();

        Self::validate_wasm_header(bytes)?;

        let module = Module::new(engine, bytes).map_err(|e| {
            BridgeError::compilation_failed(format!("Guest module compilation failed: {e}"))
        })?;

        let content_hash = content_hash(bytes);

        info!(
            content_hash = %content_hash,
            duration_ms = start.elapsed().as_millis(),
            "Guest module compiled"
        );

        Ok(Self {
            module,
            content_hash,
            from_cache: false,
        })
    }

    /// Compile a module, going through the on-disk cache in `cache_dir`.
    ///
    /// A cached artifact that fails to load (stale, truncated, or produced by
    /// an incompatible engine) is recompiled and overwritten.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::CacheIo`] if the cache directory cannot be
    /// created or the artifact cannot be written, and
    /// [`BridgeError::CompilationFailed`] if the bytes do not compile.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len(), cache_dir = %cache_dir.display()))]
    pub fn from_bytes_cached(
        engine: &Engine,
        bytes: &[u8],
        cache_dir: &Path,
    ) -> Result<Self, BridgeError> {
        Self::validate_wasm_header(bytes)?;

        std::fs::create_dir_all(cache_dir).map_err(|e| BridgeError::cache_io(cache_dir, e))?;

        let key = cache_key(engine, bytes);
        let cache_path = cache_dir.join(format!("{key}.cwasm"));

        if cache_path.is_file() {
            match Self::from_precompiled(engine, &cache_path) {
                Ok(mut module) => {
                    module.content_hash = content_hash(bytes);
                    return Ok(module);
                }
                Err(e) => {
                    warn!(path = %cache_path.display(), error = %e, "Discarding stale compilation cache entry");
                }
            }
        }

        let module = Self::from_bytes(engine, bytes)?;
        let serialized = module.serialize()?;
        write_cache_file_atomic(&cache_path, &serialized)?;

        info!(path = %cache_path.display(), "Compilation cache entry written");

        Ok(module)
    }

    /// Load a pre-compiled module from disk.
    ///
    /// # Safety
    ///
    /// This deserializes machine code. Only artifacts produced by
    /// [`CompiledModule::serialize`] under the same Wasmtime version and
    /// engine settings may be loaded; Wasmtime rejects incompatible ones.
    #[allow(unsafe_code)]
    #[instrument(skip(engine, path))]
    pub fn from_precompiled(engine: &Engine, path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let start = Instant::now();

        // SAFETY: artifacts in the cache directory are written by `serialize`
        // and keyed by the engine's compatibility hash.
        let module = unsafe { Module::deserialize_file(engine, path) }.map_err(|e| {
            BridgeError::compilation_failed(format!(
                "Failed to load precompiled module from {}: {e}",
                path.display()
            ))
        })?;

        // {key}.cwasm
        let content_hash = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();

        debug!(
            path = %path.display(),
            duration_us = start.elapsed().as_micros(),
            "Precompiled module loaded"
        );

        Ok(Self {
            module,
            content_hash,
            from_cache: true,
        })
    }

    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// This is primarily for testing purposes.
    #[instrument(skip(engine, wat))]
    pub fn from_wat(engine: &Engine, wat: &str) -> Result<Self, BridgeError> {
        let module = Module::new(engine, wat)
            .map_err(|e| BridgeError::compilation_failed(format!("WAT compilation failed: {e}")))?;

        Ok(Self {
            module,
            content_hash: content_hash(wat.as_bytes()),
            from_cache: false,
        })
    }

    /// Serialize the compiled machine code.
    pub fn serialize(&self) -> Result<Vec<u8>, BridgeError> {
        self.module.serialize().map_err(|e| {
            BridgeError::compilation_failed(format!("Module serialization failed: {e}"))
        })
    }

    /// Get the content hash of the original Wasm bytes.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Whether this module was loaded from the compilation cache.
    pub fn is_from_cache(&self) -> bool {
        self.from_cache
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.module
    }

    /// Names of every exported function.
    pub fn exported_functions(&self) -> impl Iterator<Item = &str> {
        self.module
            .exports()
            .filter(|e| e.ty().func().is_some())
            .map(|e| e.name())
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(bytes: &[u8]) -> Result<(), BridgeError> {
        if bytes.len() < 8 {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: file too small",
            ));
        }

        if &bytes[0..4] != b"\0asm" {
            return Err(BridgeError::compilation_failed(
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("content_hash", &self.content_hash)
            .field("from_cache", &self.from_cache)
            .finish_non_exhaustive()
    }
}

/// Hex-encoded SHA-256 of the given bytes.
fn content_hash(bytes: &[u8]) -> String {
    hex(&Sha256::digest(bytes))
}

fn engine_fingerprint(engine: &Engine) -> u64 {
    let mut hasher = DefaultHasher::new();
    engine.precompile_compatibility_hash().hash(&mut hasher);
    hasher.finish()
}

/// Cache key covering the guest bytes and everything about the engine that
/// affects generated code.
fn cache_key(engine: &Engine, bytes: &[u8]) -> String {
    let mut h = Sha256::new();
    h.update(CACHE_KEY_VERSION);
    h.update(Sha256::digest(bytes));
    h.update(engine_fingerprint(engine).to_le_bytes());
    hex(&h.finalize())
}

fn hex(digest: &[u8]) -> String {
    let mut out = String::with_capacity(digest.len() * 2);
    for b in digest {
        let _ = write!(&mut out, "{b:02x}");
    }
    out
}

/// Write through a temp file and rename, so a concurrent reader in another
/// process never sees a half-written artifact.
fn write_cache_file_atomic(cache_path: &Path, bytes: &[u8]) -> Result<(), BridgeError> {
    static CACHE_WRITE_SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let sequence = CACHE_WRITE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let tmp_path =
        cache_path.with_extension(format!("cwasm.tmp-{}-{sequence}", std::process::id()));

    std::fs::write(&tmp_path, bytes).map_err(|e| BridgeError::cache_io(&tmp_path, e))?;

    match std::fs::rename(&tmp_path, cache_path) {
        Ok(()) => Ok(()),
        // Another process won the race on a platform without atomic replace.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            let _ = std::fs::remove_file(&tmp_path);
            Ok(())
        }
        Err(e) => {
            let _ = std::fs::remove_file(&tmp_path);
            Err(BridgeError::cache_io(cache_path, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WasmEngine;
    use tagbridge_common::EngineConfig;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    fn engine() -> WasmEngine {
        WasmEngine::new(&EngineConfig::default()).unwrap()
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(CompiledModule::validate_wasm_header(MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = CompiledModule::validate_wasm_header(&[0x00, 0x61]);
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = CompiledModule::validate_wasm_header(bad_wasm);
        assert!(matches!(
            result,
            Err(BridgeError::CompilationFailed { .. })
        ));
    }

    #[test]
    fn test_content_hash() {
        let hash1 = content_hash(b"hello");
        let hash2 = content_hash(b"hello");
        let hash3 = content_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64);
    }

    #[test]
    fn test_module_compilation() {
        let engine = engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();

        assert!(!module.is_from_cache());
        assert_eq!(module.content_hash(), content_hash(MINIMAL_WASM));
    }

    #[test]
    fn test_malformed_module_fails() {
        let engine = engine();
        let mut bytes = MINIMAL_WASM.to_vec();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff]);

        let result = CompiledModule::from_bytes(engine.inner(), &bytes);
        assert!(matches!(
            result,
            Err(BridgeError::CompilationFailed { .. })
        ));
    }

    #[test]
    fn test_cached_compilation_round_trip() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();

        let first = CompiledModule::from_bytes_cached(engine.inner(), MINIMAL_WASM, dir.path())
            .unwrap();
        assert!(!first.is_from_cache());

        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);

        let second = CompiledModule::from_bytes_cached(engine.inner(), MINIMAL_WASM, dir.path())
            .unwrap();
        assert!(second.is_from_cache());
        assert_eq!(first.content_hash(), second.content_hash());
    }

    #[test]
    fn test_stale_cache_entry_is_replaced() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();

        let key = cache_key(engine.inner(), MINIMAL_WASM);
        let path = dir.path().join(format!("{key}.cwasm"));
        std::fs::write(&path, b"not machine code").unwrap();

        let module = CompiledModule::from_bytes_cached(engine.inner(), MINIMAL_WASM, dir.path())
            .unwrap();
        assert!(!module.is_from_cache());
        assert_ne!(std::fs::read(&path).unwrap(), b"not machine code");
    }

    #[test]
    fn test_unusable_cache_dir_is_cache_io() {
        let engine = engine();
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let result =
            CompiledModule::from_bytes_cached(engine.inner(), MINIMAL_WASM, &blocker.join("sub"));
        assert!(matches!(result, Err(BridgeError::CacheIo { .. })));
    }

    #[test]
    fn test_module_debug() {
        let engine = engine();
        let module = CompiledModule::from_bytes(engine.inner(), MINIMAL_WASM).unwrap();

        let debug_str = format!("{module:?}");
        assert!(debug_str.contains("CompiledModule"));
        assert!(debug_str.contains("content_hash"));
    }
}
