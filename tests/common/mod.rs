//! Shared fixtures for the facade tests.
//!
//! [`FAKE_TAGLIB`] is a stand-in guest exporting the same functions as the
//! real TagLib build. It resolves the file through its single WASI preopen
//! (fd 3) by base name:
//!
//! - `taglib_file_tags`: the file's bytes are the one tag row; an empty file
//!   yields an empty table, an unopenable file yields null
//! - `taglib_file_write_tags`: truncates the file and writes the first row;
//!   an empty table is refused
//! - `taglib_file_audioproperties`: fixed `{1000, 2, 44100, 128}` plus one
//!   image descriptor row
//! - `taglib_file_read_image`: index 0 is a 4-byte PNG signature, index 1
//!   is a zero-length image, anything else is null
//! - `taglib_file_write_image`: truncates the file and writes the MIME type
//!   it was given

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use tagbridge::{GuestSource, RuntimeConfig, TagLib};

pub const FAKE_TAGLIB: &str = r#"
(module
  (import "wasi_snapshot_preview1" "path_open"
    (func $path_open (param i32 i32 i32 i32 i32 i64 i64 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_read"
    (func $fd_read (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_write"
    (func $fd_write (param i32 i32 i32 i32) (result i32)))
  (import "wasi_snapshot_preview1" "fd_close"
    (func $fd_close (param i32) (result i32)))
  (import "env" "__cxa_allocate_exception" (func (param i32) (result i32)))
  (import "env" "__cxa_throw" (func (param i32 i32 i32)))

  (memory (export "memory") 2)

  ;; properties struct at 256, trailer table at 300, descriptor row at 320
  (data (i32.const 256) "\e8\03\00\00\02\00\00\00\44\ac\00\00\80\00\00\00\2c\01\00\00")
  (data (i32.const 300) "\40\01\00\00\00\00\00\00")
  (data (i32.const 320) "Front Cover\09cover\09image/png\00")
  ;; image 0 descriptor at 400 -> 4 bytes at 408; image 1 descriptor at 416 is {0, 0}
  (data (i32.const 400) "\04\00\00\00\98\01\00\00\89PNG")

  ;; scratch: iovec at 512, byte count at 520, opened fd at 524
  (global $next (mut i32) (i32.const 1024))

  (func $malloc (export "malloc") (param $size i32) (result i32)
    (local $ptr i32)
    (local.set $ptr (global.get $next))
    (global.set $next
      (i32.and
        (i32.add (i32.add (global.get $next) (local.get $size)) (i32.const 3))
        (i32.const -4)))
    (local.get $ptr))

  (func (export "_initialize"))
  (func (export "__wasm_call_dtors"))

  (func $strlen (param $p i32) (result i32)
    (local $n i32)
    (block $done
      (loop $next
        (br_if $done (i32.eqz (i32.load8_u (i32.add (local.get $p) (local.get $n)))))
        (local.set $n (i32.add (local.get $n) (i32.const 1)))
        (br $next)))
    (local.get $n))

  (func $basename (param $p i32) (result i32)
    (local $i i32) (local $base i32) (local $c i32)
    (local.set $base (local.get $p))
    (block $done
      (loop $next
        (local.set $c (i32.load8_u (i32.add (local.get $p) (local.get $i))))
        (br_if $done (i32.eqz (local.get $c)))
        (local.set $i (i32.add (local.get $i) (i32.const 1)))
        (if (i32.eq (local.get $c) (i32.const 47))
          (then (local.set $base (i32.add (local.get $p) (local.get $i)))))
        (br $next)))
    (local.get $base))

  ;; fd of the opened file, or -1
  (func $open (param $path i32) (param $oflags i32) (param $rights i64) (result i32)
    (local $base i32)
    (local.set $base (call $basename (local.get $path)))
    (if (call $path_open
          (i32.const 3) (i32.const 0)
          (local.get $base) (call $strlen (local.get $base))
          (local.get $oflags) (local.get $rights) (i64.const 0) (i32.const 0)
          (i32.const 524))
      (then (return (i32.const -1))))
    (i32.load (i32.const 524)))

  (func $open_read (param $path i32) (result i32)
    (call $open (local.get $path) (i32.const 0) (i64.const 2)))

  ;; O_CREAT | O_TRUNC with FD_WRITE
  (func $open_write (param $path i32) (result i32)
    (call $open (local.get $path) (i32.const 9) (i64.const 64)))

  (func $read_into (param $fd i32) (param $buf i32) (param $cap i32) (result i32)
    (i32.store (i32.const 512) (local.get $buf))
    (i32.store (i32.const 516) (local.get $cap))
    (if (call $fd_read (local.get $fd) (i32.const 512) (i32.const 1) (i32.const 520))
      (then (return (i32.const 0))))
    (i32.load (i32.const 520)))

  (func $write_from (param $fd i32) (param $buf i32) (param $len i32)
    (i32.store (i32.const 512) (local.get $buf))
    (i32.store (i32.const 516) (local.get $len))
    (drop (call $fd_write (local.get $fd) (i32.const 512) (i32.const 1) (i32.const 520))))

  (func (export "taglib_file_tags") (param $path i32) (result i32)
    (local $fd i32) (local $buf i32) (local $n i32) (local $table i32)
    (local.set $fd (call $open_read (local.get $path)))
    (if (i32.lt_s (local.get $fd) (i32.const 0)) (then (return (i32.const 0))))
    (local.set $buf (call $malloc (i32.const 4096)))
    (local.set $n (call $read_into (local.get $fd) (local.get $buf) (i32.const 4095)))
    (drop (call $fd_close (local.get $fd)))
    (i32.store8 (i32.add (local.get $buf) (local.get $n)) (i32.const 0))
    (local.set $table (call $malloc (i32.const 8)))
    (if (i32.eqz (local.get $n))
      (then
        (i32.store (local.get $table) (i32.const 0))
        (return (local.get $table))))
    (i32.store (local.get $table) (local.get $buf))
    (i32.store offset=4 (local.get $table) (i32.const 0))
    (local.get $table))

  (func (export "taglib_file_write_tags") (param $path i32) (param $rows i32) (param $opts i32) (result i32)
    (local $fd i32) (local $row i32)
    (local.set $row (i32.load (local.get $rows)))
    (if (i32.eqz (local.get $row)) (then (return (i32.const 0))))
    (local.set $fd (call $open_write (local.get $path)))
    (if (i32.lt_s (local.get $fd) (i32.const 0)) (then (return (i32.const 0))))
    (call $write_from (local.get $fd) (local.get $row) (call $strlen (local.get $row)))
    (drop (call $fd_close (local.get $fd)))
    (i32.const 1))

  (func (export "taglib_file_audioproperties") (param $path i32) (result i32)
    (local $fd i32)
    (local.set $fd (call $open_read (local.get $path)))
    (if (i32.lt_s (local.get $fd) (i32.const 0)) (then (return (i32.const 0))))
    (drop (call $fd_close (local.get $fd)))
    (i32.const 256))

  (func (export "taglib_file_read_image") (param $path i32) (param $index i32) (result i32)
    (local $fd i32)
    (local.set $fd (call $open_read (local.get $path)))
    (if (i32.lt_s (local.get $fd) (i32.const 0)) (then (return (i32.const 0))))
    (drop (call $fd_close (local.get $fd)))
    (if (i32.eqz (local.get $index)) (then (return (i32.const 400))))
    (if (i32.eq (local.get $index) (i32.const 1)) (then (return (i32.const 416))))
    (i32.const 0))

  (func (export "taglib_file_write_image")
    (param $path i32) (param $data i32) (param $len i32) (param $index i32)
    (param $type i32) (param $desc i32) (param $mime i32) (result i32)
    (local $fd i32)
    (local.set $fd (call $open_write (local.get $path)))
    (if (i32.lt_s (local.get $fd) (i32.const 0)) (then (return (i32.const 0))))
    (call $write_from (local.get $fd) (local.get $mime) (call $strlen (local.get $mime)))
    (drop (call $fd_close (local.get $fd)))
    (i32.const 1))
)
"#;

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,tagbridge=debug".into()),
        )
        .try_init();
}

/// Fake guest compiled to binary Wasm.
pub fn fake_guest_bytes() -> Vec<u8> {
    wat::parse_str(FAKE_TAGLIB).expect("fake guest parses")
}

/// Runtime config that keeps the compilation cache out of shared temp.
pub fn config_with_cache(cache_dir: &Path) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.engine.cache_dir = Some(cache_dir.to_path_buf());
    config
}

/// Handle over the fake guest, with its cache under `cache_dir`.
pub fn fake_taglib(cache_dir: &Path) -> TagLib {
    init_tracing();
    TagLib::new(
        GuestSource::Bytes(fake_guest_bytes()),
        config_with_cache(cache_dir),
    )
}

/// Create `name` in `dir` with `contents` and return its path.
pub fn audio_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("write fixture");
    path
}
