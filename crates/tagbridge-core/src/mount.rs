//! Filesystem mounts for guest instances.
//!
//! Each instance sees exactly one host directory, preopened at its own
//! slash-normalized path. Read operations mount it read-only; only
//! mutating operations get write access.

use std::io;
use std::path::{Component, Path, PathBuf};

use wasmtime_wasi::preview1::WasiP1Ctx;
use wasmtime_wasi::{DirPerms, FilePerms, WasiCtxBuilder};

use tagbridge_common::BridgeError;

/// Access granted to a mounted directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountMode {
    /// Directory listing and file reads only.
    ReadOnly,
    /// Full access, for operations that save files.
    ReadWrite,
}

impl MountMode {
    fn perms(self) -> (DirPerms, FilePerms) {
        match self {
            MountMode::ReadOnly => (DirPerms::READ, FilePerms::READ),
            MountMode::ReadWrite => (DirPerms::all(), FilePerms::all()),
        }
    }
}

/// One host directory to expose to one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    directory: PathBuf,
    mode: MountMode,
}

impl Mount {
    /// Mount `directory` with the given mode.
    pub fn new(directory: impl Into<PathBuf>, mode: MountMode) -> Self {
        Self {
            directory: directory.into(),
            mode,
        }
    }

    /// Read-only mount of `directory`.
    pub fn read_only(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, MountMode::ReadOnly)
    }

    /// Read-write mount of `directory`.
    pub fn read_write(directory: impl Into<PathBuf>) -> Self {
        Self::new(directory, MountMode::ReadWrite)
    }

    /// Host directory being mounted.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Access mode.
    pub fn mode(&self) -> MountMode {
        self.mode
    }

    /// Path at which the guest sees the directory.
    pub fn guest_path(&self) -> String {
        guest_path(&self.directory)
    }

    /// Build the WASI context for an instance using this mount.
    ///
    /// The guest gets no arguments, no environment, no inherited stdio and no
    /// other preopens.
    pub fn build_wasi(&self) -> Result<WasiP1Ctx, BridgeError> {
        let (dir_perms, file_perms) = self.mode.perms();

        let mut builder = WasiCtxBuilder::new();
        builder
            .preopened_dir(&self.directory, self.guest_path(), dir_perms, file_perms)
            .map_err(|e| {
                BridgeError::instantiate(format!(
                    "Failed to mount {}: {e}",
                    self.directory.display()
                ))
            })?;

        Ok(builder.build_p1())
    }
}

/// Guest-visible form of a host path. WASI paths are POSIX style on every
/// platform, so only the separator is translated.
pub fn guest_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if std::path::MAIN_SEPARATOR == '/' {
        raw.into_owned()
    } else {
        raw.replace(std::path::MAIN_SEPARATOR, "/")
    }
}

/// Absolute, lexically cleaned form of `path`.
///
/// Relative paths are joined to the current directory. `.` components are
/// dropped and `..` removes the preceding component without consulting the
/// filesystem; `..` at the root stays at the root.
pub fn resolve_file(path: &Path) -> io::Result<PathBuf> {
    let absolute = std::path::absolute(path)?;

    let mut cleaned = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(prefix) => cleaned.push(prefix.as_os_str()),
            Component::RootDir => cleaned.push(Component::RootDir),
            Component::CurDir => {}
            Component::ParentDir => {
                cleaned.pop();
            }
            Component::Normal(part) => cleaned.push(part),
        }
    }
    Ok(cleaned)
}
