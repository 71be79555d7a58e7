//! Read and write audio metadata through a sandboxed WebAssembly build of
//! TagLib.
//!
//! [`TagLib`] is the entry point. Every operation gets a fresh guest
//! instance that can see only the directory holding the target file, and
//! that instance is torn down before the operation returns:
//!
//! ```no_run
//! use tagbridge::{BridgeError, GuestSource, RuntimeConfig, TagLib, WriteOptions, tags};
//!
//! # fn main() -> Result<(), BridgeError> {
//! let taglib = TagLib::new(
//!     GuestSource::File("taglib.wasm".into()),
//!     RuntimeConfig::default(),
//! );
//!
//! let mut found = taglib.read_tags("song.flac")?;
//! found.insert(tags::GENRE.to_string(), vec!["Ambient".to_string()]);
//! taglib.write_tags("song.flac", &found, WriteOptions::CLEAR)?;
//! # Ok(())
//! # }
//! ```

pub mod bootstrap;
pub mod deadline;
pub mod images;
pub mod properties;
pub mod tags;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument};

use tagbridge_common::ConfigFile;
use tagbridge_core::{
    EncodedValue, GuestRuntime, ModuleCache, ModuleInstance, Mount, MountMode, ResultKind,
    mount::{guest_path, resolve_file},
    with_instance,
};

pub use bootstrap::GuestSource;
pub use tagbridge_common::{BridgeError, RuntimeConfig};
pub use properties::{ImageDesc, Properties};
pub use tags::{Tags, WriteOptions};

const TAGS_EXPORT: &str = "taglib_file_tags";
const WRITE_TAGS_EXPORT: &str = "taglib_file_write_tags";
const PROPERTIES_EXPORT: &str = "taglib_file_audioproperties";
const READ_IMAGE_EXPORT: &str = "taglib_file_read_image";
const WRITE_IMAGE_EXPORT: &str = "taglib_file_write_image";

/// Handle to the guest runtime.
///
/// Cheap to clone; clones share one compiled guest. The guest is compiled
/// on first use (or by [`TagLib::init`]), exactly once, and a failed build
/// is reported to every later caller without retrying.
#[derive(Clone)]
pub struct TagLib {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: ModuleCache<GuestRuntime>,
    shut_down: AtomicBool,
    timeout: Duration,
}

impl TagLib {
    /// Create a handle. Nothing is loaded until the first operation.
    pub fn new(source: GuestSource, config: RuntimeConfig) -> Self {
        let timeout = config.execution.timeout();
        let runtime = ModuleCache::new(move || bootstrap::build_runtime(source, &config));
        Self {
            inner: Arc::new(Inner {
                runtime,
                shut_down: AtomicBool::new(false),
                timeout,
            }),
        }
    }

    /// Create a handle for the guest at `config.guest.binary_path`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidConfig`] if no binary path is configured.
    pub fn from_config(config: RuntimeConfig) -> Result<Self, BridgeError> {
        let path = config
            .guest
            .binary_path
            .clone()
            .ok_or_else(|| BridgeError::invalid_config("guest.binary_path is not set"))?;
        Ok(Self::new(GuestSource::File(path), config))
    }

    /// Create a handle from a TOML configuration file.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidConfig`] if the file cannot be read or parsed,
    /// or names no guest binary.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let config = ConfigFile::from_file(path)
            .map_err(|e| BridgeError::invalid_config(e.to_string()))?
            .into_runtime();
        Self::from_config(config)
    }

    /// Build the guest runtime now instead of on first use.
    ///
    /// # Errors
    ///
    /// [`BridgeError::BuildFailed`] if the guest cannot be loaded, compiled
    /// or linked.
    pub fn init(&self) -> Result<(), BridgeError> {
        self.runtime().map(|_| ())
    }

    /// Reject every later operation with [`BridgeError::ShutDown`].
    ///
    /// Operations already running finish normally.
    pub fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            info!("TagLib handle shut down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Configured deadline for [`TagLib::run_with_deadline`] callers.
    pub fn default_timeout(&self) -> Duration {
        self.inner.timeout
    }

    /// Read all tags from the file at `path`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidFile`] if the guest cannot read the file.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn read_tags(&self, path: impl AsRef<Path>) -> Result<Tags, BridgeError> {
        let path = &resolve_file(path.as_ref())?;
        let rows = self.with_file(path, MountMode::ReadOnly, |instance, file| {
            instance
                .invoke(TAGS_EXPORT, &[EncodedValue::String(file)], ResultKind::StringArray)?
                .into_string_array()
        })?;

        let rows = rows.ok_or_else(|| invalid_file(path))?;
        let tags = tags::decode_rows(rows);
        debug!(keys = tags.len(), "Read tags");
        Ok(tags)
    }

    /// Write `tags` to the file at `path`.
    ///
    /// Keys mapped to no values, or only empty values, are removed. With
    /// [`WriteOptions::CLEAR`], tags not in `tags` are removed too.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SaveFailed`] if the guest cannot update the file.
    #[instrument(skip(self, path, tags), fields(path = %path.as_ref().display(), keys = tags.len()))]
    pub fn write_tags(
        &self,
        path: impl AsRef<Path>,
        tags: &Tags,
        options: WriteOptions,
    ) -> Result<(), BridgeError> {
        let path = &resolve_file(path.as_ref())?;
        let rows = tags::encode_rows(tags);

        let saved = self.with_file(path, MountMode::ReadWrite, |instance, file| {
            instance
                .invoke(
                    WRITE_TAGS_EXPORT,
                    &[
                        EncodedValue::String(file),
                        EncodedValue::StringArray(&rows),
                        EncodedValue::UInt8(options.bits()),
                    ],
                    ResultKind::Bool,
                )?
                .into_bool()
        })?;

        if saved { Ok(()) } else { Err(save_failed(path)) }
    }

    /// Read the audio properties and embedded image list of the file at
    /// `path`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::InvalidFile`] if the guest cannot read the file.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn read_properties(&self, path: impl AsRef<Path>) -> Result<Properties, BridgeError> {
        let path = &resolve_file(path.as_ref())?;
        let raw = self.with_file(path, MountMode::ReadOnly, |instance, file| {
            instance
                .invoke(
                    PROPERTIES_EXPORT,
                    &[EncodedValue::String(file)],
                    ResultKind::FixedStruct {
                        fields: properties::PROPERTY_FIELDS,
                    },
                )?
                .into_fixed_struct()
        })?;

        raw.map(Properties::from_struct)
            .ok_or_else(|| invalid_file(path))
    }

    /// Read the first embedded image. `None` if the file has none.
    pub fn read_image(&self, path: impl AsRef<Path>) -> Result<Option<Vec<u8>>, BridgeError> {
        self.read_image_at(path, 0)
    }

    /// Read the embedded image at `index`. `None` if there is no such image.
    #[instrument(skip(self, path), fields(path = %path.as_ref().display()))]
    pub fn read_image_at(
        &self,
        path: impl AsRef<Path>,
        index: usize,
    ) -> Result<Option<Vec<u8>>, BridgeError> {
        let path = &resolve_file(path.as_ref())?;
        let Ok(index) = i32::try_from(index) else {
            return Ok(None);
        };

        self.with_file(path, MountMode::ReadOnly, |instance, file| {
            instance
                .invoke(
                    READ_IMAGE_EXPORT,
                    &[EncodedValue::String(file), EncodedValue::Int(index)],
                    ResultKind::ByteBuffer,
                )?
                .into_bytes()
        })
    }

    /// Replace the first embedded image with `data` as the front cover.
    /// Empty `data` removes it.
    pub fn write_image(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<(), BridgeError> {
        self.write_image_at(path, data, 0, &ImageDesc::front_cover())
    }

    /// Write `data` as the embedded image at `index`. Empty `data` removes
    /// the image at `index`.
    ///
    /// An empty `desc.mime_type` is detected from the data.
    ///
    /// # Errors
    ///
    /// [`BridgeError::SaveFailed`] if the guest cannot update the file.
    #[instrument(skip(self, path, data, desc), fields(path = %path.as_ref().display(), bytes = data.len()))]
    pub fn write_image_at(
        &self,
        path: impl AsRef<Path>,
        data: &[u8],
        index: usize,
        desc: &ImageDesc,
    ) -> Result<(), BridgeError> {
        let path = &resolve_file(path.as_ref())?;
        let length = i32::try_from(data.len())
            .map_err(|_| BridgeError::invalid_config("image larger than 2 GiB"))?;
        let index = i32::try_from(index)
            .map_err(|_| BridgeError::invalid_config("image index out of range"))?;

        let mime = match desc.mime_type.as_str() {
            "" if data.is_empty() => "",
            "" => images::detect_mime(data),
            given => given,
        };

        let saved = self.with_file(path, MountMode::ReadWrite, |instance, file| {
            instance
                .invoke(
                    WRITE_IMAGE_EXPORT,
                    &[
                        EncodedValue::String(file),
                        EncodedValue::ByteBuffer(data),
                        EncodedValue::Int(length),
                        EncodedValue::Int(index),
                        EncodedValue::String(&desc.picture_type),
                        EncodedValue::String(&desc.description),
                        EncodedValue::String(mime),
                    ],
                    ResultKind::Bool,
                )?
                .into_bool()
        })?;

        if saved { Ok(()) } else { Err(save_failed(path)) }
    }

    /// Run `op` on tokio's blocking pool, giving up after `timeout`.
    ///
    /// Timing out does not stop `op`; see [`deadline::run_blocking`].
    pub async fn run_with_deadline<T, F>(&self, timeout: Duration, op: F) -> Result<T, BridgeError>
    where
        F: FnOnce(&TagLib) -> Result<T, BridgeError> + Send + 'static,
        T: Send + 'static,
    {
        let taglib = self.clone();
        deadline::run_blocking(timeout, move || op(&taglib)).await
    }

    fn runtime(&self) -> Result<Arc<GuestRuntime>, BridgeError> {
        if self.is_shut_down() {
            return Err(BridgeError::ShutDown);
        }
        self.inner.runtime.acquire()
    }

    /// Mount the directory containing `path` and run `op` against a fresh
    /// instance, passing the guest-visible path of the file.
    ///
    /// `path` must already be absolute and cleaned by [`resolve_file`].
    fn with_file<T>(
        &self,
        path: &Path,
        mode: MountMode,
        op: impl FnOnce(&mut ModuleInstance, &str) -> Result<T, BridgeError>,
    ) -> Result<T, BridgeError> {
        let runtime = self.runtime()?;

        let directory = path
            .parent()
            .ok_or_else(|| invalid_file(path))?
            .to_path_buf();
        let file = guest_path(path);

        with_instance(&runtime, &Mount::new(directory, mode), |instance| {
            op(instance, &file)
        })
    }
}

impl std::fmt::Debug for TagLib {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagLib")
            .field("runtime", &self.inner.runtime)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn invalid_file(path: &Path) -> BridgeError {
    BridgeError::InvalidFile {
        path: PathBuf::from(path),
    }
}

fn save_failed(path: &Path) -> BridgeError {
    BridgeError::SaveFailed {
        path: PathBuf::from(path),
    }
}
