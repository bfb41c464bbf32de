use std::ffi::{c_char, c_void, CString};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;
use once_cell::sync::OnceCell;
use tracing::{debug, info};

use crate::config::BridgeOptions;
use crate::error::BridgeError;

pub type ConfigInitFn = unsafe extern "C" fn(config_path: *const c_char);
/// Returns a status code; non-negative means the format is playable.
pub type FormatIsSupportedFn =
    unsafe extern "C" fn(channels: u16, sample_rate: u32, bits_per_sample: u16) -> i32;
pub type GetPeriodFramesFn = unsafe extern "C" fn() -> u32;
pub type GetPeriodHnsFn = unsafe extern "C" fn() -> i64;
pub type ClientCreateFn = unsafe extern "C" fn(title: *const c_char) -> *mut c_void;
pub type ClientControlFn = unsafe extern "C" fn(client: *mut c_void);
pub type ClientGetBufferFn = unsafe extern "C" fn(client: *mut c_void, frames: u32) -> *mut u8;
pub type ClientReleaseBufferFn = unsafe extern "C" fn(client: *mut c_void, frames: u32);
/// Invoked from the library's worker thread after it consumed frames.
pub type UpdateCallback = unsafe extern "C" fn(user: *mut c_void, frames_consumed: u32);
pub type ClientUpdateCallbackFn =
    unsafe extern "C" fn(client: *mut c_void, callback: Option<UpdateCallback>, user: *mut c_void);

/// Resolved exports of the sound client library.
#[derive(Clone, Copy)]
pub struct BridgeEntryPoints {
    pub config_init: ConfigInitFn,
    pub format_is_supported: FormatIsSupportedFn,
    pub get_period_frames: GetPeriodFramesFn,
    pub get_period_hns: GetPeriodHnsFn,
    pub client_create: ClientCreateFn,
    pub client_start: ClientControlFn,
    pub client_stop: ClientControlFn,
    pub client_destroy: ClientControlFn,
    pub client_get_buffer: ClientGetBufferFn,
    pub client_release_buffer: ClientReleaseBufferFn,
    pub client_update_callback: ClientUpdateCallbackFn,
}

impl fmt::Debug for BridgeEntryPoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeEntryPoints").finish_non_exhaustive()
    }
}

fn symbol<T: Copy>(library: &Library, path: &Path, name: &'static str) -> Result<T, BridgeError> {
    let resolved = unsafe { library.get::<T>(name.as_bytes()) }
        .map_err(|_| BridgeError::missing_entry(path.to_path_buf(), name))?;
    debug!(symbol = name, "resolved sound client entry point");
    Ok(*resolved)
}

impl BridgeEntryPoints {
    fn resolve(library: &Library, path: &Path) -> Result<Self, BridgeError> {
        Ok(Self {
            config_init: symbol(library, path, "BmswConfigInit")?,
            format_is_supported: symbol(library, path, "BmswFormatIsSupported")?,
            get_period_frames: symbol(library, path, "BmswGetPeriodFrames")?,
            get_period_hns: symbol(library, path, "BmswGetPeriodHns")?,
            client_create: symbol(library, path, "BmswClientCreate")?,
            client_start: symbol(library, path, "BmswClientStart")?,
            client_stop: symbol(library, path, "BmswClientStop")?,
            client_destroy: symbol(library, path, "BmswClientDestroy")?,
            client_get_buffer: symbol(library, path, "BmswClientGetBuffer")?,
            client_release_buffer: symbol(library, path, "BmswClientReleaseBuffer")?,
            client_update_callback: symbol(library, path, "BmswClientUpdateCallback")?,
        })
    }
}

/// The loaded sound client library. Never unloaded once shared.
pub struct BridgeLibrary {
    path: Option<PathBuf>,
    entries: BridgeEntryPoints,
    _library: Option<Library>,
}

static SHARED: OnceCell<Arc<BridgeLibrary>> = OnceCell::new();

impl BridgeLibrary {
    /// Loads the library at `path` and resolves every entry point.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BridgeError::MissingLibrary(path.to_path_buf()));
        }

        let library = unsafe { Library::new(path) }.map_err(|source| BridgeError::LibraryLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let entries = BridgeEntryPoints::resolve(&library, path)?;
        info!(path = %path.display(), "loaded sound client library");

        Ok(Self {
            path: Some(path.to_path_buf()),
            entries,
            _library: Some(library),
        })
    }

    /// Wraps entry points linked into the current process.
    pub fn from_entry_points(entries: BridgeEntryPoints) -> Self {
        Self {
            path: None,
            entries,
            _library: None,
        }
    }

    /// Loads the library described by `options` the first time it is called
    /// in this process, passing the config path to the library once. Later
    /// calls return the same instance. A failed load leaves nothing cached.
    pub fn shared(options: &BridgeOptions) -> Result<Arc<Self>, BridgeError> {
        Self::get_or_load(&SHARED, options, |path| Self::load(path))
    }

    fn get_or_load(
        cell: &OnceCell<Arc<Self>>,
        options: &BridgeOptions,
        load: impl FnOnce(PathBuf) -> Result<Self, BridgeError>,
    ) -> Result<Arc<Self>, BridgeError> {
        cell.get_or_try_init(|| {
            let library = load(options.library_path()?)?;
            library.init_config(&options.config_path);
            Ok::<_, BridgeError>(Arc::new(library))
        })
        .cloned()
    }

    pub fn init_config(&self, config_path: &Path) {
        let config = c_string_lossy(&config_path.to_string_lossy());
        unsafe { (self.entries.config_init)(config.as_ptr()) };
        info!(config = %config_path.display(), "initialized sound client config");
    }

    pub fn entries(&self) -> &BridgeEntryPoints {
        &self.entries
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl fmt::Debug for BridgeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeLibrary")
            .field("path", &self.path)
            .finish()
    }
}

/// Builds a C string, dropping interior NULs rather than failing.
pub(crate) fn c_string_lossy(value: &str) -> CString {
    let bytes: Vec<u8> = value.bytes().filter(|&b| b != 0).collect();
    CString::new(bytes).unwrap_or_default()
}
