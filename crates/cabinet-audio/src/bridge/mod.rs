//! Backend forwarding the audio client contract to an external sound client
//! library that runs its own processing thread.
//!
//! The library dictates timing: its period and frames-per-cycle are queried
//! at construction and override whatever the host asked for. Each released
//! buffer is handed to the library first and only then is the host's event
//! signaled, so the host never races the previous commit.

mod library;

pub use library::{
    BridgeEntryPoints, BridgeLibrary, ClientControlFn, ClientCreateFn, ClientGetBufferFn,
    ClientReleaseBufferFn, ClientUpdateCallbackFn, ConfigInitFn, FormatIsSupportedFn,
    GetPeriodFramesFn, GetPeriodHnsFn, UpdateCallback,
};

use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::backend::{signal_release, swap_event, AudioBackend, Result};
use crate::config::BridgeOptions;
use crate::error::ClientError;
use crate::event::EventHandle;
use crate::fatal::fatal;
use crate::format::{StreamFormat, WaveFormatEx, WaveFormatExtensible};
use crate::hresult::HResult;
use crate::stream::{BufferFlags, DevicePeriod, InitializeParams, ReferenceTime, ShareMode};

use library::c_string_lossy;

const NAME: &str = "bridge";
const FATAL_MODULE: &str = "audio::bridge";

/// Owned pointer to a live client inside the library.
struct ClientHandle(NonNull<c_void>);

// The client is only driven from the host's render thread, one call at a
// time; the library synchronizes with its own worker internally.
unsafe impl Send for ClientHandle {}

impl ClientHandle {
    fn as_ptr(&self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Storage handed out by the last `buffer` call, until its release.
struct PendingBuffer {
    data: NonNull<u8>,
    frames: u32,
}

// Only touched from the render thread between `buffer` and `release_buffer`.
unsafe impl Send for PendingBuffer {}

/// Frame accounting shared with the library's worker thread.
#[derive(Debug, Default)]
struct CycleProgress {
    released: AtomicU64,
    consumed: AtomicU64,
}

impl CycleProgress {
    fn padding(&self) -> u32 {
        let released = self.released.load(Ordering::Acquire);
        let consumed = self.consumed.load(Ordering::Acquire);
        released.saturating_sub(consumed).min(u64::from(u32::MAX)) as u32
    }
}

unsafe extern "C" fn on_client_update(user: *mut c_void, frames_consumed: u32) {
    if let Some(progress) = (user as *const CycleProgress).as_ref() {
        progress
            .consumed
            .fetch_add(u64::from(frames_consumed), Ordering::AcqRel);
    }
}

pub struct BridgeBackend {
    library: Arc<BridgeLibrary>,
    format: Arc<StreamFormat>,
    title: String,
    client: Option<ClientHandle>,
    event: Option<EventHandle>,
    period: ReferenceTime,
    frames_per_cycle: u32,
    negotiated: Option<WaveFormatEx>,
    pending: Option<PendingBuffer>,
    progress: Arc<CycleProgress>,
}

impl BridgeBackend {
    /// Creates a backend on an already loaded library and caches the
    /// library's period and frames-per-cycle.
    pub fn new(library: Arc<BridgeLibrary>, format: Arc<StreamFormat>, title: &str) -> Self {
        let entries = *library.entries();
        let period = unsafe { (entries.get_period_hns)() };
        let frames_per_cycle = unsafe { (entries.get_period_frames)() };
        info!(
            backend = NAME,
            library = ?library.path(),
            period,
            frames_per_cycle,
            title,
            "created bridge backend"
        );
        Self {
            library,
            format,
            title: title.to_owned(),
            client: None,
            event: None,
            period,
            frames_per_cycle,
            negotiated: None,
            pending: None,
            progress: Arc::new(CycleProgress::default()),
        }
    }

    /// Loads the process-wide library and creates a backend on it. A missing
    /// library or entry point is fatal.
    pub fn open(options: &BridgeOptions, format: Arc<StreamFormat>, title: &str) -> Self {
        let library = BridgeLibrary::shared(options).unwrap_or_else(|err| fatal(FATAL_MODULE, err));
        Self::new(library, format, title)
    }

    /// The format accepted by the most recent successful negotiation.
    pub fn negotiated_format(&self) -> Option<WaveFormatEx> {
        self.negotiated
    }

    pub fn is_initialized(&self) -> bool {
        self.client.is_some()
    }

    fn client(&self) -> Result<*mut c_void> {
        self.client
            .as_ref()
            .map(ClientHandle::as_ptr)
            .ok_or(ClientError::NotInitialized)
    }

    /// Bytes per frame of the negotiated format, or of the canonical one
    /// when nothing was negotiated.
    fn block_align(&self) -> u16 {
        match self.negotiated {
            Some(format) => format.block_align,
            None => self.format.block_align(),
        }
    }

    fn refresh_period(&mut self) {
        let entries = self.library.entries();
        self.period = unsafe { (entries.get_period_hns)() };
        self.frames_per_cycle = unsafe { (entries.get_period_frames)() };
        debug!(
            backend = NAME,
            period = self.period,
            frames_per_cycle = self.frames_per_cycle,
            "refreshed period after negotiation"
        );
    }
}

impl AudioBackend for BridgeBackend {
    fn name(&self) -> &'static str {
        NAME
    }

    fn format(&self) -> &StreamFormat {
        &self.format
    }

    fn is_format_supported(
        &mut self,
        share_mode: ShareMode,
        format: &WaveFormatEx,
    ) -> Result<Option<WaveFormatExtensible>> {
        if share_mode != ShareMode::Exclusive {
            debug!(backend = NAME, "rejected shared-mode negotiation");
            return Err(ClientError::UnsupportedFormat);
        }

        let channels = format.channels;
        let rate = format.samples_per_sec;
        let bits = format.bits_per_sample;
        let status =
            HResult(unsafe { (self.library.entries().format_is_supported)(channels, rate, bits) });
        if !status.is_ok() {
            debug!(backend = NAME, channels, rate, bits, %status, "library rejected format");
            return Err(ClientError::UnsupportedFormat);
        }

        self.negotiated = Some(*format);
        if self.client.is_none() {
            self.refresh_period();
        }
        Ok(None)
    }

    fn device_period(&self) -> Result<DevicePeriod> {
        Ok(DevicePeriod::uniform(self.period))
    }

    fn initialize(&mut self, params: &mut InitializeParams, _format: &WaveFormatEx) -> Result<()> {
        info!(backend = NAME, "initialize");
        if self.client.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }

        let entries = *self.library.entries();
        let title = c_string_lossy(&self.title);
        let raw = unsafe { (entries.client_create)(title.as_ptr()) };
        let Some(client) = NonNull::new(raw) else {
            fatal(
                FATAL_MODULE,
                format!("sound client creation failed for '{}'", self.title),
            );
        };
        let client = ClientHandle(client);

        let user = Arc::as_ptr(&self.progress) as *mut c_void;
        unsafe { (entries.client_update_callback)(client.as_ptr(), Some(on_client_update), user) };
        self.client = Some(client);

        params.downgrade_to_shared();
        params.buffer_duration = self.period;
        params.periodicity = self.period;
        info!(
            backend = NAME,
            period = self.period,
            frames_per_cycle = self.frames_per_cycle,
            "sound client created"
        );
        Ok(())
    }

    fn set_event_handle(&mut self, event: EventHandle) -> Result<EventHandle> {
        swap_event(NAME, &mut self.event, event)
    }

    fn start(&mut self) -> Result<()> {
        let client = self.client()?;
        unsafe { (self.library.entries().client_start)(client) };
        info!(backend = NAME, "start");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let client = self.client()?;
        unsafe { (self.library.entries().client_stop)(client) };
        info!(backend = NAME, "stop");
        Ok(())
    }

    fn buffer_size(&self) -> Result<u32> {
        Ok(self.frames_per_cycle)
    }

    fn buffer(&mut self, frames: u32) -> Result<NonNull<u8>> {
        let client = self.client()?;
        let data = unsafe { (self.library.entries().client_get_buffer)(client, frames) };
        let data = NonNull::new(data).ok_or_else(|| {
            warn!(backend = NAME, frames, "sound client returned no buffer");
            ClientError::BufferError
        })?;
        self.pending = Some(PendingBuffer { data, frames });
        Ok(data)
    }

    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<()> {
        let client = self.client()?;
        let pending = self.pending.take();
        if flags.contains(BufferFlags::SILENT) {
            if let Some(pending) = pending {
                let frames = frames.min(pending.frames) as usize;
                let len = frames * usize::from(self.block_align());
                unsafe { std::ptr::write_bytes(pending.data.as_ptr(), 0, len) };
            }
        }
        unsafe { (self.library.entries().client_release_buffer)(client, frames) };
        self.progress
            .released
            .fetch_add(u64::from(frames), Ordering::AcqRel);
        signal_release(NAME, self.event.as_ref());
        Ok(())
    }

    fn current_padding(&self) -> Result<u32> {
        Ok(self.progress.padding())
    }

    fn stream_latency(&self) -> Result<ReferenceTime> {
        Ok(self.period)
    }
}

impl Drop for BridgeBackend {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            unsafe { (self.library.entries().client_destroy)(client.as_ptr()) };
            info!(backend = NAME, "sound client destroyed");
        }
    }
}
