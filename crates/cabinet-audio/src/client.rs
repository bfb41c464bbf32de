//! The emulated audio client handed to the host in place of a real device.
//!
//! Methods mirror the platform's audio client and render client one to one:
//! raw out-pointers, raw share mode and flag values, and [`HResult`] returns.
//! All device behavior is delegated to a boxed [`AudioBackend`]; this type only
//! validates arguments and tracks the session state machine.

use tracing::{debug, info};

use crate::backend::AudioBackend;
use crate::error::ClientError;
use crate::event::EventHandle;
use crate::format::{Guid, WaveFormatEx, WaveFormatExtensible};
use crate::hresult::HResult;
use crate::stream::{BufferFlags, InitializeParams, ReferenceTime, ShareMode, StreamFlags};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Initialized,
    Running,
    Stopped,
}

pub struct DummyAudioClient {
    backend: Box<dyn AudioBackend>,
    state: SessionState,
    requested_flags: StreamFlags,
    session: Option<InitializeParams>,
    event_set: bool,
    /// Mix formats handed out on hosts without a task allocator.
    #[cfg(not(windows))]
    mix_formats: Vec<Box<WaveFormatExtensible>>,
}

fn status(result: Result<(), ClientError>) -> HResult {
    match result {
        Ok(()) => HResult::S_OK,
        Err(err) => err.hresult(),
    }
}

/// Writes `value` through `out` after a null check.
unsafe fn write_out<T>(out: *mut T, value: Result<T, ClientError>) -> HResult {
    if out.is_null() {
        return HResult::E_POINTER;
    }
    match value {
        Ok(value) => {
            out.write_unaligned(value);
            HResult::S_OK
        }
        Err(err) => err.hresult(),
    }
}

impl DummyAudioClient {
    pub fn new(backend: Box<dyn AudioBackend>) -> Self {
        info!(backend = backend.name(), "created dummy audio client");
        Self {
            backend,
            state: SessionState::Uninitialized,
            requested_flags: StreamFlags::empty(),
            session: None,
            event_set: false,
            #[cfg(not(windows))]
            mix_formats: Vec::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Stream parameters after the backend adjusted them.
    pub fn session(&self) -> Option<&InitializeParams> {
        self.session.as_ref()
    }

    pub fn backend(&self) -> &dyn AudioBackend {
        self.backend.as_ref()
    }

    fn require_initialized(&self) -> Result<(), ClientError> {
        match self.state {
            SessionState::Uninitialized => Err(ClientError::NotInitialized),
            _ => Ok(()),
        }
    }

    /// # Safety
    /// `format` must be null or point to a readable `WaveFormatEx`; `session`
    /// must be null or point to a readable `Guid`.
    pub unsafe fn initialize(
        &mut self,
        share_mode: u32,
        stream_flags: u32,
        buffer_duration: ReferenceTime,
        periodicity: ReferenceTime,
        format: *const WaveFormatEx,
        session: *const Guid,
    ) -> HResult {
        if self.state != SessionState::Uninitialized {
            return HResult::AUDCLNT_E_ALREADY_INITIALIZED;
        }
        let Some(share_mode) = ShareMode::from_raw(share_mode) else {
            return HResult::E_INVALIDARG;
        };
        if format.is_null() {
            return HResult::E_POINTER;
        }
        let format = format.read_unaligned();
        let requested_flags = StreamFlags::from_bits_retain(stream_flags);

        let mut params = InitializeParams {
            share_mode,
            stream_flags: requested_flags,
            buffer_duration,
            periodicity,
            session: (!session.is_null()).then(|| session.read_unaligned()),
        };
        if let Err(err) = self.backend.initialize(&mut params, &format) {
            return err.hresult();
        }

        info!(
            backend = self.backend.name(),
            buffer_duration = params.buffer_duration,
            periodicity = params.periodicity,
            share_mode = ?params.share_mode,
            "audio client initialized"
        );
        self.requested_flags = requested_flags;
        self.session = Some(params);
        self.state = SessionState::Initialized;
        HResult::S_OK
    }

    /// # Safety
    /// `format` must be null or readable; `closest_match` must be null or
    /// writable.
    pub unsafe fn is_format_supported(
        &mut self,
        share_mode: u32,
        format: *const WaveFormatEx,
        closest_match: *mut *mut WaveFormatEx,
    ) -> HResult {
        if !closest_match.is_null() {
            closest_match.write(std::ptr::null_mut());
        }
        let Some(share_mode) = ShareMode::from_raw(share_mode) else {
            return HResult::E_INVALIDARG;
        };
        if format.is_null() {
            return HResult::E_POINTER;
        }
        let format = format.read_unaligned();
        match self.backend.is_format_supported(share_mode, &format) {
            Ok(None) => HResult::S_OK,
            Ok(Some(closest)) => {
                debug!(?closest, "exclusive mode ignores closest match");
                HResult::S_OK
            }
            Err(err) => err.hresult(),
        }
    }

    /// On Windows the returned format is allocated with `CoTaskMemAlloc` and
    /// the host releases it with `CoTaskMemFree`. Elsewhere it is owned by
    /// this client and stays valid until the client is dropped.
    ///
    /// # Safety
    /// `device_format` must be null or writable.
    pub unsafe fn get_mix_format(&mut self, device_format: *mut *mut WaveFormatEx) -> HResult {
        if device_format.is_null() {
            return HResult::E_POINTER;
        }
        let published = self
            .backend
            .mix_format()
            .and_then(|format| self.publish_mix_format(format));
        match published {
            Ok(format) => {
                device_format.write(format);
                HResult::S_OK
            }
            Err(err) => err.hresult(),
        }
    }

    #[cfg(windows)]
    fn publish_mix_format(
        &mut self,
        format: WaveFormatExtensible,
    ) -> Result<*mut WaveFormatEx, ClientError> {
        use windows::Win32::System::Com::CoTaskMemAlloc;

        let size = std::mem::size_of::<WaveFormatExtensible>();
        let raw = unsafe { CoTaskMemAlloc(size) }.cast::<WaveFormatExtensible>();
        if raw.is_null() {
            return Err(ClientError::OutOfMemory);
        }
        unsafe { raw.write_unaligned(format) };
        Ok(raw.cast())
    }

    #[cfg(not(windows))]
    fn publish_mix_format(
        &mut self,
        format: WaveFormatExtensible,
    ) -> Result<*mut WaveFormatEx, ClientError> {
        self.mix_formats.push(Box::new(format));
        let stored = self
            .mix_formats
            .last_mut()
            .ok_or(ClientError::OutOfMemory)?;
        Ok(std::ptr::addr_of_mut!((**stored).format))
    }

    /// # Safety
    /// Both pointers must be null or writable.
    pub unsafe fn get_device_period(
        &self,
        default_period: *mut ReferenceTime,
        minimum_period: *mut ReferenceTime,
    ) -> HResult {
        if default_period.is_null() && minimum_period.is_null() {
            return HResult::E_POINTER;
        }
        match self.backend.device_period() {
            Ok(period) => {
                if !default_period.is_null() {
                    default_period.write_unaligned(period.default);
                }
                if !minimum_period.is_null() {
                    minimum_period.write_unaligned(period.minimum);
                }
                HResult::S_OK
            }
            Err(err) => err.hresult(),
        }
    }

    /// # Safety
    /// `frames` must be null or writable.
    pub unsafe fn get_buffer_size(&self, frames: *mut u32) -> HResult {
        let value = self
            .require_initialized()
            .and_then(|()| self.backend.buffer_size());
        write_out(frames, value)
    }

    /// # Safety
    /// `latency` must be null or writable.
    pub unsafe fn get_stream_latency(&self, latency: *mut ReferenceTime) -> HResult {
        let value = self
            .require_initialized()
            .and_then(|()| self.backend.stream_latency());
        write_out(latency, value)
    }

    /// # Safety
    /// `padding` must be null or writable.
    pub unsafe fn get_current_padding(&self, padding: *mut u32) -> HResult {
        let value = self
            .require_initialized()
            .and_then(|()| self.backend.current_padding());
        write_out(padding, value)
    }

    /// Transfers the host's event to the backend. On success the host gets
    /// back a different event that will never be signaled.
    pub fn set_event_handle(&mut self, event: EventHandle) -> Result<EventHandle, HResult> {
        self.require_initialized().map_err(ClientError::hresult)?;
        let replacement = self
            .backend
            .set_event_handle(event)
            .map_err(ClientError::hresult)?;
        self.event_set = true;
        Ok(replacement)
    }

    pub fn start(&mut self) -> HResult {
        if let Err(err) = self.require_initialized() {
            return err.hresult();
        }
        if self.state == SessionState::Running {
            return ClientError::NotStopped.hresult();
        }
        if self.requested_flags.contains(StreamFlags::EVENTCALLBACK) && !self.event_set {
            return HResult::AUDCLNT_E_EVENTHANDLE_NOT_SET;
        }
        let result = self.backend.start();
        if result.is_ok() {
            self.state = SessionState::Running;
            info!(backend = self.backend.name(), "audio client started");
        }
        status(result)
    }

    pub fn stop(&mut self) -> HResult {
        if let Err(err) = self.require_initialized() {
            return err.hresult();
        }
        if self.state != SessionState::Running {
            return HResult::S_FALSE;
        }
        let result = self.backend.stop();
        if result.is_ok() {
            self.state = SessionState::Stopped;
            info!(backend = self.backend.name(), "audio client stopped");
        }
        status(result)
    }

    /// # Safety
    /// `data` must be null or writable. The returned buffer is valid for
    /// `frames` frames until the next `release_buffer`.
    pub unsafe fn get_buffer(&mut self, frames: u32, data: *mut *mut u8) -> HResult {
        let value = self.backend.buffer(frames).map(|ptr| ptr.as_ptr());
        write_out(data, value)
    }

    pub fn release_buffer(&mut self, frames: u32, flags: u32) -> HResult {
        let flags = BufferFlags::from_bits_retain(flags);
        status(self.backend.release_buffer(frames, flags))
    }
}
