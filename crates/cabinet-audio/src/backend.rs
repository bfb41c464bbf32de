//! The contract every audio backend implements.

use std::ptr::NonNull;

use crate::error::ClientError;
use crate::event::EventHandle;
use crate::format::{StreamFormat, WaveFormatEx, WaveFormatExtensible};
use crate::stream::{BufferFlags, DevicePeriod, InitializeParams, ReferenceTime, ShareMode};

pub type Result<T> = std::result::Result<T, ClientError>;

/// An emulated exclusive-mode audio device.
///
/// The host drives a backend from its render thread in this order:
///
/// ```text
/// Uninitialized -> (is_format_supported)* -> initialize -> set_event_handle
///     -> start <-> stop -> drop
/// ```
///
/// `buffer_size`, `buffer` and `release_buffer` are only meaningful while the
/// stream is running. Backends do not guard against out-of-order calls.
pub trait AudioBackend: Send {
    fn name(&self) -> &'static str;

    /// The canonical stream format.
    fn format(&self) -> &StreamFormat;

    /// Succeeds iff `share_mode` is exclusive and the device accepts
    /// `format`. Exclusive mode never produces a closest match.
    fn is_format_supported(
        &mut self,
        share_mode: ShareMode,
        format: &WaveFormatEx,
    ) -> Result<Option<WaveFormatExtensible>>;

    /// Valid before `initialize`; reflects the last successful negotiation.
    fn device_period(&self) -> Result<DevicePeriod>;

    /// Creates the underlying client. Rewrites the parts of `params` the
    /// backend dictates. Resource failures are fatal.
    fn initialize(&mut self, params: &mut InitializeParams, format: &WaveFormatEx) -> Result<()>;

    /// Takes ownership of the host's event and returns a fresh, distinct
    /// event that this backend never signals.
    fn set_event_handle(&mut self, event: EventHandle) -> Result<EventHandle>;

    fn start(&mut self) -> Result<()>;

    fn stop(&mut self) -> Result<()>;

    /// Frames the host writes per render cycle. Constant for the session.
    fn buffer_size(&self) -> Result<u32>;

    /// Storage for `frames` frames at the format's block alignment, valid
    /// until the matching `release_buffer`.
    fn buffer(&mut self, frames: u32) -> Result<NonNull<u8>>;

    /// Commits `frames` frames, then signals the stored event exactly once.
    /// Frames released with `BufferFlags::SILENT` are committed as silence.
    fn release_buffer(&mut self, frames: u32, flags: BufferFlags) -> Result<()>;

    fn current_padding(&self) -> Result<u32>;

    fn stream_latency(&self) -> Result<ReferenceTime>;

    /// Shared-mode mix format; exclusive-only backends never have one.
    fn mix_format(&self) -> Result<WaveFormatExtensible> {
        Err(ClientError::NotImplemented)
    }
}

/// Signals `event` after a release. A failed or impossible signal is only a
/// warning: the host loop can still wake on its own timeout.
pub(crate) fn signal_release(backend: &'static str, event: Option<&EventHandle>) {
    match event {
        Some(event) => {
            if let Err(err) = event.signal() {
                tracing::warn!(backend, %err, "failed to signal buffer event");
            }
        }
        None => tracing::warn!(backend, "buffer released without an event handle"),
    }
}

/// Installs `event` into `slot` and returns the replacement for the host.
pub(crate) fn swap_event(
    backend: &'static str,
    slot: &mut Option<EventHandle>,
    event: EventHandle,
) -> Result<EventHandle> {
    let replacement = EventHandle::new().map_err(|err| {
        tracing::warn!(backend, %err, "failed to create replacement event");
        ClientError::InvalidArgument
    })?;
    tracing::info!(
        backend,
        adopted = ?event.id(),
        replacement = ?replacement.id(),
        "took ownership of host event"
    );
    *slot = Some(event);
    Ok(replacement)
}
