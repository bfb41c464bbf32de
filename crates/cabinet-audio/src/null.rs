//! Backend that accepts everything the contract allows and plays nothing.
//!
//! Lets the host boot without any external audio dependency.

use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, info};

use crate::backend::{signal_release, swap_event, AudioBackend, Result};
use crate::error::ClientError;
use crate::event::EventHandle;
use crate::format::{StreamFormat, WaveFormatEx, WaveFormatExtensible};
use crate::stream::{
    BufferFlags, DevicePeriod, InitializeParams, ReferenceTime, ShareMode, HNS_PER_MILLISECOND,
};

const NAME: &str = "null";

/// Period reported before and after initialization (1 ms).
pub const NULL_DEVICE_PERIOD: ReferenceTime = HNS_PER_MILLISECOND;
/// Buffer duration, periodicity and latency handed back to the host (10 ms).
pub const NULL_STREAM_PERIOD: ReferenceTime = 10 * HNS_PER_MILLISECOND;

const SCRATCH_BYTES: usize = 10_000;

pub struct NullBackend {
    format: Arc<StreamFormat>,
    scratch: Vec<u8>,
    event: Option<EventHandle>,
}

impl NullBackend {
    pub fn new(format: Arc<StreamFormat>) -> Self {
        Self {
            format,
            scratch: vec![0; SCRATCH_BYTES],
            event: None,
        }
    }

    pub fn shared_format(&self) -> &Arc<StreamFormat> {
        &self.format
    }
}

impl AudioBackend for NullBackend {
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
        // 44.1 kHz, stereo, 16 bits per sample, exclusive only
        let channels = format.channels;
        let rate = format.samples_per_sec;
        let bits = format.bits_per_sample;
        if share_mode == ShareMode::Exclusive && channels == 2 && rate == 44_100 && bits == 16 {
            Ok(None)
        } else {
            debug!(?share_mode, channels, rate, bits, "null backend rejected format");
            Err(ClientError::UnsupportedFormat)
        }
    }

    fn device_period(&self) -> Result<DevicePeriod> {
        Ok(DevicePeriod::uniform(NULL_DEVICE_PERIOD))
    }

    fn initialize(&mut self, params: &mut InitializeParams, _format: &WaveFormatEx) -> Result<()> {
        params.downgrade_to_shared();
        params.buffer_duration = NULL_STREAM_PERIOD;
        params.periodicity = NULL_STREAM_PERIOD;
        info!(backend = NAME, "initialize");
        Ok(())
    }

    fn set_event_handle(&mut self, event: EventHandle) -> Result<EventHandle> {
        swap_event(NAME, &mut self.event, event)
    }

    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn buffer_size(&self) -> Result<u32> {
        Ok(0)
    }

    fn buffer(&mut self, frames: u32) -> Result<NonNull<u8>> {
        let needed = frames as usize * usize::from(self.format.block_align());
        if needed > self.scratch.len() {
            self.scratch.resize(needed, 0);
        }
        NonNull::new(self.scratch.as_mut_ptr()).ok_or(ClientError::BufferError)
    }

    fn release_buffer(&mut self, _frames: u32, _flags: BufferFlags) -> Result<()> {
        signal_release(NAME, self.event.as_ref());
        Ok(())
    }

    fn current_padding(&self) -> Result<u32> {
        Ok(0)
    }

    fn stream_latency(&self) -> Result<ReferenceTime> {
        Ok(NULL_STREAM_PERIOD)
    }
}
