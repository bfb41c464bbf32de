//! Stream parameters exchanged between the host and a backend.

use bitflags::bitflags;

use crate::format::Guid;

/// A duration in 100-nanosecond units.
pub type ReferenceTime = i64;

/// One millisecond expressed as a [`ReferenceTime`].
pub const HNS_PER_MILLISECOND: ReferenceTime = 10_000;

/// `AUDCLNT_SHAREMODE`
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShareMode {
    Shared = 0,
    Exclusive = 1,
}

impl ShareMode {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ShareMode::Shared),
            1 => Some(ShareMode::Exclusive),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

bitflags! {
    /// `AUDCLNT_STREAMFLAGS_*`
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct StreamFlags: u32 {
        const CROSSPROCESS = 0x0001_0000;
        const LOOPBACK = 0x0002_0000;
        const EVENTCALLBACK = 0x0004_0000;
        const NOPERSIST = 0x0008_0000;
        const RATEADJUST = 0x0010_0000;
        const SRC_DEFAULT_QUALITY = 0x0800_0000;
        const AUTOCONVERTPCM = 0x8000_0000;
    }
}

impl StreamFlags {
    /// The flag set a downstream shared-mode client is opened with.
    pub fn shared_event_driven() -> Self {
        StreamFlags::EVENTCALLBACK
            | StreamFlags::RATEADJUST
            | StreamFlags::AUTOCONVERTPCM
            | StreamFlags::SRC_DEFAULT_QUALITY
    }
}

bitflags! {
    /// `AUDCLNT_BUFFERFLAGS_*` passed to `release_buffer`.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct BufferFlags: u32 {
        const DATA_DISCONTINUITY = 0x1;
        const SILENT = 0x2;
        const TIMESTAMP_ERROR = 0x4;
    }
}

/// Default and minimum device period.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DevicePeriod {
    pub default: ReferenceTime,
    pub minimum: ReferenceTime,
}

impl DevicePeriod {
    pub const fn uniform(period: ReferenceTime) -> Self {
        Self {
            default: period,
            minimum: period,
        }
    }
}

/// Arguments of an `initialize` call. Backends rewrite the fields they
/// dictate; the adjusted values are what the downstream client sees.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct InitializeParams {
    pub share_mode: ShareMode,
    pub stream_flags: StreamFlags,
    pub buffer_duration: ReferenceTime,
    pub periodicity: ReferenceTime,
    pub session: Option<Guid>,
}

impl InitializeParams {
    pub fn exclusive(buffer_duration: ReferenceTime, periodicity: ReferenceTime) -> Self {
        Self {
            share_mode: ShareMode::Exclusive,
            stream_flags: StreamFlags::EVENTCALLBACK,
            buffer_duration,
            periodicity,
            session: None,
        }
    }

    /// Rewrites share mode and flags for a downstream shared-mode client.
    pub(crate) fn downgrade_to_shared(&mut self) {
        self.share_mode = ShareMode::Shared;
        self.stream_flags = StreamFlags::shared_event_driven();
    }
}
