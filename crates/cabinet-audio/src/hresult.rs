//! Status codes returned across the emulated audio client surface.
//!
//! The host is a closed binary that compares these values bit for bit, so the
//! constants below mirror the platform headers exactly.

use std::fmt;

/// A raw COM status code.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct HResult(pub i32);

const fn hr(value: u32) -> HResult {
    HResult(value as i32)
}

impl HResult {
    pub const S_OK: HResult = hr(0x0000_0000);
    pub const S_FALSE: HResult = hr(0x0000_0001);
    pub const E_NOTIMPL: HResult = hr(0x8000_4001);
    pub const E_POINTER: HResult = hr(0x8000_4003);
    pub const E_OUTOFMEMORY: HResult = hr(0x8007_000E);
    pub const E_INVALIDARG: HResult = hr(0x8007_0057);
    pub const AUDCLNT_E_NOT_INITIALIZED: HResult = hr(0x8889_0001);
    pub const AUDCLNT_E_ALREADY_INITIALIZED: HResult = hr(0x8889_0002);
    pub const AUDCLNT_E_NOT_STOPPED: HResult = hr(0x8889_0005);
    pub const AUDCLNT_E_UNSUPPORTED_FORMAT: HResult = hr(0x8889_0008);
    pub const AUDCLNT_E_EVENTHANDLE_NOT_SET: HResult = hr(0x8889_0014);
    pub const AUDCLNT_E_BUFFER_ERROR: HResult = hr(0x8889_0018);

    /// Mirrors the `SUCCEEDED` macro.
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 >= 0
    }

    #[inline]
    pub const fn code(self) -> u32 {
        self.0 as u32
    }

    fn name(self) -> Option<&'static str> {
        Some(match self {
            HResult::S_OK => "S_OK",
            HResult::S_FALSE => "S_FALSE",
            HResult::E_NOTIMPL => "E_NOTIMPL",
            HResult::E_POINTER => "E_POINTER",
            HResult::E_OUTOFMEMORY => "E_OUTOFMEMORY",
            HResult::E_INVALIDARG => "E_INVALIDARG",
            HResult::AUDCLNT_E_NOT_INITIALIZED => "AUDCLNT_E_NOT_INITIALIZED",
            HResult::AUDCLNT_E_ALREADY_INITIALIZED => "AUDCLNT_E_ALREADY_INITIALIZED",
            HResult::AUDCLNT_E_NOT_STOPPED => "AUDCLNT_E_NOT_STOPPED",
            HResult::AUDCLNT_E_UNSUPPORTED_FORMAT => "AUDCLNT_E_UNSUPPORTED_FORMAT",
            HResult::AUDCLNT_E_EVENTHANDLE_NOT_SET => "AUDCLNT_E_EVENTHANDLE_NOT_SET",
            HResult::AUDCLNT_E_BUFFER_ERROR => "AUDCLNT_E_BUFFER_ERROR",
            _ => return None,
        })
    }
}

impl fmt::Debug for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.code()),
            None => write!(f, "HResult(0x{:08X})", self.code()),
        }
    }
}

impl fmt::Display for HResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
