//! The canonical stream format and its wire representations.

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use thiserror::Error;

pub const WAVE_FORMAT_PCM: u16 = 0x0001;
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

pub const SPEAKER_FRONT_LEFT: u32 = 0x1;
pub const SPEAKER_FRONT_RIGHT: u32 = 0x2;

/// Size of the extension that follows a `WaveFormatEx` header in a
/// `WaveFormatExtensible`.
const EXTENSIBLE_CB_SIZE: u16 = 22;

/// 128-bit GUID as laid out by the platform ABI.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl Guid {
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }
}

impl fmt::Debug for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.data4;
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1, self.data2, self.data3, d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]
        )
    }
}

/// `KSDATAFORMAT_SUBTYPE_PCM`
pub const KSDATAFORMAT_SUBTYPE_PCM: Guid = Guid::new(
    0x0000_0001,
    0x0000,
    0x0010,
    [0x80, 0x00, 0x00, 0xAA, 0x00, 0x38, 0x9B, 0x71],
);

/// `WAVEFORMATEX`, byte packed like the platform header.
#[repr(C, packed(1))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct WaveFormatEx {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub cb_size: u16,
}

/// `WAVEFORMATEXTENSIBLE`, byte packed like the platform header.
#[repr(C, packed(1))]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct WaveFormatExtensible {
    pub format: WaveFormatEx,
    pub valid_bits_per_sample: u16,
    pub channel_mask: u32,
    pub sub_format: Guid,
}

/// Errors raised while validating a stream format.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("stream format must have at least one channel")]
    NoChannels,
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("unsupported bit depth {0}")]
    BitDepth(u16),
    #[error("valid bits ({valid}) exceed container bits ({container})")]
    ValidBits { valid: u16, container: u16 },
    #[error("{channel_count} channels at {sample_rate} Hz overflow the wire format")]
    TooLarge {
        channel_count: u16,
        sample_rate: u32,
    },
    #[error("canonical stream format already installed")]
    AlreadyInstalled,
}

/// Immutable description of the single stream format every backend
/// advertises.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StreamFormat {
    channel_count: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    valid_bits_per_sample: u16,
    channel_mask: u32,
}

impl StreamFormat {
    pub fn new(
        channel_count: u16,
        sample_rate: u32,
        bits_per_sample: u16,
        valid_bits_per_sample: u16,
        channel_mask: u32,
    ) -> Result<Self, FormatError> {
        if channel_count == 0 {
            return Err(FormatError::NoChannels);
        }
        if sample_rate == 0 {
            return Err(FormatError::ZeroSampleRate);
        }
        if bits_per_sample == 0 || bits_per_sample % 8 != 0 || bits_per_sample > 32 {
            return Err(FormatError::BitDepth(bits_per_sample));
        }
        if valid_bits_per_sample > bits_per_sample {
            return Err(FormatError::ValidBits {
                valid: valid_bits_per_sample,
                container: bits_per_sample,
            });
        }
        let too_large = FormatError::TooLarge {
            channel_count,
            sample_rate,
        };
        let block_align = channel_count
            .checked_mul(bits_per_sample / 8)
            .ok_or_else(|| too_large.clone())?;
        sample_rate
            .checked_mul(u32::from(block_align))
            .ok_or(too_large)?;
        Ok(Self {
            channel_count,
            sample_rate,
            bits_per_sample,
            valid_bits_per_sample,
            channel_mask,
        })
    }

    /// 44.1 kHz, stereo, 16-bit PCM.
    pub const fn cd_quality() -> Self {
        Self {
            channel_count: 2,
            sample_rate: 44_100,
            bits_per_sample: 16,
            valid_bits_per_sample: 16,
            channel_mask: SPEAKER_FRONT_LEFT | SPEAKER_FRONT_RIGHT,
        }
    }

    pub fn channel_count(&self) -> u16 {
        self.channel_count
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn valid_bits_per_sample(&self) -> u16 {
        self.valid_bits_per_sample
    }

    pub fn channel_mask(&self) -> u32 {
        self.channel_mask
    }

    /// Bytes per frame.
    pub fn block_align(&self) -> u16 {
        self.channel_count * (self.bits_per_sample / 8)
    }

    pub fn bytes_per_second(&self) -> u32 {
        self.sample_rate * u32::from(self.block_align())
    }

    /// Whether `format` describes the same channel layout, rate and depth.
    pub fn matches(&self, format: &WaveFormatEx) -> bool {
        let channels = format.channels;
        let rate = format.samples_per_sec;
        let bits = format.bits_per_sample;
        channels == self.channel_count && rate == self.sample_rate && bits == self.bits_per_sample
    }

    pub fn to_wave_format_extensible(&self) -> WaveFormatExtensible {
        WaveFormatExtensible {
            format: WaveFormatEx {
                format_tag: WAVE_FORMAT_EXTENSIBLE,
                channels: self.channel_count,
                samples_per_sec: self.sample_rate,
                avg_bytes_per_sec: self.bytes_per_second(),
                block_align: self.block_align(),
                bits_per_sample: self.bits_per_sample,
                cb_size: EXTENSIBLE_CB_SIZE,
            },
            valid_bits_per_sample: self.valid_bits_per_sample,
            channel_mask: self.channel_mask,
            sub_format: KSDATAFORMAT_SUBTYPE_PCM,
        }
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::cd_quality()
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}ch {} Hz {}-bit (valid {}, mask 0x{:X})",
            self.channel_count,
            self.sample_rate,
            self.bits_per_sample,
            self.valid_bits_per_sample,
            self.channel_mask
        )
    }
}

static CANONICAL: OnceCell<Arc<StreamFormat>> = OnceCell::new();

/// Installs the process-wide canonical format. Must run before the first
/// backend is constructed; a second call fails.
pub fn install_canonical(format: StreamFormat) -> Result<Arc<StreamFormat>, FormatError> {
    let shared = Arc::new(format);
    CANONICAL
        .set(shared.clone())
        .map_err(|_| FormatError::AlreadyInstalled)?;
    tracing::info!(%format, "installed canonical stream format");
    Ok(shared)
}

/// Returns the canonical format, installing the CD-quality default when
/// nothing was installed explicitly.
pub fn canonical() -> Arc<StreamFormat> {
    CANONICAL
        .get_or_init(|| Arc::new(StreamFormat::cd_quality()))
        .clone()
}
