//! Format descriptors shared by both ends of the relay.
//!
//! A [`FormatDescriptor`] is the capability contract: the source's output and the
//! sink's input must carry the same one. This module provides:
//! - The descriptor itself and its validation
//! - Caps string rendering and parsing (current and legacy dialects)
//! - Sample encoding for synthetic payloads

mod caps;
mod encode;

pub use encode::{encode_sample, silence};

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::RelayError;

/// How individual samples are represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleEncoding {
    /// Fixed-point integer samples (signed or unsigned).
    Integer,
    /// IEEE 754 floating point samples.
    Float,
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endianness {
    /// Least significant byte first.
    #[default]
    Little,
    /// Most significant byte first.
    Big,
}

/// The data-shape contract for interleaved raw audio.
///
/// Descriptors are plain values: compare them with `==`, copy them freely.
/// Both relay endpoints are built from the same descriptor.
///
/// # Example
///
/// ```
/// use stream_relay::FormatDescriptor;
///
/// let format: FormatDescriptor = "audio/x-raw,format=S16LE,channels=2,rate=44100"
///     .parse()
///     .unwrap();
/// assert_eq!(format, FormatDescriptor::s16le(2, 44100));
/// assert_eq!(format.bytes_per_frame(), 4);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FormatDescriptor {
    /// Integer or float samples.
    pub encoding: SampleEncoding,
    /// Bits per sample (8, 16, 24, 32, 64).
    pub bit_depth: u16,
    /// Whether integer samples are signed. Always `true` for floats.
    pub signed: bool,
    /// Byte order of each sample.
    pub endianness: Endianness,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Frames per second.
    pub sample_rate: u32,
}

impl FormatDescriptor {
    /// Signed 16-bit little-endian samples.
    #[must_use]
    pub fn s16le(channels: u16, sample_rate: u32) -> Self {
        Self {
            encoding: SampleEncoding::Integer,
            bit_depth: 16,
            signed: true,
            endianness: Endianness::Little,
            channels,
            sample_rate,
        }
    }

    /// 32-bit little-endian float samples.
    #[must_use]
    pub fn f32le(channels: u16, sample_rate: u32) -> Self {
        Self {
            encoding: SampleEncoding::Float,
            bit_depth: 32,
            signed: true,
            endianness: Endianness::Little,
            channels,
            sample_rate,
        }
    }

    /// Checks that the descriptor describes a format the relay can carry.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidFormat`] for zero channels, zero rate, bit
    /// depths that are not whole bytes, unsigned floats, or float depths other
    /// than 32 and 64.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.channels == 0 {
            return Err(RelayError::invalid_format("channel count must be non-zero"));
        }
        if self.sample_rate == 0 {
            return Err(RelayError::invalid_format("sample rate must be non-zero"));
        }
        if self.bit_depth == 0 || self.bit_depth % 8 != 0 || self.bit_depth > 64 {
            return Err(RelayError::invalid_format(format!(
                "unsupported bit depth {}",
                self.bit_depth
            )));
        }
        if self.encoding == SampleEncoding::Float {
            if !self.signed {
                return Err(RelayError::invalid_format("float samples are always signed"));
            }
            if self.bit_depth != 32 && self.bit_depth != 64 {
                return Err(RelayError::invalid_format(format!(
                    "float samples must be 32 or 64 bits, got {}",
                    self.bit_depth
                )));
            }
        }
        Ok(())
    }

    /// Bytes used by one sample of one channel.
    #[must_use]
    pub fn bytes_per_sample(&self) -> usize {
        usize::from(self.bit_depth / 8)
    }

    /// Bytes used by one frame (one sample per channel).
    #[must_use]
    pub fn bytes_per_frame(&self) -> usize {
        self.bytes_per_sample() * usize::from(self.channels)
    }

    /// Playback duration of `len` bytes in this format.
    ///
    /// Returns [`Duration::ZERO`] for degenerate descriptors.
    #[must_use]
    pub fn duration_of(&self, len: usize) -> Duration {
        let frame = self.bytes_per_frame();
        if frame == 0 || self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = (len / frame) as u64;
        Duration::from_nanos(frames * 1_000_000_000 / u64::from(self.sample_rate))
    }

    /// Number of whole frames in `duration`.
    #[must_use]
    pub fn frames_in(&self, duration: Duration) -> usize {
        (u128::from(self.sample_rate) * duration.as_nanos() / 1_000_000_000) as usize
    }

    /// Format name as used in current caps strings, e.g. `S16LE` or `U8`.
    #[must_use]
    pub fn format_name(&self) -> String {
        let kind = match (self.encoding, self.signed) {
            (SampleEncoding::Float, _) => 'F',
            (SampleEncoding::Integer, true) => 'S',
            (SampleEncoding::Integer, false) => 'U',
        };
        if self.bit_depth == 8 {
            return format!("{kind}8");
        }
        let order = match self.endianness {
            Endianness::Little => "LE",
            Endianness::Big => "BE",
        };
        format!("{kind}{}{order}", self.bit_depth)
    }

    /// Renders current-style caps:
    /// `audio/x-raw,format=S16LE,channels=2,rate=44100,layout=interleaved`.
    #[must_use]
    pub fn to_caps(&self) -> String {
        caps::render(self)
    }

    /// Renders legacy-style caps (`audio/x-raw-int` / `audio/x-raw-float`).
    #[must_use]
    pub fn to_legacy_caps(&self) -> String {
        caps::render_legacy(self)
    }

    /// Parses either caps dialect.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidFormat`] if the string is not raw audio caps or
    /// a required field is missing or malformed.
    pub fn from_caps(caps: &str) -> Result<Self, RelayError> {
        let format = caps::parse(caps)?;
        format.validate()?;
        Ok(format)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_caps())
    }
}

impl FromStr for FormatDescriptor {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_caps(s)
    }
}
