//! Sample encoding for synthetic payloads.

use super::{Endianness, FormatDescriptor, SampleEncoding};

/// Appends one sample, given as a value in [-1.0, 1.0], encoded for `format`.
///
/// Integer formats scale symmetrically, so -1.0 maps to `-(2^(bits-1) - 1)`.
/// Unsigned formats are offset so that 0.0 lands on the midpoint. Appends
/// nothing for a descriptor that fails [`FormatDescriptor::validate`].
pub fn encode_sample(format: &FormatDescriptor, value: f64, out: &mut Vec<u8>) {
    let value = value.clamp(-1.0, 1.0);
    let width = format.bytes_per_sample();

    match format.encoding {
        SampleEncoding::Float if width == 8 => match format.endianness {
            Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
            Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
        },
        SampleEncoding::Float => {
            let value = value as f32;
            match format.endianness {
                Endianness::Little => out.extend_from_slice(&value.to_le_bytes()),
                Endianness::Big => out.extend_from_slice(&value.to_be_bytes()),
            }
        }
        SampleEncoding::Integer => {
            let bits = u32::from(format.bit_depth);
            if bits == 0 || bits > 64 || width == 0 {
                return;
            }
            let max = ((1u64 << (bits - 1)) - 1) as f64;
            let scaled = (value * max).round() as i64;
            let raw = if format.signed {
                scaled as u64
            } else {
                (scaled as u64).wrapping_add(1u64 << (bits - 1))
            };
            let bytes = raw.to_le_bytes();
            match format.endianness {
                Endianness::Little => out.extend_from_slice(&bytes[..width]),
                Endianness::Big => out.extend(bytes[..width].iter().rev()),
            }
        }
    }
}

/// Returns `frames` frames of silence in `format`.
///
/// Silence is all zero bytes except for unsigned formats, where it is the
/// midpoint value.
#[must_use]
pub fn silence(format: &FormatDescriptor, frames: usize) -> Vec<u8> {
    if format.signed {
        return vec![0u8; frames * format.bytes_per_frame()];
    }
    let mut out = Vec::with_capacity(frames * format.bytes_per_frame());
    for _ in 0..frames * usize::from(format.channels) {
        encode_sample(format, 0.0, &mut out);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_s16le_full_scale() {
        let format = FormatDescriptor::s16le(1, 16000);
        let mut out = Vec::new();
        encode_sample(&format, 1.0, &mut out);
        encode_sample(&format, -1.0, &mut out);
        assert_eq!(out, [0xFF, 0x7F, 0x01, 0x80]);
    }

    #[test]
    fn test_encode_s16be() {
        let format = FormatDescriptor {
            endianness: Endianness::Big,
            ..FormatDescriptor::s16le(1, 16000)
        };
        let mut out = Vec::new();
        encode_sample(&format, 1.0, &mut out);
        assert_eq!(out, [0x7F, 0xFF]);
    }

    #[test]
    fn test_encode_s24le_width() {
        let format = FormatDescriptor {
            bit_depth: 24,
            ..FormatDescriptor::s16le(1, 48000)
        };
        let mut out = Vec::new();
        encode_sample(&format, -1.0, &mut out);
        assert_eq!(out, [0x01, 0x00, 0x80]);
    }

    #[test]
    fn test_encode_f32le() {
        let format = FormatDescriptor::f32le(1, 48000);
        let mut out = Vec::new();
        encode_sample(&format, 0.5, &mut out);
        assert_eq!(out, 0.5f32.to_le_bytes());
    }

    #[test]
    fn test_encode_rejects_bad_bit_depth() {
        for bit_depth in [0, 72] {
            let format = FormatDescriptor {
                bit_depth,
                ..FormatDescriptor::s16le(1, 16000)
            };
            let mut out = Vec::new();
            encode_sample(&format, 0.5, &mut out);
            assert!(out.is_empty());
        }
    }

    #[test]
    fn test_unsigned_silence_is_midpoint() {
        let format = FormatDescriptor {
            bit_depth: 8,
            signed: false,
            ..FormatDescriptor::s16le(2, 8000)
        };
        assert_eq!(silence(&format, 2), vec![0x80; 4]);
    }

    #[test]
    fn test_signed_silence_is_zero() {
        let format = FormatDescriptor::s16le(2, 8000);
        assert_eq!(silence(&format, 3), vec![0u8; 12]);
    }
}
