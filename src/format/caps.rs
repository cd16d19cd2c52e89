//! Caps string rendering and parsing.
//!
//! Two dialects are understood:
//!
//! ```text
//! audio/x-raw,format=S16LE,channels=2,rate=44100,layout=interleaved
//! audio/x-raw-int,endianness=(int)1234,channels=(int)1,width=(int)16,depth=(int)16,signed=(boolean)true,rate=(int)48000
//! ```

use super::{Endianness, FormatDescriptor, SampleEncoding};
use crate::RelayError;

const RAW_AUDIO: &str = "audio/x-raw";
const LEGACY_INT: &str = "audio/x-raw-int";
const LEGACY_FLOAT: &str = "audio/x-raw-float";

const LITTLE_ENDIAN: u32 = 1234;
const BIG_ENDIAN: u32 = 4321;

pub(super) fn render(format: &FormatDescriptor) -> String {
    format!(
        "{RAW_AUDIO},format={},channels={},rate={},layout=interleaved",
        format.format_name(),
        format.channels,
        format.sample_rate
    )
}

pub(super) fn render_legacy(format: &FormatDescriptor) -> String {
    let endianness = match format.endianness {
        Endianness::Little => LITTLE_ENDIAN,
        Endianness::Big => BIG_ENDIAN,
    };
    match format.encoding {
        SampleEncoding::Integer => format!(
            "{LEGACY_INT},endianness=(int){endianness},channels=(int){},width=(int){depth},depth=(int){depth},signed=(boolean){},rate=(int){}",
            format.channels,
            format.signed,
            format.sample_rate,
            depth = format.bit_depth,
        ),
        SampleEncoding::Float => format!(
            "{LEGACY_FLOAT},endianness=(int){endianness},channels=(int){},width=(int){},rate=(int){}",
            format.channels, format.bit_depth, format.sample_rate,
        ),
    }
}

/// Parsed `key=value` fields of a caps structure.
struct Fields<'a> {
    media_type: &'a str,
    pairs: Vec<(&'a str, &'a str)>,
}

impl<'a> Fields<'a> {
    fn split(caps: &'a str) -> Result<Self, RelayError> {
        let mut parts = caps.split(',').map(str::trim);
        let media_type = parts
            .next()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RelayError::invalid_format("empty caps"))?;

        let mut pairs = Vec::new();
        for part in parts.filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                RelayError::invalid_format(format!("caps field '{part}' has no value"))
            })?;
            pairs.push((key.trim(), strip_value(value)));
        }

        Ok(Self { media_type, pairs })
    }

    fn get(&self, key: &str) -> Option<&'a str> {
        self.pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
    }

    fn require(&self, key: &str) -> Result<&'a str, RelayError> {
        self.get(key)
            .ok_or_else(|| RelayError::invalid_format(format!("caps missing '{key}'")))
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<T, RelayError> {
        let raw = self.require(key)?;
        raw.parse().map_err(|_| {
            RelayError::invalid_format(format!("caps field '{key}' is not a number: {raw}"))
        })
    }
}

/// Strips a `(type)` prefix and surrounding quotes from a field value.
fn strip_value(value: &str) -> &str {
    let value = value.trim();
    let value = match value.strip_prefix('(') {
        Some(rest) => rest.split_once(')').map_or(value, |(_, v)| v.trim()),
        None => value,
    };
    value.trim_matches('"')
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, RelayError> {
    match raw {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(RelayError::invalid_format(format!(
            "caps field '{key}' is not a boolean: {other}"
        ))),
    }
}

pub(super) fn parse(caps: &str) -> Result<FormatDescriptor, RelayError> {
    let fields = Fields::split(caps)?;
    match fields.media_type {
        RAW_AUDIO => parse_current(&fields),
        LEGACY_INT => parse_legacy(&fields, SampleEncoding::Integer),
        LEGACY_FLOAT => parse_legacy(&fields, SampleEncoding::Float),
        other => Err(RelayError::invalid_format(format!(
            "unsupported media type '{other}'"
        ))),
    }
}

fn parse_current(fields: &Fields<'_>) -> Result<FormatDescriptor, RelayError> {
    if let Some(layout) = fields.get("layout") {
        if layout != "interleaved" {
            return Err(RelayError::invalid_format(format!(
                "unsupported layout '{layout}'"
            )));
        }
    }

    let name = fields.require("format")?;
    let (encoding, signed, bit_depth, endianness) = parse_format_name(name)?;

    Ok(FormatDescriptor {
        encoding,
        bit_depth,
        signed,
        endianness,
        channels: fields.number("channels")?,
        sample_rate: fields.number("rate")?,
    })
}

/// Splits a name like `S16LE` into its parts.
fn parse_format_name(name: &str) -> Result<(SampleEncoding, bool, u16, Endianness), RelayError> {
    let bad = || RelayError::invalid_format(format!("unknown sample format '{name}'"));

    let mut chars = name.chars();
    let (encoding, signed) = match chars.next() {
        Some('S') => (SampleEncoding::Integer, true),
        Some('U') => (SampleEncoding::Integer, false),
        Some('F') => (SampleEncoding::Float, true),
        _ => return Err(bad()),
    };

    let rest = chars.as_str();
    let digits_end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());
    let bit_depth: u16 = rest[..digits_end].parse().map_err(|_| bad())?;

    let endianness = match &rest[digits_end..] {
        "LE" => Endianness::Little,
        "BE" => Endianness::Big,
        "" if bit_depth == 8 => Endianness::Little,
        _ => return Err(bad()),
    };

    Ok((encoding, signed, bit_depth, endianness))
}

fn parse_legacy(
    fields: &Fields<'_>,
    encoding: SampleEncoding,
) -> Result<FormatDescriptor, RelayError> {
    let bit_depth: u16 = fields.number("width")?;

    if encoding == SampleEncoding::Integer {
        if let Some(depth) = fields.get("depth") {
            if depth.parse::<u16>().ok() != Some(bit_depth) {
                return Err(RelayError::invalid_format(format!(
                    "padded samples are not supported (width {bit_depth}, depth {depth})"
                )));
            }
        }
    }

    let endianness = match fields.get("endianness") {
        None => Endianness::Little,
        Some(raw) => match raw.parse::<u32>() {
            Ok(LITTLE_ENDIAN) => Endianness::Little,
            Ok(BIG_ENDIAN) => Endianness::Big,
            _ => {
                return Err(RelayError::invalid_format(format!(
                    "unknown endianness '{raw}'"
                )))
            }
        },
    };

    let signed = match encoding {
        SampleEncoding::Float => true,
        SampleEncoding::Integer => parse_bool("signed", fields.require("signed")?)?,
    };

    Ok(FormatDescriptor {
        encoding,
        bit_depth,
        signed,
        endianness,
        channels: fields.number("channels")?,
        sample_rate: fields.number("rate")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_current_caps_with_spaces() {
        let format =
            FormatDescriptor::from_caps("audio/x-raw,format=S16LE,channels=2,rate=44100, layout=interleaved")
                .unwrap();
        assert_eq!(format, FormatDescriptor::s16le(2, 44100));
    }

    #[test]
    fn test_parse_legacy_int_caps() {
        let format = FormatDescriptor::from_caps(
            "audio/x-raw-int, endianness=(int)1234, channels=(int)1, width=(int)16, depth=(int)16, signed=(boolean)true, rate=(int)48000",
        )
        .unwrap();
        assert_eq!(format, FormatDescriptor::s16le(1, 48000));
    }

    #[test]
    fn test_parse_legacy_float_caps() {
        let format = FormatDescriptor::from_caps(
            "audio/x-raw-float,endianness=(int)4321,channels=(int)2,width=(int)64,rate=(int)96000",
        )
        .unwrap();
        assert_eq!(format.encoding, SampleEncoding::Float);
        assert_eq!(format.bit_depth, 64);
        assert_eq!(format.endianness, Endianness::Big);
    }

    #[test]
    fn test_legacy_render_parses_back() {
        let format = FormatDescriptor::s16le(1, 48000);
        assert_eq!(
            format.to_legacy_caps(),
            "audio/x-raw-int,endianness=(int)1234,channels=(int)1,width=(int)16,depth=(int)16,signed=(boolean)true,rate=(int)48000"
        );
        assert_eq!(FormatDescriptor::from_caps(&format.to_legacy_caps()).unwrap(), format);
    }

    #[test]
    fn test_parse_unsigned_8_bit() {
        let format = FormatDescriptor::from_caps("audio/x-raw,format=U8,channels=1,rate=8000").unwrap();
        assert!(!format.signed);
        assert_eq!(format.bit_depth, 8);
    }

    #[test]
    fn test_parse_rejects_video() {
        let err = FormatDescriptor::from_caps("video/x-raw,format=I420").unwrap_err();
        assert!(err.to_string().contains("video/x-raw"));
    }

    #[test]
    fn test_parse_rejects_missing_rate() {
        let err = FormatDescriptor::from_caps("audio/x-raw,format=S16LE,channels=2").unwrap_err();
        assert!(err.to_string().contains("rate"));
    }

    #[test]
    fn test_parse_rejects_planar_layout() {
        assert!(FormatDescriptor::from_caps(
            "audio/x-raw,format=F32LE,channels=2,rate=48000,layout=non-interleaved"
        )
        .is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_format_name() {
        assert!(FormatDescriptor::from_caps("audio/x-raw,format=S16XX,channels=2,rate=48000").is_err());
        assert!(FormatDescriptor::from_caps("audio/x-raw,format=S16,channels=2,rate=48000").is_err());
    }

    #[test]
    fn test_parse_rejects_padded_legacy_samples() {
        assert!(FormatDescriptor::from_caps(
            "audio/x-raw-int,endianness=(int)1234,channels=(int)2,width=(int)32,depth=(int)24,signed=(boolean)true,rate=(int)48000"
        )
        .is_err());
    }
}
