//! Media buffer with format metadata.

use std::time::Duration;

use bytes::Bytes;

use crate::FormatDescriptor;

/// A discrete chunk of media bytes handed from the source to the sink.
///
/// `BufferUnit` is deliberately not `Clone`: each buffer has exactly one owner
/// on its way through the relay (source pipeline, controller, sink pipeline).
/// [`deep_copy()`](BufferUnit::deep_copy) is the only way to obtain a second,
/// independent buffer.
///
/// # Example
///
/// ```
/// use stream_relay::{BufferUnit, FormatDescriptor};
/// use std::time::Duration;
///
/// let format = FormatDescriptor::s16le(1, 16000);
/// let buffer = BufferUnit::new(vec![0u8; 3200], format);
/// assert_eq!(buffer.frame_count(), 1600);
/// assert_eq!(buffer.computed_duration(), Duration::from_millis(100));
/// ```
#[derive(Debug)]
pub struct BufferUnit {
    payload: Bytes,
    format: FormatDescriptor,
    pts: Option<Duration>,
    duration: Option<Duration>,
}

impl BufferUnit {
    /// Creates a buffer from a payload and the format it is encoded in.
    pub fn new(payload: impl Into<Bytes>, format: FormatDescriptor) -> Self {
        Self {
            payload: payload.into(),
            format,
            pts: None,
            duration: None,
        }
    }

    /// Sets the presentation timestamp.
    #[must_use]
    pub fn with_pts(mut self, pts: Duration) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the buffer duration.
    #[must_use]
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// The format descriptor the payload is encoded in.
    pub fn format(&self) -> &FormatDescriptor {
        &self.format
    }

    /// Presentation timestamp, if the producer set one.
    pub fn pts(&self) -> Option<Duration> {
        self.pts
    }

    /// Duration as set by the producer, if any.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Returns `true` if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Number of whole frames in the payload.
    pub fn frame_count(&self) -> usize {
        let frame = self.format.bytes_per_frame();
        if frame == 0 {
            return 0;
        }
        self.payload.len() / frame
    }

    /// Playback duration derived from the payload size and format.
    pub fn computed_duration(&self) -> Duration {
        self.format.duration_of(self.payload.len())
    }

    /// Copies the payload into a new allocation.
    ///
    /// The copy shares nothing with `self`, so the source pipeline is free to
    /// recycle the original memory once it is dropped. Metadata is carried over
    /// unchanged.
    #[must_use]
    pub fn deep_copy(&self) -> Self {
        Self {
            payload: Bytes::copy_from_slice(&self.payload),
            format: self.format,
            pts: self.pts,
            duration: self.duration,
        }
    }

    /// Consumes the buffer and returns its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_stereo_48khz() {
        // 4800 frames * 4 bytes / 48000 Hz = 100ms
        let buffer = BufferUnit::new(vec![0u8; 19200], FormatDescriptor::s16le(2, 48000));
        assert_eq!(buffer.computed_duration(), Duration::from_millis(100));
        assert_eq!(buffer.frame_count(), 4800);
    }

    #[test]
    fn test_empty_buffer() {
        let buffer = BufferUnit::new(Vec::new(), FormatDescriptor::s16le(2, 48000));
        assert!(buffer.is_empty());
        assert_eq!(buffer.frame_count(), 0);
        assert_eq!(buffer.computed_duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_channels() {
        let buffer = BufferUnit::new(vec![0u8; 100], FormatDescriptor::s16le(0, 16000));
        assert_eq!(buffer.frame_count(), 0);
        assert_eq!(buffer.computed_duration(), Duration::ZERO);
    }

    #[test]
    fn test_deep_copy_does_not_share_memory() {
        let original = BufferUnit::new(vec![1u8, 2, 3, 4], FormatDescriptor::s16le(1, 16000))
            .with_pts(Duration::from_millis(40))
            .with_duration(Duration::from_micros(125));
        let copy = original.deep_copy();

        assert_eq!(copy.payload(), original.payload());
        assert_ne!(copy.payload().as_ptr(), original.payload().as_ptr());
        assert_eq!(copy.format(), original.format());
        assert_eq!(copy.pts(), Some(Duration::from_millis(40)));
        assert_eq!(copy.duration(), Some(Duration::from_micros(125)));
    }

    #[test]
    fn test_into_payload() {
        let buffer = BufferUnit::new(vec![9u8, 8, 7], FormatDescriptor::s16le(1, 16000));
        assert_eq!(&buffer.into_payload()[..], &[9, 8, 7]);
    }
}
