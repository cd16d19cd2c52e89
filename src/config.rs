//! Configuration types for relays.

use crate::{FormatDescriptor, RelayError};

/// Preset formats for common use cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormatPreset {
    /// 16-bit stereo at 44.1kHz - decoded music files.
    #[default]
    CdQuality,

    /// 16kHz mono - speech-to-text services.
    Transcription,

    /// 16-bit mono at 48kHz - voice and broadcast material.
    Mono48k,
}

impl FormatPreset {
    /// Returns the descriptor both endpoints will be built with.
    #[must_use]
    pub fn descriptor(&self) -> FormatDescriptor {
        match self {
            Self::CdQuality => FormatDescriptor::s16le(2, 44100),
            Self::Transcription => FormatDescriptor::s16le(1, 16000),
            Self::Mono48k => FormatDescriptor::s16le(1, 48000),
        }
    }
}

/// Settings for the source's hand-over stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfig {
    /// Emit a notification for every buffer that becomes ready.
    ///
    /// The relay is driven by these notifications and refuses to start
    /// without them. Default: `true`
    pub emit_signals: bool,

    /// Pace buffers to the pipeline clock.
    ///
    /// When `false`, buffers are relayed as fast as they are produced and the
    /// downstream pipeline does the pacing. Default: `false`
    pub sync_to_clock: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            emit_signals: true,
            sync_to_clock: false,
        }
    }
}

/// How the sink's feed stage addresses the buffers it is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamFormat {
    /// Buffers carry timestamps in time units.
    #[default]
    Time,
    /// Buffers are addressed by byte offset.
    Bytes,
}

/// Settings for the sink's feed stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkConfig {
    /// Buffer addressing mode. Default: [`StreamFormat::Time`]
    pub stream_format: StreamFormat,

    /// Block the pushing thread while the feed queue holds `max_bytes` or more.
    ///
    /// Off by default: pushes return immediately and data accumulates in the
    /// downstream queue until it is consumed. Blocking mode stalls the relay
    /// loop, so the downstream consumer must run on another thread.
    pub block: bool,

    /// Queue size at which blocking mode starts to wait.
    ///
    /// Ignored unless `block` is set. Default: 200000 bytes
    pub max_bytes: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            stream_format: StreamFormat::Time,
            block: false,
            max_bytes: 200_000,
        }
    }
}

/// How a buffer crosses from the source pipeline to the sink pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Copy the payload into a fresh allocation before pushing.
    ///
    /// Nothing is shared between the two pipelines afterwards.
    #[default]
    Copy,

    /// Move the pulled buffer to the sink unchanged.
    ///
    /// Only valid if the source pipeline never reuses or mutates a buffer
    /// after releasing it.
    Handover,
}

/// Configuration for relay behavior.
///
/// # Example
///
/// ```
/// use stream_relay::{RelayConfig, SinkConfig, TransferMode};
///
/// let config = RelayConfig {
///     transfer: TransferMode::Handover,
///     sink: SinkConfig {
///         block: true,
///         ..Default::default()
///     },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RelayConfig {
    /// Source hand-over stage settings.
    pub source: SourceConfig,
    /// Sink feed stage settings.
    pub sink: SinkConfig,
    /// Buffer transfer strategy. Default: [`TransferMode::Copy`]
    pub transfer: TransferMode,
    /// Log property changes inside the pipelines at debug level.
    pub verbose: bool,
}

impl RelayConfig {
    /// Checks the settings for combinations the relay cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::InvalidConfig`] if buffer notifications are
    /// disabled, or if blocking mode has no room to queue anything.
    pub fn validate(&self) -> Result<(), RelayError> {
        if !self.source.emit_signals {
            return Err(RelayError::InvalidConfig {
                reason: "source.emit_signals must be enabled to relay buffers".to_string(),
            });
        }
        if self.sink.block && self.sink.max_bytes == 0 {
            return Err(RelayError::InvalidConfig {
                reason: "sink.max_bytes must be non-zero in blocking mode".to_string(),
            });
        }
        Ok(())
    }
}
