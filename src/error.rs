//! Error types for stream-relay.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`RelayError`]): Abort construction or terminate a running relay
//! - **Push errors** ([`SinkError`]): Returned by a sink per buffer; the controller
//!   decides whether they are fatal

use crate::event::Endpoint;
use crate::format::FormatDescriptor;
use crate::pipeline::PipelineState;

/// Fatal errors that prevent a relay from starting or end a running one.
///
/// Construction errors are returned from [`RelayBuilder::start()`] before any
/// pipeline is set to playing. Runtime errors are returned from
/// [`RelaySession::run()`] after both pipelines were unwound to
/// [`PipelineState::Null`].
///
/// [`RelayBuilder::start()`]: crate::RelayBuilder::start
/// [`RelaySession::run()`]: crate::RelaySession::run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// A pipeline description could not be parsed or built.
    #[error("invalid pipeline description: {reason}")]
    Construction {
        /// What was wrong with the description.
        reason: String,
    },

    /// The hand-over stage named in the configuration does not exist.
    #[error("pipeline has no stage named '{name}'")]
    MissingStage {
        /// Name that was looked up.
        name: String,
    },

    /// Neither a source endpoint nor a source description was given.
    #[error("no source configured - use source() or source_description() before start()")]
    NoSourceConfigured,

    /// Neither a sink endpoint nor a sink description was given.
    #[error("no sink configured - use sink() or sink_description() before start()")]
    NoSinkConfigured,

    /// A caps string or format descriptor is malformed.
    #[error("invalid format: {reason}")]
    InvalidFormat {
        /// Why the format was rejected.
        reason: String,
    },

    /// The relay configuration is inconsistent.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which setting is wrong.
        reason: String,
    },

    /// Source output and sink input do not share one format descriptor.
    #[error("format mismatch: source produces {upstream}, sink expects {downstream}")]
    FormatMismatch {
        /// Descriptor on the producing side.
        upstream: FormatDescriptor,
        /// Descriptor on the consuming side.
        downstream: FormatDescriptor,
    },

    /// A pull was attempted with no pending buffer notification.
    #[error("no buffer available to pull")]
    NoBufferAvailable,

    /// A pipeline refused a lifecycle transition.
    #[error("{origin} pipeline failed to change state to {target}: {reason}")]
    StateChange {
        /// Which side of the relay failed.
        origin: Endpoint,
        /// The state that was requested.
        target: PipelineState,
        /// Backend-provided reason.
        reason: String,
    },

    /// A pipeline reported an internal error while running.
    #[error("{origin} pipeline error: {message}")]
    PipelineRuntime {
        /// Which side of the relay failed.
        origin: Endpoint,
        /// Error text reported by the pipeline.
        message: String,
    },

    /// Every sender feeding the controller loop went away.
    #[error("relay event channel closed")]
    ChannelClosed,

    /// An error from the underlying media framework.
    #[error("backend error: {0}")]
    Backend(String),
}

impl RelayError {
    /// Creates a construction error with the given reason.
    pub fn construction(reason: impl Into<String>) -> Self {
        Self::Construction {
            reason: reason.into(),
        }
    }

    /// Creates an invalid format error with the given reason.
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        Self::InvalidFormat {
            reason: reason.into(),
        }
    }

    /// Returns `true` for errors raised before the relay loop starts.
    #[must_use]
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::Construction { .. }
                | Self::MissingStage { .. }
                | Self::NoSourceConfigured
                | Self::NoSinkConfigured
                | Self::InvalidFormat { .. }
                | Self::InvalidConfig { .. }
                | Self::FormatMismatch { .. }
        )
    }
}

/// Errors a [`SinkEndpoint`](crate::SinkEndpoint) returns from a push.
///
/// [`SinkError::AlreadyAtEos`] is benign during drain: the controller logs it and
/// keeps going. Every other variant terminates the relay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// End-of-stream was already signalled on this sink.
    #[error("sink already received end-of-stream")]
    AlreadyAtEos,

    /// The sink pipeline is shutting down and discards input.
    #[error("sink is flushing")]
    Flushing,

    /// The downstream pipeline rejected the buffer.
    #[error("flow error: {reason}")]
    Flow {
        /// Description of what went wrong.
        reason: String,
    },
}

impl SinkError {
    /// Creates a flow error with the given reason.
    pub fn flow(reason: impl Into<String>) -> Self {
        Self::Flow {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_error_display() {
        let err = RelayError::MissingStage {
            name: "relay_sink".to_string(),
        };
        assert_eq!(err.to_string(), "pipeline has no stage named 'relay_sink'");
    }

    #[test]
    fn test_format_mismatch_display_uses_caps() {
        let err = RelayError::FormatMismatch {
            upstream: FormatDescriptor::s16le(2, 44100),
            downstream: FormatDescriptor::s16le(1, 16000),
        };
        let text = err.to_string();
        assert!(text.contains("format=S16LE,channels=2,rate=44100"));
        assert!(text.contains("channels=1,rate=16000"));
    }

    #[test]
    fn test_runtime_error_display() {
        let err = RelayError::PipelineRuntime {
            origin: Endpoint::Sink,
            message: "device busy".to_string(),
        };
        assert_eq!(err.to_string(), "sink pipeline error: device busy");
    }

    #[test]
    fn test_is_construction() {
        assert!(RelayError::construction("empty").is_construction());
        assert!(RelayError::NoSinkConfigured.is_construction());
        assert!(!RelayError::NoBufferAvailable.is_construction());
        assert!(!RelayError::ChannelClosed.is_construction());
    }

    #[test]
    fn test_sink_error_flow() {
        let err = SinkError::flow("not-negotiated");
        assert_eq!(err.to_string(), "flow error: not-negotiated");
    }
}
