//! Bus events from the pipelines and monitoring events from the relay.
//!
//! [`BusEvent`] is what a pipeline reports to the controller. [`RelayEvent`] is
//! what the controller reports to the application: informational, for logging and
//! metrics, never needed for correct operation.

use std::fmt;
use std::sync::Arc;

use crate::pipeline::RelayState;

/// Which side of the relay an event or error comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// The upstream (producing) pipeline.
    Source,
    /// The downstream (rendering) pipeline.
    Sink,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Sink => f.write_str("sink"),
        }
    }
}

/// Bus traffic the relay reacts to.
///
/// Pipelines post many kinds of messages; only these two matter for the
/// hand-over. Backends drop everything else before it reaches the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    /// The pipeline has produced (source) or rendered (sink) everything.
    EndOfStream,

    /// The pipeline hit an internal error and cannot continue.
    Error {
        /// Human-readable error text.
        message: String,
        /// Additional debugging detail, if the backend has any.
        debug: Option<String>,
    },
}

impl BusEvent {
    /// Creates an error event without debug detail.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            debug: None,
        }
    }
}

/// Runtime events emitted by a running relay.
///
/// # Example
///
/// ```
/// use stream_relay::RelayEvent;
///
/// fn handle_event(event: RelayEvent) {
///     match event {
///         RelayEvent::StateChanged { from, to } => {
///             eprintln!("relay {from} -> {to}");
///         }
///         RelayEvent::BufferDropped { sequence } => {
///             eprintln!("sink dropped buffer #{sequence}");
///         }
///         RelayEvent::LateBuffer { sequence } => {
///             eprintln!("buffer #{sequence} arrived after end-of-stream");
///         }
///         RelayEvent::EndOfStreamForwarded { buffers_relayed } => {
///             eprintln!("source done after {buffers_relayed} buffers");
///         }
///         RelayEvent::PipelineError { origin, message } => {
///             eprintln!("{origin} failed: {message}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// The controller moved between lifecycle states.
    StateChanged {
        /// Previous state.
        from: RelayState,
        /// New state.
        to: RelayState,
    },

    /// The sink accepted a buffer into its flow but discarded it.
    BufferDropped {
        /// 1-based pull order of the buffer.
        sequence: u64,
    },

    /// A buffer was pushed after the sink had already received end-of-stream.
    ///
    /// Happens when a notification races the drain. The buffer is discarded and
    /// the relay keeps running.
    LateBuffer {
        /// 1-based pull order of the buffer.
        sequence: u64,
    },

    /// The source finished and end-of-stream was passed to the sink.
    EndOfStreamForwarded {
        /// Buffers the sink accepted before end-of-stream.
        buffers_relayed: u64,
    },

    /// One of the pipelines reported an error; the relay is terminating.
    PipelineError {
        /// Which pipeline failed.
        origin: Endpoint,
        /// Error text.
        message: String,
    },
}

/// Callback type for receiving relay events.
///
/// Register one via [`RelayBuilder::on_event()`].
///
/// [`RelayBuilder::on_event()`]: crate::RelayBuilder::on_event
pub type EventCallback = Arc<dyn Fn(RelayEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use stream_relay::{event_callback, RelayEvent};
///
/// let callback = event_callback(|event| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(RelayEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_display() {
        assert_eq!(Endpoint::Source.to_string(), "source");
        assert_eq!(Endpoint::Sink.to_string(), "sink");
    }

    #[test]
    fn test_bus_event_error_helper() {
        let event = BusEvent::error("decoder crashed");
        assert_eq!(
            event,
            BusEvent::Error {
                message: "decoder crashed".to_string(),
                debug: None,
            }
        );
    }

    #[test]
    fn test_relay_event_clone() {
        let event = RelayEvent::PipelineError {
            origin: Endpoint::Source,
            message: "boom".to_string(),
        };
        let cloned = event.clone();
        if let RelayEvent::PipelineError { origin, message } = cloned {
            assert_eq!(origin, Endpoint::Source);
            assert_eq!(message, "boom");
        } else {
            panic!("Expected PipelineError variant");
        }
    }

    #[test]
    fn test_event_callback_helper() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_clone = called.clone();

        let callback = event_callback(move |_| {
            called_clone.store(true, Ordering::SeqCst);
        });

        callback(RelayEvent::LateBuffer { sequence: 1 });
        assert!(called.load(Ordering::SeqCst));
    }
}
