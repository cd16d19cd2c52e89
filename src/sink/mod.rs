//! The downstream side of the relay.
//!
//! A [`SinkEndpoint`] wraps the entry stage of the rendering pipeline. The crate
//! provides two in-process sinks:
//!
//! - [`ChannelSink`]: queues buffers for a [`ChannelSinkHandle`] that plays the
//!   renderer
//! - [`MockSink`]: records every push for inspection through a [`MockSinkProbe`]
//!
//! Implement the trait for other downstream pipelines.

mod channel;
mod mock;

pub use channel::{ChannelSink, ChannelSinkHandle};
pub use mock::{MockSink, MockSinkProbe};

use crate::pipeline::Pipeline;
use crate::{BufferUnit, FormatDescriptor, SinkError};

/// Outcome of a push the sink did not reject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
    /// The buffer entered the downstream flow.
    Accepted,
    /// The pipeline is flowing but discarded the buffer.
    Dropped,
}

/// Entry point of the sink pipeline.
///
/// # Implementation Notes
///
/// - `push_buffer` takes ownership; the sink decides when the buffer is freed
/// - By default a push must not wait for downstream to drain
/// - After [`signal_end_of_stream`](SinkEndpoint::signal_end_of_stream) every
///   push fails with [`SinkError::AlreadyAtEos`]
/// - Once everything before end-of-stream is rendered, the sink posts
///   [`BusEvent::EndOfStream`](crate::BusEvent::EndOfStream) on its bus
///
/// # Example
///
/// ```
/// use stream_relay::{
///     BufferUnit, Bus, BusCallback, BusEvent, FlowStatus, FormatDescriptor, Pipeline,
///     PipelineState, RelayError, SinkEndpoint, SinkError,
/// };
///
/// struct CountingSink {
///     format: FormatDescriptor,
///     state: PipelineState,
///     bus: Bus,
///     count: usize,
///     eos: bool,
/// }
///
/// impl Pipeline for CountingSink {
///     fn name(&self) -> &str {
///         "counter"
///     }
///
///     fn state(&self) -> PipelineState {
///         self.state
///     }
///
///     fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
///         self.state = state;
///         Ok(())
///     }
///
///     fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
///         self.bus.add_watch(callback);
///         Ok(())
///     }
/// }
///
/// impl SinkEndpoint for CountingSink {
///     fn caps(&self) -> FormatDescriptor {
///         self.format
///     }
///
///     fn push_buffer(&mut self, _buffer: BufferUnit) -> Result<FlowStatus, SinkError> {
///         if self.eos {
///             return Err(SinkError::AlreadyAtEos);
///         }
///         self.count += 1;
///         Ok(FlowStatus::Accepted)
///     }
///
///     fn signal_end_of_stream(&mut self) {
///         if !self.eos {
///             self.eos = true;
///             // Nothing is queued, so rendering is already complete.
///             self.bus.post(BusEvent::EndOfStream);
///         }
///     }
///
///     fn is_eos(&self) -> bool {
///         self.eos
///     }
/// }
/// ```
pub trait SinkEndpoint: Pipeline {
    /// Format every pushed buffer must carry.
    fn caps(&self) -> FormatDescriptor;

    /// Hands a buffer to the downstream pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::AlreadyAtEos`] after end-of-stream, and
    /// [`SinkError::Flushing`] or [`SinkError::Flow`] if the pipeline cannot
    /// take buffers.
    fn push_buffer(&mut self, buffer: BufferUnit) -> Result<FlowStatus, SinkError>;

    /// Marks the end of input. Calling it again has no effect.
    fn signal_end_of_stream(&mut self);

    /// Returns `true` once end-of-stream was signalled.
    fn is_eos(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_endpoint_is_object_safe() {
        fn assert_send<T: Send + ?Sized>() {}
        assert_send::<Box<dyn SinkEndpoint>>();
    }

    #[test]
    fn test_flow_status_eq() {
        assert_ne!(FlowStatus::Accepted, FlowStatus::Dropped);
    }
}
