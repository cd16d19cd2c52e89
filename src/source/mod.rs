//! The upstream side of the relay.
//!
//! A [`SourceEndpoint`] wraps the terminal stage of the producing pipeline. It
//! announces every buffer it has ready through a callback, and hands that
//! buffer out exactly once when pulled.

mod mock;

pub use mock::MockSource;

use crate::pipeline::{Pipeline, ReadyCallback};
use crate::{BufferUnit, FormatDescriptor, RelayError};

/// Exit point of the source pipeline.
///
/// # Contract
///
/// - The ready callback fires once per produced buffer, in production order
/// - Every notification is matched by exactly one successful pull
/// - End-of-stream is posted on the bus after the last notification
/// - Production is paused outside [`PipelineState::Playing`]
///
/// [`PipelineState::Playing`]: crate::PipelineState::Playing
pub trait SourceEndpoint: Pipeline {
    /// Format of every buffer this endpoint produces.
    fn caps(&self) -> FormatDescriptor;

    /// Registers the buffer-ready notification, replacing an earlier one.
    fn on_buffer_ready(&mut self, callback: ReadyCallback);

    /// Takes the oldest ready buffer.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::NoBufferAvailable`] if nothing is pending, which
    /// includes any pull after end-of-stream.
    fn pull_ready_buffer(&mut self) -> Result<BufferUnit, RelayError>;
}
