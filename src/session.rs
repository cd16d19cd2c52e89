//! Relay session management.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pipeline::{ControlMessage, Controller, RelayState};
use crate::RelayError;

/// Statistics about a relay session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Buffers taken from the source.
    pub buffers_pulled: u64,
    /// Buffers the sink accepted.
    pub buffers_pushed: u64,
    /// Buffers the sink took but discarded.
    pub buffers_dropped: u64,
    /// Buffers rejected because the sink was already at end-of-stream.
    pub late_buffers: u64,
    /// Payload bytes of accepted buffers.
    pub bytes_relayed: u64,
}

/// How a relay ended when it ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The sink rendered everything up to end-of-stream.
    EndOfStream,
    /// A [`StopHandle`] ended the relay early.
    Stopped,
}

/// Internal state shared between the session, its controller and monitors.
pub(crate) struct SessionState {
    state: AtomicU8,
    pub buffers_pulled: AtomicU64,
    pub buffers_pushed: AtomicU64,
    pub buffers_dropped: AtomicU64,
    pub late_buffers: AtomicU64,
    pub bytes_relayed: AtomicU64,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(RelayState::Idle.as_u8()),
            buffers_pulled: AtomicU64::new(0),
            buffers_pushed: AtomicU64::new(0),
            buffers_dropped: AtomicU64::new(0),
            late_buffers: AtomicU64::new(0),
            bytes_relayed: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> RelayState {
        RelayState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn set_state(&self, state: RelayState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            buffers_pulled: self.buffers_pulled.load(Ordering::SeqCst),
            buffers_pushed: self.buffers_pushed.load(Ordering::SeqCst),
            buffers_dropped: self.buffers_dropped.load(Ordering::SeqCst),
            late_buffers: self.late_buffers.load(Ordering::SeqCst),
            bytes_relayed: self.bytes_relayed.load(Ordering::SeqCst),
        }
    }
}

/// Read-only view of a session, usable while [`RelaySession::run`] holds it.
#[derive(Clone)]
pub struct RelayMonitor {
    state: Arc<SessionState>,
}

impl RelayMonitor {
    /// Current controller state.
    pub fn state(&self) -> RelayState {
        self.state.state()
    }

    /// Current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.state.stats()
    }
}

/// Requests termination of a running relay from anywhere.
#[derive(Clone)]
pub struct StopHandle {
    control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl StopHandle {
    /// Asks the relay to terminate.
    ///
    /// The relay finishes the buffer it is handling, sets both pipelines to
    /// null and [`RelaySession::run`] returns [`Completion::Stopped`]. Returns
    /// `false` if the relay has already terminated.
    pub fn stop(&self) -> bool {
        self.control_tx.send(ControlMessage::Stop).is_ok()
    }
}

/// Handle to a running relay.
///
/// The `RelaySession` is returned by [`RelayBuilder::start()`] with both
/// pipelines already playing. Buffers start to queue right away; they are
/// relayed once [`run()`](RelaySession::run) is awaited.
///
/// # Lifecycle
///
/// 1. Created by [`RelayBuilder::start()`] in state [`RelayState::Running`]
/// 2. [`run()`](RelaySession::run) relays until end-of-stream, an error, or a stop request
/// 3. Both pipelines are at null when `run()` returns
/// 4. Dropping a session that never ran also tears both pipelines down
///
/// # Example
///
/// ```
/// use stream_relay::{ChannelSink, FormatPreset, MockSource, StreamRelay};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), stream_relay::RelayError> {
/// let format = FormatPreset::CdQuality.descriptor();
/// let (sink, handle) = ChannelSink::new(format);
/// drop(handle); // nobody renders: pushes are dropped and EOS completes at once
///
/// let session = StreamRelay::builder()
///     .source(MockSource::new(format).with_buffers(4, 1024))
///     .sink(sink)
///     .start()?;
///
/// let monitor = session.monitor();
/// session.run().await?;
/// assert_eq!(monitor.stats().buffers_pulled, 4);
/// # Ok(())
/// # }
/// ```
///
/// [`RelayBuilder::start()`]: crate::RelayBuilder::start
pub struct RelaySession {
    controller: Controller,
    shared: Arc<SessionState>,
    control_tx: mpsc::UnboundedSender<ControlMessage>,
}

impl RelaySession {
    pub(crate) fn new(
        controller: Controller,
        shared: Arc<SessionState>,
        control_tx: mpsc::UnboundedSender<ControlMessage>,
    ) -> Self {
        Self {
            controller,
            shared,
            control_tx,
        }
    }

    /// Current controller state.
    pub fn state(&self) -> RelayState {
        self.shared.state()
    }

    /// Current session statistics.
    pub fn stats(&self) -> SessionStats {
        self.shared.stats()
    }

    /// A monitor that stays valid after `run()` consumed the session.
    pub fn monitor(&self) -> RelayMonitor {
        RelayMonitor {
            state: self.shared.clone(),
        }
    }

    /// A handle that can end the relay early.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            control_tx: self.control_tx.clone(),
        }
    }

    /// Relays buffers until the relay terminates.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error: a pipeline error from either side, a
    /// rejected push, or a buffer in the wrong format. Both pipelines are at
    /// null in every case.
    pub async fn run(self) -> Result<Completion, RelayError> {
        self.controller.run().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert_eq!(state.state(), RelayState::Idle);
        assert_eq!(state.stats(), SessionStats::default());
    }

    #[test]
    fn test_session_state_set() {
        let state = SessionState::new();
        state.set_state(RelayState::Draining);
        state.buffers_pulled.fetch_add(3, Ordering::SeqCst);
        assert_eq!(state.state(), RelayState::Draining);
        assert_eq!(state.stats().buffers_pulled, 3);
    }

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.buffers_pushed, 0);
        assert_eq!(stats.bytes_relayed, 0);
    }

    #[test]
    fn test_stop_handle_after_receiver_gone() {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = StopHandle { control_tx };
        assert!(handle.stop());
        drop(control_rx);
        assert!(!handle.stop());
    }
}
