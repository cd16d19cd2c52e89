//! Relay controller: the state machine that owns both pipelines.

use std::fmt;
use std::ops::ControlFlow;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::pipeline::{BusCallback, PipelineState, ReadyCallback};
use crate::session::{Completion, SessionState};
use crate::{
    BufferUnit, BusEvent, Endpoint, EventCallback, FlowStatus, FormatDescriptor, RelayConfig,
    RelayError, RelayEvent, SinkEndpoint, SinkError, SourceEndpoint, TransferMode,
};

/// Lifecycle of a relay.
///
/// ```text
/// Idle ──start──▶ Running ──source EOS──▶ Draining ──sink EOS──▶ Terminated
///                    │                                               ▲
///                    └───────────── error / sink EOS / stop ─────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RelayState {
    /// Built but not started.
    #[default]
    Idle,
    /// Both pipelines are playing and buffers are relayed.
    Running,
    /// The source finished; waiting for the sink to render what it holds.
    Draining,
    /// Both pipelines were set to null. Absorbing.
    Terminated,
}

impl RelayState {
    /// Returns `true` while buffer notifications are acted upon.
    #[must_use]
    pub fn is_relaying(&self) -> bool {
        matches!(self, Self::Running | Self::Draining)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Draining => 2,
            Self::Terminated => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Terminated,
        }
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// In-order traffic: buffer notifications and end-of-stream.
#[derive(Debug)]
enum FlowMessage {
    BufferReady,
    EndOfStream(Endpoint),
}

/// Out-of-band traffic, polled ahead of the flow channel.
#[derive(Debug)]
pub(crate) enum ControlMessage {
    Error {
        origin: Endpoint,
        message: String,
        debug: Option<String>,
    },
    Stop,
}

enum Next {
    Control(ControlMessage),
    Flow(FlowMessage),
    Closed,
}

type Step = ControlFlow<Result<Completion, RelayError>>;

/// Drives the hand-over between one source and one sink endpoint.
pub(crate) struct Controller {
    source: Box<dyn SourceEndpoint>,
    sink: Box<dyn SinkEndpoint>,
    format: FormatDescriptor,
    transfer: TransferMode,
    state: RelayState,
    shared: Arc<SessionState>,
    event_callback: Option<EventCallback>,
    flow_rx: mpsc::UnboundedReceiver<FlowMessage>,
    control_rx: mpsc::UnboundedReceiver<ControlMessage>,
    torn_down: bool,
}

impl Controller {
    /// Validates both endpoints, wires their callbacks and sets them playing.
    ///
    /// On success the controller is `Running` and the returned sender can
    /// inject stop requests. On failure both pipelines are back at null and
    /// no buffer notification has been processed.
    pub(crate) fn start(
        mut source: Box<dyn SourceEndpoint>,
        mut sink: Box<dyn SinkEndpoint>,
        format: FormatDescriptor,
        config: &RelayConfig,
        shared: Arc<SessionState>,
        event_callback: Option<EventCallback>,
    ) -> Result<(Self, mpsc::UnboundedSender<ControlMessage>), RelayError> {
        config.validate()?;
        format.validate()?;

        if source.caps() != format {
            return Err(RelayError::FormatMismatch {
                upstream: source.caps(),
                downstream: format,
            });
        }
        if sink.caps() != format {
            return Err(RelayError::FormatMismatch {
                upstream: format,
                downstream: sink.caps(),
            });
        }

        let (flow_tx, flow_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();

        let ready_tx = flow_tx.clone();
        let on_ready: ReadyCallback = Arc::new(move || {
            let _ = ready_tx.send(FlowMessage::BufferReady);
        });
        source.on_buffer_ready(on_ready);
        source.add_bus_watch(forward_bus(Endpoint::Source, &flow_tx, &control_tx))?;
        sink.add_bus_watch(forward_bus(Endpoint::Sink, &flow_tx, &control_tx))?;

        let mut controller = Self {
            source,
            sink,
            format,
            transfer: config.transfer,
            state: RelayState::Idle,
            shared,
            event_callback,
            flow_rx,
            control_rx,
            torn_down: false,
        };

        if let Err(e) = controller.play() {
            tracing::error!("relay failed to start: {}", e);
            controller.teardown();
            return Err(e);
        }

        controller.transition(RelayState::Running);
        Ok((controller, control_tx))
    }

    /// Sink first, so the feed stage is ready before the first buffer arrives.
    fn play(&mut self) -> Result<(), RelayError> {
        self.sink.set_state(PipelineState::Playing)?;
        self.source.set_state(PipelineState::Playing)
    }

    /// Runs the event loop until the relay terminates.
    ///
    /// Both pipelines are at null when this returns.
    pub(crate) async fn run(mut self) -> Result<Completion, RelayError> {
        let outcome = loop {
            let next = tokio::select! {
                biased;
                Some(msg) = self.control_rx.recv() => Next::Control(msg),
                Some(msg) = self.flow_rx.recv() => Next::Flow(msg),
                else => Next::Closed,
            };

            let step = match next {
                Next::Control(msg) => self.handle_control(msg),
                Next::Flow(FlowMessage::BufferReady) => self.relay_buffer(),
                Next::Flow(FlowMessage::EndOfStream(origin)) => self.handle_end_of_stream(origin),
                Next::Closed => ControlFlow::Break(Err(RelayError::ChannelClosed)),
            };

            if let ControlFlow::Break(outcome) = step {
                break outcome;
            }
        };

        self.terminate();
        outcome
    }

    fn handle_control(&mut self, msg: ControlMessage) -> Step {
        match msg {
            ControlMessage::Error {
                origin,
                message,
                debug: detail,
            } => {
                tracing::error!(
                    "{} pipeline error: {} ({})",
                    origin,
                    message,
                    detail.as_deref().unwrap_or("no debug info")
                );
                self.fail(RelayError::PipelineRuntime { origin, message })
            }
            ControlMessage::Stop => {
                tracing::info!("relay stop requested in state {}", self.state);
                ControlFlow::Break(Ok(Completion::Stopped))
            }
        }
    }

    fn handle_end_of_stream(&mut self, origin: Endpoint) -> Step {
        match origin {
            Endpoint::Source => {
                if self.state != RelayState::Running {
                    tracing::debug!("ignoring repeated source end-of-stream");
                    return ControlFlow::Continue(());
                }
                self.transition(RelayState::Draining);
                self.sink.signal_end_of_stream();

                let buffers_relayed = self.shared.buffers_pushed.load(Ordering::SeqCst);
                tracing::info!(
                    "source finished after {} buffers, draining sink",
                    buffers_relayed
                );
                self.emit(RelayEvent::EndOfStreamForwarded { buffers_relayed });
                ControlFlow::Continue(())
            }
            Endpoint::Sink => {
                if self.state == RelayState::Running {
                    tracing::info!("sink finished before the source");
                } else {
                    tracing::info!("sink drained");
                }
                ControlFlow::Break(Ok(Completion::EndOfStream))
            }
        }
    }

    /// Pulls the ready buffer and pushes it downstream.
    fn relay_buffer(&mut self) -> Step {
        if !self.state.is_relaying() {
            return ControlFlow::Continue(());
        }

        let buffer = match self.source.pull_ready_buffer() {
            Ok(buffer) => buffer,
            Err(e) => return self.fail(e),
        };
        let sequence = self.shared.buffers_pulled.fetch_add(1, Ordering::SeqCst) + 1;

        if *buffer.format() != self.format {
            return self.fail(RelayError::FormatMismatch {
                upstream: *buffer.format(),
                downstream: self.format,
            });
        }

        let len = buffer.len() as u64;
        let buffer = self.transfer(buffer);
        tracing::trace!("relaying buffer #{} ({} bytes)", sequence, len);

        match self.sink.push_buffer(buffer) {
            Ok(FlowStatus::Accepted) => {
                self.shared.buffers_pushed.fetch_add(1, Ordering::SeqCst);
                self.shared.bytes_relayed.fetch_add(len, Ordering::SeqCst);
                ControlFlow::Continue(())
            }
            Ok(FlowStatus::Dropped) => {
                self.shared.buffers_dropped.fetch_add(1, Ordering::SeqCst);
                tracing::debug!("sink dropped buffer #{}", sequence);
                self.emit(RelayEvent::BufferDropped { sequence });
                ControlFlow::Continue(())
            }
            Err(SinkError::AlreadyAtEos) => {
                self.shared.late_buffers.fetch_add(1, Ordering::SeqCst);
                tracing::warn!("buffer #{} arrived after end-of-stream, discarded", sequence);
                self.emit(RelayEvent::LateBuffer { sequence });
                ControlFlow::Continue(())
            }
            Err(e) => self.fail(RelayError::PipelineRuntime {
                origin: Endpoint::Sink,
                message: e.to_string(),
            }),
        }
    }

    fn transfer(&self, buffer: BufferUnit) -> BufferUnit {
        match self.transfer {
            TransferMode::Copy => buffer.deep_copy(),
            TransferMode::Handover => buffer,
        }
    }

    fn fail(&mut self, error: RelayError) -> Step {
        let origin = match &error {
            RelayError::PipelineRuntime { origin, .. } | RelayError::StateChange { origin, .. } => {
                *origin
            }
            _ => Endpoint::Source,
        };
        let message = match &error {
            RelayError::PipelineRuntime { message, .. } => message.clone(),
            other => other.to_string(),
        };
        tracing::error!("relay terminating: {}", error);
        self.emit(RelayEvent::PipelineError { origin, message });
        ControlFlow::Break(Err(error))
    }

    fn transition(&mut self, to: RelayState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        self.shared.set_state(to);
        tracing::info!("relay {} -> {}", from, to);
        self.emit(RelayEvent::StateChanged { from, to });
    }

    fn emit(&self, event: RelayEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    fn terminate(&mut self) {
        self.teardown();
        self.transition(RelayState::Terminated);
    }

    /// Forces both pipelines to null, once.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.source.set_state(PipelineState::Null) {
            tracing::warn!("source teardown failed: {}", e);
        }
        if let Err(e) = self.sink.set_state(PipelineState::Null) {
            tracing::warn!("sink teardown failed: {}", e);
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        if !self.torn_down {
            self.terminate();
        }
    }
}

/// Routes end-of-stream into the flow channel and errors into the control channel.
fn forward_bus(
    origin: Endpoint,
    flow_tx: &mpsc::UnboundedSender<FlowMessage>,
    control_tx: &mpsc::UnboundedSender<ControlMessage>,
) -> BusCallback {
    let flow_tx = flow_tx.clone();
    let control_tx = control_tx.clone();
    Arc::new(move |event| match event {
        BusEvent::EndOfStream => {
            let _ = flow_tx.send(FlowMessage::EndOfStream(origin));
        }
        BusEvent::Error { message, debug } => {
            let _ = control_tx.send(ControlMessage::Error {
                origin,
                message,
                debug,
            });
        }
    })
}
