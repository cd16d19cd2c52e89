//! In-process sink pipeline backed by a shared queue.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tokio::sync::Notify;

use crate::pipeline::{Bus, BusCallback, Pipeline, PipelineState};
use crate::sink::{FlowStatus, SinkEndpoint};
use crate::{BufferUnit, BusEvent, FormatDescriptor, RelayError, SinkConfig, SinkError};

#[derive(Default)]
struct Queue {
    buffers: VecDeque<BufferUnit>,
    queued_bytes: u64,
    flushing: bool,
    shut_down: bool,
    eos: bool,
    finished: bool,
    consumer_gone: bool,
}

impl Queue {
    /// Marks the end of rendering. Returns `true` the first time only.
    fn finish(&mut self) -> bool {
        if self.finished {
            return false;
        }
        self.finished = true;
        true
    }

    fn is_drained(&self) -> bool {
        self.eos && self.buffers.is_empty()
    }
}

struct Shared {
    queue: Mutex<Queue>,
    space: Condvar,
    data: Condvar,
    notify: Notify,
    bus: Bus,
}

impl Shared {
    fn wake_all(&self) {
        self.space.notify_all();
        self.data.notify_all();
        self.notify.notify_one();
    }

    /// Pops the next buffer, or decides that there will be none.
    ///
    /// `None` means wait, `Some(None)` means the stream is over.
    fn poll(&self) -> Option<Option<BufferUnit>> {
        let mut queue = self.queue.lock();
        let step = self.poll_locked(&mut queue);
        let post_eos = !queue.shut_down && queue.is_drained() && queue.finish();
        drop(queue);

        if post_eos {
            tracing::debug!("channel sink drained, posting end-of-stream");
            self.bus.post(BusEvent::EndOfStream);
        }
        step
    }

    fn poll_locked(&self, queue: &mut Queue) -> Option<Option<BufferUnit>> {
        if let Some(buffer) = queue.buffers.pop_front() {
            queue.queued_bytes -= buffer.len() as u64;
            self.space.notify_all();
            return Some(Some(buffer));
        }
        if queue.eos || queue.shut_down {
            return Some(None);
        }
        None
    }
}

/// A sink pipeline whose renderer is a [`ChannelSinkHandle`].
///
/// Pushes go into a queue the handle reads from. When the handle has taken the
/// last buffer after end-of-stream, the sink posts its own end-of-stream on the
/// bus, which completes the relay.
///
/// By default pushes never wait. With [`SinkConfig::block`] set, a push waits
/// while [`SinkConfig::max_bytes`] or more are queued; the handle must then be
/// read from another thread than the one driving the relay.
///
/// # Example
///
/// ```
/// use stream_relay::{ChannelSink, FormatDescriptor};
///
/// let (sink, handle) = ChannelSink::new(FormatDescriptor::s16le(2, 44100));
///
/// // Give `sink` to the relay builder, then render:
/// // while let Some(buffer) = handle.recv().await { ... }
/// # drop((sink, handle));
/// ```
pub struct ChannelSink {
    name: String,
    format: FormatDescriptor,
    config: SinkConfig,
    state: PipelineState,
    shared: Arc<Shared>,
}

impl ChannelSink {
    /// Creates a non-blocking channel sink.
    pub fn new(format: FormatDescriptor) -> (Self, ChannelSinkHandle) {
        Self::with_config(format, SinkConfig::default())
    }

    /// Creates a channel sink with feed stage settings.
    pub fn with_config(format: FormatDescriptor, config: SinkConfig) -> (Self, ChannelSinkHandle) {
        Self::with_name("channel", format, config)
    }

    /// Creates a channel sink with a custom name.
    pub fn with_name(
        name: impl Into<String>,
        format: FormatDescriptor,
        config: SinkConfig,
    ) -> (Self, ChannelSinkHandle) {
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue {
                flushing: true,
                ..Queue::default()
            }),
            space: Condvar::new(),
            data: Condvar::new(),
            notify: Notify::new(),
            bus: Bus::new(),
        });

        let sink = Self {
            name: name.into(),
            format,
            config,
            state: PipelineState::Null,
            shared: shared.clone(),
        };
        (sink, ChannelSinkHandle { shared })
    }

    /// Feed stage settings.
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }
}

impl Pipeline for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
        {
            let mut queue = self.shared.queue.lock();
            match state {
                PipelineState::Null => {
                    if self.state != PipelineState::Null {
                        queue.shut_down = true;
                    }
                    queue.flushing = true;
                    queue.buffers.clear();
                    queue.queued_bytes = 0;
                }
                _ => {
                    if self.state == PipelineState::Null {
                        queue.shut_down = false;
                        queue.eos = false;
                        queue.finished = false;
                    }
                    queue.flushing = false;
                }
            }
        }
        self.shared.wake_all();

        tracing::debug!("{}: {} -> {}", self.name, self.state, state);
        self.state = state;
        Ok(())
    }

    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
        self.shared.bus.add_watch(callback);
        Ok(())
    }
}

impl SinkEndpoint for ChannelSink {
    fn caps(&self) -> FormatDescriptor {
        self.format
    }

    fn push_buffer(&mut self, buffer: BufferUnit) -> Result<FlowStatus, SinkError> {
        let mut queue = self.shared.queue.lock();

        if self.config.block {
            while queue.queued_bytes >= self.config.max_bytes
                && !queue.flushing
                && !queue.consumer_gone
                && !queue.eos
            {
                self.shared.space.wait(&mut queue);
            }
        }

        if queue.eos {
            return Err(SinkError::AlreadyAtEos);
        }
        if queue.flushing {
            return Err(SinkError::Flushing);
        }
        if queue.consumer_gone {
            return Ok(FlowStatus::Dropped);
        }

        queue.queued_bytes += buffer.len() as u64;
        queue.buffers.push_back(buffer);
        drop(queue);

        self.shared.data.notify_one();
        self.shared.notify.notify_one();
        Ok(FlowStatus::Accepted)
    }

    fn signal_end_of_stream(&mut self) {
        let post_eos = {
            let mut queue = self.shared.queue.lock();
            if queue.eos {
                return;
            }
            queue.eos = true;
            queue.consumer_gone && queue.finish()
        };
        self.shared.wake_all();

        if post_eos {
            self.shared.bus.post(BusEvent::EndOfStream);
        }
    }

    fn is_eos(&self) -> bool {
        self.shared.queue.lock().eos
    }
}

/// The rendering end of a [`ChannelSink`].
///
/// Dropping the handle turns later pushes into [`FlowStatus::Dropped`] and
/// completes end-of-stream immediately.
pub struct ChannelSinkHandle {
    shared: Arc<Shared>,
}

impl ChannelSinkHandle {
    /// Waits for the next buffer.
    ///
    /// Returns `None` after the last buffer before end-of-stream, or once the
    /// sink pipeline was shut down.
    pub async fn recv(&self) -> Option<BufferUnit> {
        loop {
            if let Some(step) = self.shared.poll() {
                return step;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Blocks the current thread until a buffer arrives or `timeout` passes.
    ///
    /// Returns `None` on timeout as well as at the end of the stream.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<BufferUnit> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(step) = self.shared.poll() {
                return step;
            }
            let mut queue = self.shared.queue.lock();
            if queue.buffers.is_empty()
                && !queue.eos
                && !queue.shut_down
                && self.shared.data.wait_until(&mut queue, deadline).timed_out()
            {
                return None;
            }
        }
    }

    /// Takes the next buffer if one is queued.
    pub fn try_recv(&self) -> Option<BufferUnit> {
        self.shared.poll().flatten()
    }

    /// Posts a renderer error on the sink's bus.
    pub fn fail(&self, message: impl Into<String>) {
        self.shared.bus.post(BusEvent::error(message));
    }

    /// Returns `true` once the sink has posted its end-of-stream.
    pub fn is_finished(&self) -> bool {
        self.shared.queue.lock().finished
    }

    /// Number of buffers waiting to be rendered.
    pub fn len(&self) -> usize {
        self.shared.queue.lock().buffers.len()
    }

    /// Returns `true` if no buffer is waiting.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes waiting to be rendered.
    pub fn queued_bytes(&self) -> u64 {
        self.shared.queue.lock().queued_bytes
    }
}

impl Drop for ChannelSinkHandle {
    fn drop(&mut self) {
        let post_eos = {
            let mut queue = self.shared.queue.lock();
            queue.consumer_gone = true;
            queue.buffers.clear();
            queue.queued_bytes = 0;
            queue.eos && queue.finish()
        };
        self.shared.wake_all();

        if post_eos {
            self.shared.bus.post(BusEvent::EndOfStream);
        }
    }
}
