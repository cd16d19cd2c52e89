//! Recording sink pipeline for tests.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::pipeline::{Bus, BusCallback, Pipeline, PipelineState};
use crate::sink::{FlowStatus, SinkEndpoint};
use crate::{BufferUnit, BusEvent, FormatDescriptor, RelayError, SinkError};

#[derive(Debug, Default)]
struct Record {
    payloads: Vec<Bytes>,
    formats: Vec<FormatDescriptor>,
    pts: Vec<Option<Duration>>,
    push_attempts: usize,
    late_pushes: usize,
    eos_calls: usize,
    states: Vec<PipelineState>,
}

/// A sink that records every buffer pushed into it.
///
/// The paired [`MockSinkProbe`] reads the record and can post bus events as if
/// the downstream pipeline had produced them.
///
/// # Example
///
/// ```
/// use stream_relay::{BufferUnit, FlowStatus, FormatDescriptor, MockSink, Pipeline, PipelineState, SinkEndpoint};
///
/// let format = FormatDescriptor::s16le(1, 16000);
/// let (mut sink, probe) = MockSink::new(format);
/// sink.set_state(PipelineState::Playing).unwrap();
///
/// let status = sink.push_buffer(BufferUnit::new(vec![0u8; 32], format)).unwrap();
/// assert_eq!(status, FlowStatus::Accepted);
/// assert_eq!(probe.payloads().len(), 1);
/// ```
pub struct MockSink {
    name: String,
    format: FormatDescriptor,
    state: PipelineState,
    eos: bool,
    fail_on: Option<usize>,
    drop_all: bool,
    auto_finish: bool,
    bus: Bus,
    record: Arc<Mutex<Record>>,
}

impl MockSink {
    /// Creates a sink that accepts every buffer in `format`.
    pub fn new(format: FormatDescriptor) -> (Self, MockSinkProbe) {
        Self::with_name("mocksink", format)
    }

    /// Creates a sink with a custom name.
    pub fn with_name(name: impl Into<String>, format: FormatDescriptor) -> (Self, MockSinkProbe) {
        let bus = Bus::new();
        let record = Arc::new(Mutex::new(Record::default()));
        let probe = MockSinkProbe {
            bus: bus.clone(),
            record: record.clone(),
        };
        let sink = Self {
            name: name.into(),
            format,
            state: PipelineState::Null,
            eos: false,
            fail_on: None,
            drop_all: false,
            auto_finish: true,
            bus,
            record,
        };
        (sink, probe)
    }

    /// Fails the `n`-th push (1-based) with a flow error.
    #[must_use]
    pub fn fail_on(mut self, n: usize) -> Self {
        self.fail_on = Some(n);
        self
    }

    /// Reports every push as dropped.
    #[must_use]
    pub fn drop_all(mut self) -> Self {
        self.drop_all = true;
        self
    }

    /// Whether end-of-stream is posted as soon as it is signalled.
    ///
    /// Default: `true`. When off, call [`MockSinkProbe::finish`] to complete.
    #[must_use]
    pub fn auto_finish(mut self, enabled: bool) -> Self {
        self.auto_finish = enabled;
        self
    }
}

impl Pipeline for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
        self.record.lock().states.push(state);
        self.state = state;
        Ok(())
    }

    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
        self.bus.add_watch(callback);
        Ok(())
    }
}

impl SinkEndpoint for MockSink {
    fn caps(&self) -> FormatDescriptor {
        self.format
    }

    fn push_buffer(&mut self, buffer: BufferUnit) -> Result<FlowStatus, SinkError> {
        let mut record = self.record.lock();
        record.push_attempts += 1;

        if self.eos {
            record.late_pushes += 1;
            return Err(SinkError::AlreadyAtEos);
        }
        if !self.state.is_active() {
            return Err(SinkError::Flushing);
        }
        if self.fail_on == Some(record.push_attempts) {
            return Err(SinkError::flow(format!(
                "{}: scripted failure on push #{}",
                self.name, record.push_attempts
            )));
        }
        if self.drop_all {
            return Ok(FlowStatus::Dropped);
        }

        record.formats.push(*buffer.format());
        record.pts.push(buffer.pts());
        record.payloads.push(buffer.into_payload());
        Ok(FlowStatus::Accepted)
    }

    fn signal_end_of_stream(&mut self) {
        self.record.lock().eos_calls += 1;
        if self.eos {
            return;
        }
        self.eos = true;
        if self.auto_finish {
            self.bus.post(BusEvent::EndOfStream);
        }
    }

    fn is_eos(&self) -> bool {
        self.eos
    }
}

/// Read access to what a [`MockSink`] received.
#[derive(Debug, Clone)]
pub struct MockSinkProbe {
    bus: Bus,
    record: Arc<Mutex<Record>>,
}

impl MockSinkProbe {
    /// Payloads of accepted buffers, in push order.
    pub fn payloads(&self) -> Vec<Bytes> {
        self.record.lock().payloads.clone()
    }

    /// Formats of accepted buffers, in push order.
    pub fn formats(&self) -> Vec<FormatDescriptor> {
        self.record.lock().formats.clone()
    }

    /// Timestamps of accepted buffers, in push order.
    pub fn pts(&self) -> Vec<Option<Duration>> {
        self.record.lock().pts.clone()
    }

    /// Number of accepted buffers.
    pub fn accepted(&self) -> usize {
        self.record.lock().payloads.len()
    }

    /// Every call to `push_buffer`, whatever its outcome.
    pub fn push_attempts(&self) -> usize {
        self.record.lock().push_attempts
    }

    /// Pushes rejected because end-of-stream was already signalled.
    pub fn late_pushes(&self) -> usize {
        self.record.lock().late_pushes
    }

    /// Calls to `signal_end_of_stream`, including repeated ones.
    pub fn eos_calls(&self) -> usize {
        self.record.lock().eos_calls
    }

    /// Every state the sink was set to, in order.
    pub fn states(&self) -> Vec<PipelineState> {
        self.record.lock().states.clone()
    }

    /// Posts an event on the sink's bus.
    pub fn post(&self, event: BusEvent) {
        self.bus.post(event);
    }

    /// Posts the sink's end-of-stream, as if rendering had completed.
    pub fn finish(&self) {
        self.post(BusEvent::EndOfStream);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn format() -> FormatDescriptor {
        FormatDescriptor::s16le(2, 44100)
    }

    fn buffer(byte: u8) -> BufferUnit {
        BufferUnit::new(vec![byte; 4], format())
    }

    fn count_eos(sink: &mut MockSink) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();
        sink.add_bus_watch(Arc::new(move |event| {
            if event == BusEvent::EndOfStream {
                count_clone.fetch_add(1, Ordering::SeqCst);
            }
        }))
        .unwrap();
        count
    }

    #[test]
    fn test_records_accepted_buffers() {
        let (mut sink, probe) = MockSink::new(format());
        sink.set_state(PipelineState::Playing).unwrap();

        sink.push_buffer(buffer(1).with_pts(Duration::from_millis(5)))
            .unwrap();
        sink.push_buffer(buffer(2)).unwrap();

        let payloads = probe.payloads();
        assert_eq!(payloads.len(), 2);
        assert_eq!(payloads[1][0], 2);
        assert_eq!(probe.formats(), vec![format(), format()]);
        assert_eq!(probe.pts(), vec![Some(Duration::from_millis(5)), None]);
    }

    #[test]
    fn test_push_when_not_playing() {
        let (mut sink, probe) = MockSink::new(format());
        assert_eq!(sink.push_buffer(buffer(1)), Err(SinkError::Flushing));
        assert_eq!(probe.push_attempts(), 1);
        assert_eq!(probe.accepted(), 0);
    }

    #[test]
    fn test_fail_on_nth_push() {
        let (sink, probe) = MockSink::new(format());
        let mut sink = sink.fail_on(2);
        sink.set_state(PipelineState::Playing).unwrap();

        assert!(sink.push_buffer(buffer(1)).is_ok());
        assert!(matches!(
            sink.push_buffer(buffer(2)),
            Err(SinkError::Flow { .. })
        ));
        assert!(sink.push_buffer(buffer(3)).is_ok());
        assert_eq!(probe.accepted(), 2);
    }

    #[test]
    fn test_drop_all() {
        let (sink, probe) = MockSink::new(format());
        let mut sink = sink.drop_all();
        sink.set_state(PipelineState::Playing).unwrap();

        assert_eq!(sink.push_buffer(buffer(1)), Ok(FlowStatus::Dropped));
        assert_eq!(probe.accepted(), 0);
    }

    #[test]
    fn test_end_of_stream_is_idempotent() {
        let (mut sink, probe) = MockSink::new(format());
        let posted = count_eos(&mut sink);
        sink.set_state(PipelineState::Playing).unwrap();

        sink.signal_end_of_stream();
        sink.signal_end_of_stream();

        assert!(sink.is_eos());
        assert_eq!(probe.eos_calls(), 2);
        assert_eq!(posted.load(Ordering::SeqCst), 1);
        assert_eq!(sink.push_buffer(buffer(1)), Err(SinkError::AlreadyAtEos));
        assert_eq!(probe.late_pushes(), 1);
    }

    #[test]
    fn test_manual_finish() {
        let (sink, probe) = MockSink::new(format());
        let mut sink = sink.auto_finish(false);
        let posted = count_eos(&mut sink);

        sink.signal_end_of_stream();
        assert_eq!(posted.load(Ordering::SeqCst), 0);

        probe.finish();
        assert_eq!(posted.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_states_recorded() {
        let (mut sink, probe) = MockSink::new(format());
        sink.set_state(PipelineState::Playing).unwrap();
        sink.set_state(PipelineState::Null).unwrap();
        assert_eq!(
            probe.states(),
            vec![PipelineState::Playing, PipelineState::Null]
        );
    }
}
