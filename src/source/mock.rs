//! Mock source pipeline for testing without a media framework.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::format::{encode_sample, silence};
use crate::pipeline::{Bus, BusCallback, Pipeline, PipelineState, ReadyCallback};
use crate::source::SourceEndpoint;
use crate::{BufferUnit, BusEvent, FormatDescriptor, FormatPreset, RelayError, SourceConfig};

const DEFAULT_CAPACITY: usize = 8;
const DEFAULT_CHUNK: Duration = Duration::from_millis(20);
const FULL_RETRY: Duration = Duration::from_millis(1);

/// A scripted source pipeline that produces buffers on its own thread.
///
/// Buffers are produced only while the source is playing. Each one is placed
/// in a bounded queue, then announced through the ready callback. When the
/// queue is full the producer waits for the relay to pull, so nothing is ever
/// dropped. After the last buffer the source posts end-of-stream on its bus.
///
/// # Example
///
/// ```
/// use stream_relay::{FormatDescriptor, MockSource};
/// use std::time::Duration;
///
/// let source = MockSource::new(FormatDescriptor::s16le(1, 16000))
///     // 100ms of silence in 20ms buffers
///     .generate_silence(Duration::from_millis(100))
///     // 100ms of a 440Hz sine wave
///     .generate_sine(440.0, Duration::from_millis(100));
///
/// assert_eq!(source.buffer_count(), 10);
/// assert_eq!(source.duration(), Duration::from_millis(200));
/// ```
pub struct MockSource {
    name: String,
    format: FormatDescriptor,
    config: SourceConfig,
    script: Vec<Bytes>,
    chunk_duration: Duration,
    capacity: usize,
    failure: Option<(usize, String)>,
    state: PipelineState,
    bus: Bus,
    ready: Arc<Mutex<Option<ReadyCallback>>>,
    consumer: Option<HeapCons<BufferUnit>>,
    worker: Option<Worker>,
}

impl MockSource {
    /// Creates an empty source that produces buffers in `format`.
    pub fn new(format: FormatDescriptor) -> Self {
        Self {
            name: "mocksrc".to_string(),
            format,
            config: SourceConfig::default(),
            script: Vec::new(),
            chunk_duration: DEFAULT_CHUNK,
            capacity: DEFAULT_CAPACITY,
            failure: None,
            state: PipelineState::Null,
            bus: Bus::new(),
            ready: Arc::new(Mutex::new(None)),
            consumer: None,
            worker: None,
        }
    }

    /// Creates a source configured for transcription (16kHz mono).
    pub fn transcription() -> Self {
        Self::new(FormatPreset::Transcription.descriptor())
    }

    /// Sets the name reported by [`Pipeline::name`].
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Applies hand-over stage settings.
    #[must_use]
    pub fn with_config(mut self, config: SourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets how many produced buffers may wait for a pull. Minimum 1.
    #[must_use]
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the buffer length used by the generators.
    #[must_use]
    pub fn chunk_duration(mut self, duration: Duration) -> Self {
        self.chunk_duration = duration;
        self
    }

    /// Appends `count` buffers of `size` bytes, each filled with its index.
    #[must_use]
    pub fn with_buffers(mut self, count: usize, size: usize) -> Self {
        let start = self.script.len();
        for i in start..start + count {
            self.script.push(Bytes::from(vec![(i % 256) as u8; size]));
        }
        self
    }

    /// Appends one buffer with the given payload.
    #[must_use]
    pub fn push_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.script.push(payload.into());
        self
    }

    /// Appends silence for the given duration.
    #[must_use]
    pub fn generate_silence(mut self, duration: Duration) -> Self {
        if !self.can_generate() {
            return self;
        }
        let data = silence(&self.format, self.format.frames_in(duration));
        self.push_chunked(data);
        self
    }

    /// Appends a full-scale sine wave at `frequency` Hz on every channel.
    #[must_use]
    pub fn generate_sine(mut self, frequency: f64, duration: Duration) -> Self {
        if !self.can_generate() {
            return self;
        }
        let frames = self.format.frames_in(duration);
        let sample_rate = f64::from(self.format.sample_rate);
        let mut data = Vec::with_capacity(frames * self.format.bytes_per_frame());

        for i in 0..frames {
            let t = i as f64 / sample_rate;
            let value = (2.0 * std::f64::consts::PI * frequency * t).sin();
            for _ in 0..self.format.channels {
                encode_sample(&self.format, value, &mut data);
            }
        }
        self.push_chunked(data);
        self
    }

    /// Posts an error instead of producing buffer `after` (0-based).
    ///
    /// With `after` at or past the end of the script the error replaces
    /// end-of-stream.
    #[must_use]
    pub fn fail_after(mut self, after: usize, message: impl Into<String>) -> Self {
        self.failure = Some((after, message.into()));
        self
    }

    /// Number of scripted buffers.
    pub fn buffer_count(&self) -> usize {
        self.script.len()
    }

    /// Total playback duration of the script.
    pub fn duration(&self) -> Duration {
        self.script
            .iter()
            .map(|payload| self.format.duration_of(payload.len()))
            .sum()
    }

    /// Handle to this source's bus, for posting events from tests.
    pub fn bus(&self) -> Bus {
        self.bus.clone()
    }

    /// Number of produced buffers waiting to be pulled.
    pub fn pending(&self) -> usize {
        self.consumer.as_ref().map_or(0, |c| c.occupied_len())
    }

    /// Generators script nothing for a descriptor that cannot be encoded.
    fn can_generate(&self) -> bool {
        match self.format.validate() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!("{}: not generating samples: {}", self.name, e);
                false
            }
        }
    }

    fn push_chunked(&mut self, data: Vec<u8>) {
        let frame = self.format.bytes_per_frame().max(1);
        let chunk = (self.format.frames_in(self.chunk_duration) * frame).max(frame);
        let data = Bytes::from(data);

        let mut offset = 0;
        while offset < data.len() {
            let end = (offset + chunk).min(data.len());
            self.script.push(data.slice(offset..end));
            offset = end;
        }
    }

    fn spawn_worker(&mut self) {
        let (producer, consumer) = HeapRb::<BufferUnit>::new(self.capacity).split();
        let gate = Arc::new(Gate::default());

        let job = Job {
            script: self.script.clone(),
            format: self.format,
            config: self.config.clone(),
            failure: self.failure.clone(),
            bus: self.bus.clone(),
            ready: self.ready.clone(),
            gate: gate.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("{}-worker", self.name))
            .spawn(move || job.run(producer));

        match handle {
            Ok(handle) => {
                self.consumer = Some(consumer);
                self.worker = Some(Worker { gate, handle });
            }
            Err(e) => {
                tracing::error!("failed to spawn mock source worker: {}", e);
                self.bus.post(BusEvent::error(format!(
                    "{}: cannot start streaming thread",
                    self.name
                )));
            }
        }
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.gate.stop();
            if worker.handle.join().is_err() {
                tracing::warn!("mock source worker panicked");
            }
        }
        self.consumer = None;
    }
}

impl Pipeline for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
        match state {
            PipelineState::Null => self.stop_worker(),
            PipelineState::Ready | PipelineState::Paused => {
                if let Some(worker) = &self.worker {
                    worker.gate.set_playing(false);
                }
            }
            PipelineState::Playing => {
                if self.worker.is_none() {
                    self.spawn_worker();
                }
                if let Some(worker) = &self.worker {
                    worker.gate.set_playing(true);
                }
            }
        }
        tracing::debug!("{}: {} -> {}", self.name, self.state, state);
        self.state = state;
        Ok(())
    }

    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
        self.bus.add_watch(callback);
        Ok(())
    }
}

impl SourceEndpoint for MockSource {
    fn caps(&self) -> FormatDescriptor {
        self.format
    }

    fn on_buffer_ready(&mut self, callback: ReadyCallback) {
        *self.ready.lock() = Some(callback);
    }

    fn pull_ready_buffer(&mut self) -> Result<BufferUnit, RelayError> {
        self.consumer
            .as_mut()
            .and_then(|consumer| consumer.try_pop())
            .ok_or(RelayError::NoBufferAvailable)
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.stop_worker();
    }
}

struct Worker {
    gate: Arc<Gate>,
    handle: JoinHandle<()>,
}

/// Play/pause switch shared with the worker thread.
#[derive(Default)]
struct Gate {
    playing: Mutex<bool>,
    resumed: Condvar,
    stopped: AtomicBool,
}

impl Gate {
    fn set_playing(&self, playing: bool) {
        *self.playing.lock() = playing;
        self.resumed.notify_all();
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let _guard = self.playing.lock();
        self.resumed.notify_all();
    }

    fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    /// Blocks while paused. Returns `false` once stopped.
    fn wait_playing(&self) -> bool {
        let mut playing = self.playing.lock();
        while !*playing && !self.is_stopped() {
            self.resumed.wait(&mut playing);
        }
        !self.is_stopped()
    }
}

/// Everything the worker thread needs, moved in at spawn.
struct Job {
    script: Vec<Bytes>,
    format: FormatDescriptor,
    config: SourceConfig,
    failure: Option<(usize, String)>,
    bus: Bus,
    ready: Arc<Mutex<Option<ReadyCallback>>>,
    gate: Arc<Gate>,
}

impl Job {
    fn run(self, mut producer: HeapProd<BufferUnit>) {
        let mut pts = Duration::ZERO;

        for (index, payload) in self.script.iter().enumerate() {
            if !self.gate.wait_playing() {
                return;
            }
            if let Some((_, message)) = self.failure.as_ref().filter(|(at, _)| *at == index) {
                self.bus.post(BusEvent::error(message.clone()));
                return;
            }

            let duration = self.format.duration_of(payload.len());
            let mut item = BufferUnit::new(payload.clone(), self.format)
                .with_pts(pts)
                .with_duration(duration);
            pts += duration;

            // Full queue: wait for the relay to pull rather than drop.
            loop {
                match producer.try_push(item) {
                    Ok(()) => break,
                    Err(back) => {
                        if self.gate.is_stopped() {
                            return;
                        }
                        item = back;
                        thread::sleep(FULL_RETRY);
                    }
                }
            }

            if self.config.emit_signals {
                let callback = self.ready.lock().clone();
                if let Some(callback) = callback {
                    callback();
                }
            }
            if self.config.sync_to_clock {
                thread::sleep(duration);
            }
        }

        if !self.gate.wait_playing() {
            return;
        }
        match &self.failure {
            Some((at, message)) if *at >= self.script.len() => {
                self.bus.post(BusEvent::error(message.clone()));
            }
            _ => {
                self.bus.post(BusEvent::EndOfStream);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;

    const WAIT: Duration = Duration::from_secs(5);

    fn format() -> FormatDescriptor {
        FormatDescriptor::s16le(1, 16000)
    }

    /// Starts `source` and returns a receiver of its bus events plus a ready counter.
    fn play(source: &mut MockSource) -> (mpsc::Receiver<BusEvent>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        source
            .add_bus_watch(Arc::new(move |event| {
                let _ = tx.lock().send(event);
            }))
            .unwrap();

        let ready = Arc::new(AtomicUsize::new(0));
        let ready_clone = ready.clone();
        source.on_buffer_ready(Arc::new(move || {
            ready_clone.fetch_add(1, Ordering::SeqCst);
        }));

        source.set_state(PipelineState::Playing).unwrap();
        (rx, ready)
    }

    #[test]
    fn test_mock_source_silence() {
        let source = MockSource::new(format()).generate_silence(Duration::from_millis(100));
        // 1600 frames in 320-frame buffers
        assert_eq!(source.buffer_count(), 5);
        assert_eq!(source.duration(), Duration::from_millis(100));
        assert!(source.script.iter().all(|b| b.iter().all(|&x| x == 0)));
    }

    #[test]
    fn test_generators_skip_invalid_format() {
        for bit_depth in [0, 72] {
            let format = FormatDescriptor {
                bit_depth,
                ..format()
            };
            let source = MockSource::new(format)
                .generate_sine(440.0, Duration::from_millis(100))
                .generate_silence(Duration::from_millis(100));
            assert_eq!(source.buffer_count(), 0);
        }
    }

    #[test]
    fn test_mock_source_sine() {
        let source = MockSource::new(format()).generate_sine(440.0, Duration::from_millis(100));
        let samples: Vec<i16> = source
            .script
            .iter()
            .flat_map(|b| {
                b.chunks_exact(2)
                    .map(|s| i16::from_le_bytes([s[0], s[1]]))
                    .collect::<Vec<_>>()
            })
            .collect();

        assert_eq!(samples.len(), 1600);
        assert!(samples.iter().any(|&s| s > 0));
        assert!(samples.iter().any(|&s| s < 0));
    }

    #[test]
    fn test_mock_source_stereo_chunking() {
        let source = MockSource::new(FormatDescriptor::s16le(2, 48000))
            .chunk_duration(Duration::from_millis(30))
            .generate_silence(Duration::from_millis(100));
        // 4800 frames: 3 buffers of 1440 frames and one of 480
        assert_eq!(source.buffer_count(), 4);
        assert_eq!(source.script[0].len(), 1440 * 4);
        assert_eq!(source.script[3].len(), 480 * 4);
    }

    #[test]
    fn test_with_buffers_fills_index() {
        let source = MockSource::transcription().with_buffers(3, 4);
        assert_eq!(&source.script[2][..], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_produces_then_end_of_stream() {
        let mut source = MockSource::new(format()).with_buffers(3, 64);
        let (rx, ready) = play(&mut source);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), BusEvent::EndOfStream);
        assert_eq!(ready.load(Ordering::SeqCst), 3);

        for expected in 0u8..3 {
            let buffer = source.pull_ready_buffer().unwrap();
            assert_eq!(buffer.payload()[0], expected);
            assert_eq!(*buffer.format(), format());
        }
        assert_eq!(
            source.pull_ready_buffer().unwrap_err(),
            RelayError::NoBufferAvailable
        );
    }

    #[test]
    fn test_pts_advance_by_duration() {
        let mut source = MockSource::new(format()).with_buffers(2, 320);
        let (rx, _) = play(&mut source);
        rx.recv_timeout(WAIT).unwrap();

        let first = source.pull_ready_buffer().unwrap();
        let second = source.pull_ready_buffer().unwrap();
        assert_eq!(first.pts(), Some(Duration::ZERO));
        assert_eq!(second.pts(), Some(Duration::from_millis(10)));
    }

    #[test]
    fn test_full_queue_waits_for_pull() {
        let mut source = MockSource::new(format())
            .with_capacity(2)
            .with_buffers(5, 16);
        let (rx, ready) = play(&mut source);

        let mut pulled = Vec::new();
        loop {
            match source.pull_ready_buffer() {
                Ok(buffer) => pulled.push(buffer.payload()[0]),
                Err(_) => {
                    if let Ok(event) = rx.try_recv() {
                        assert_eq!(event, BusEvent::EndOfStream);
                        break;
                    }
                    thread::sleep(Duration::from_millis(1));
                }
            }
        }
        while let Ok(buffer) = source.pull_ready_buffer() {
            pulled.push(buffer.payload()[0]);
        }

        assert_eq!(pulled, vec![0, 1, 2, 3, 4]);
        assert_eq!(ready.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_fail_after_posts_error() {
        let mut source = MockSource::new(format())
            .with_buffers(5, 16)
            .fail_after(2, "decoder crashed");
        let (rx, ready) = play(&mut source);

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), BusEvent::error("decoder crashed"));
        assert_eq!(ready.load(Ordering::SeqCst), 2);
        assert_eq!(source.pending(), 2);
    }

    #[test]
    fn test_no_signals_still_produces() {
        let mut source = MockSource::new(format())
            .with_buffers(2, 16)
            .with_config(SourceConfig {
                emit_signals: false,
                sync_to_clock: false,
            });
        let (rx, ready) = play(&mut source);

        rx.recv_timeout(WAIT).unwrap();
        assert_eq!(ready.load(Ordering::SeqCst), 0);
        assert_eq!(source.pending(), 2);
    }

    #[test]
    fn test_paused_source_produces_nothing() {
        let mut source = MockSource::new(format()).with_buffers(2, 16);
        source.set_state(PipelineState::Paused).unwrap();
        assert_eq!(source.pending(), 0);
        assert!(source.pull_ready_buffer().is_err());
    }

    #[test]
    fn test_null_stops_worker_and_clears_queue() {
        let mut source = MockSource::new(format())
            .with_capacity(1)
            .with_buffers(10, 16);
        let (_rx, _) = play(&mut source);

        source.set_state(PipelineState::Null).unwrap();
        assert_eq!(source.state(), PipelineState::Null);
        assert!(source.worker.is_none());
        assert!(source.pull_ready_buffer().is_err());
    }
}
