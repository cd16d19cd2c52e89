//! Building endpoints from pipeline descriptions.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::{PipelineDescription, Stage};
use crate::sink::{MockSink, MockSinkProbe};
use crate::source::MockSource;
use crate::{Endpoint, FormatDescriptor, RelayConfig, RelayError, SinkEndpoint, SourceEndpoint};

/// Turns pipeline descriptions into relay endpoints.
///
/// `stage` names the hand-over element inside the description: the element
/// buffers leave the source pipeline through, or enter the sink pipeline
/// through. Implementations must fail with [`RelayError::MissingStage`] when it
/// is absent and with [`RelayError::FormatMismatch`] when its declared caps
/// disagree with `format`.
pub trait PipelineFactory: Send + Sync {
    /// Builds the upstream pipeline.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the pipeline cannot be built.
    fn build_source(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        config: &RelayConfig,
    ) -> Result<Box<dyn SourceEndpoint>, RelayError>;

    /// Builds the downstream pipeline.
    ///
    /// # Errors
    ///
    /// Returns a construction error if the pipeline cannot be built.
    fn build_sink(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        config: &RelayConfig,
    ) -> Result<Box<dyn SinkEndpoint>, RelayError>;
}

/// Checks a hand-over stage's `caps` property against the relay format.
///
/// A stage without caps accepts the relay format.
///
/// # Errors
///
/// Returns [`RelayError::InvalidFormat`] if the caps do not parse and
/// [`RelayError::FormatMismatch`] if they describe another format.
pub fn check_stage_caps(
    stage: &Stage,
    format: &FormatDescriptor,
    side: Endpoint,
) -> Result<(), RelayError> {
    let Some(caps) = stage.get("caps") else {
        return Ok(());
    };
    let declared: FormatDescriptor = caps.parse()?;
    if declared == *format {
        return Ok(());
    }
    Err(match side {
        Endpoint::Source => RelayError::FormatMismatch {
            upstream: declared,
            downstream: *format,
        },
        Endpoint::Sink => RelayError::FormatMismatch {
            upstream: *format,
            downstream: declared,
        },
    })
}

const MOCK_ELEMENTS: &[&str] = &[
    "mocksrc",
    "audioconvert",
    "audioresample",
    "identity",
    "queue",
    "capsfilter",
    "appsink",
    "appsrc",
    "fakesink",
    "autoaudiosink",
];

const DEFAULT_NUM_BUFFERS: usize = 10;
const DEFAULT_BUFFER_SIZE: usize = 4096;

/// Builds in-process pipelines from descriptions.
///
/// Understands a small element set:
///
/// - `mocksrc num-buffers=N buffer-size=B error-after=K`: produces `N` buffers
///   of `B` bytes (default 10 and 4096), or posts an error after `K` buffers
/// - `fakesink`/`autoaudiosink fail-on=N drop=true`: records pushes, fails the
///   `N`-th push, or drops every push
/// - `audioconvert`, `audioresample`, `identity`, `queue` and caps filters pass
///   through
/// - `appsink` ends a source pipeline, `appsrc` starts a sink pipeline
///
/// Probes for every sink built are kept so tests can inspect what arrived.
///
/// # Example
///
/// ```
/// use stream_relay::{MockFactory, PipelineDescription, PipelineFactory, FormatPreset, RelayConfig};
///
/// let factory = MockFactory::new();
/// let description: PipelineDescription =
///     "appsrc name=feed ! fakesink".parse().unwrap();
/// let sink = factory
///     .build_sink(&description, "feed", FormatPreset::CdQuality.descriptor(), &RelayConfig::default())
///     .unwrap();
/// assert!(factory.sink_probe().is_some());
/// # drop(sink);
/// ```
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    probes: Arc<Mutex<Vec<MockSinkProbe>>>,
}

impl MockFactory {
    /// Creates a factory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe of the most recently built sink.
    #[must_use]
    pub fn sink_probe(&self) -> Option<MockSinkProbe> {
        self.probes.lock().last().cloned()
    }

    fn check_elements(description: &PipelineDescription) -> Result<(), RelayError> {
        for stage in description.stages() {
            if !MOCK_ELEMENTS.contains(&stage.factory()) {
                return Err(RelayError::construction(format!(
                    "no element \"{}\"",
                    stage.factory()
                )));
            }
        }
        Ok(())
    }
}

fn hand_over_stage<'a>(
    description: &'a PipelineDescription,
    stage: &str,
    expected: &str,
) -> Result<&'a Stage, RelayError> {
    let found = description.require_stage(stage)?;
    if found.factory() != expected {
        return Err(RelayError::construction(format!(
            "stage '{stage}' is a {}, expected {expected}",
            found.factory()
        )));
    }
    Ok(found)
}

impl PipelineFactory for MockFactory {
    fn build_source(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        config: &RelayConfig,
    ) -> Result<Box<dyn SourceEndpoint>, RelayError> {
        Self::check_elements(description)?;
        let appsink = hand_over_stage(description, stage, "appsink")?;
        if !std::ptr::eq(appsink, description.last()) {
            return Err(RelayError::construction(format!(
                "appsink '{stage}' must be the last stage of the source pipeline"
            )));
        }
        check_stage_caps(appsink, &format, Endpoint::Source)?;

        let producer = description
            .stages()
            .iter()
            .find(|s| s.factory() == "mocksrc")
            .ok_or_else(|| RelayError::construction("source pipeline has no mocksrc stage"))?;

        let num_buffers = producer
            .get_number("num-buffers")?
            .unwrap_or(DEFAULT_NUM_BUFFERS);
        let buffer_size = producer
            .get_number("buffer-size")?
            .unwrap_or(DEFAULT_BUFFER_SIZE);

        let mut source = MockSource::new(format)
            .with_name(stage)
            .with_config(config.source.clone())
            .with_buffers(num_buffers, buffer_size);
        if let Some(after) = producer.get_number::<usize>("error-after")? {
            source = source.fail_after(after, "mocksrc: scripted failure");
        }

        tracing::debug!("built mock source pipeline: {}", description);
        Ok(Box::new(source))
    }

    fn build_sink(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        _config: &RelayConfig,
    ) -> Result<Box<dyn SinkEndpoint>, RelayError> {
        Self::check_elements(description)?;
        let appsrc = hand_over_stage(description, stage, "appsrc")?;
        if !std::ptr::eq(appsrc, description.first()) {
            return Err(RelayError::construction(format!(
                "appsrc '{stage}' must be the first stage of the sink pipeline"
            )));
        }
        check_stage_caps(appsrc, &format, Endpoint::Sink)?;

        let (mut sink, probe) = MockSink::with_name(stage, format);
        let renderer = description.last();
        if let Some(n) = renderer.get_number::<usize>("fail-on")? {
            sink = sink.fail_on(n);
        }
        if renderer.get("drop") == Some("true") {
            sink = sink.drop_all();
        }

        self.probes.lock().push(probe);
        tracing::debug!("built mock sink pipeline: {}", description);
        Ok(Box::new(sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format() -> FormatDescriptor {
        FormatDescriptor::s16le(2, 44100)
    }

    fn parse(text: &str) -> PipelineDescription {
        text.parse().unwrap()
    }

    #[test]
    fn test_check_stage_caps() {
        let matching = Stage::new("appsink").property("caps", format().to_caps());
        assert!(check_stage_caps(&matching, &format(), Endpoint::Source).is_ok());

        let bare = Stage::new("appsink");
        assert!(check_stage_caps(&bare, &format(), Endpoint::Source).is_ok());

        let mono = Stage::new("appsrc").property("caps", "audio/x-raw,format=S16LE,channels=1,rate=44100");
        assert_eq!(
            check_stage_caps(&mono, &format(), Endpoint::Sink).unwrap_err(),
            RelayError::FormatMismatch {
                upstream: format(),
                downstream: FormatDescriptor::s16le(1, 44100),
            }
        );

        let garbage = Stage::new("appsink").property("caps", "video/x-raw");
        assert!(matches!(
            check_stage_caps(&garbage, &format(), Endpoint::Source),
            Err(RelayError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_build_source() {
        let factory = MockFactory::new();
        let source = factory
            .build_source(
                &parse("mocksrc num-buffers=3 ! audioconvert ! appsink name=out"),
                "out",
                format(),
                &RelayConfig::default(),
            )
            .unwrap();
        assert_eq!(source.name(), "out");
        assert_eq!(source.caps(), format());
    }

    #[test]
    fn test_build_source_unknown_element() {
        let err = MockFactory::new()
            .build_source(
                &parse("mocksrc ! decodebin ! appsink name=out"),
                "out",
                format(),
                &RelayConfig::default(),
            )
            .err()
            .unwrap();
        assert_eq!(err, RelayError::construction("no element \"decodebin\""));
    }

    #[test]
    fn test_build_source_missing_stage() {
        let err = MockFactory::new()
            .build_source(
                &parse("mocksrc ! appsink name=out"),
                "relay_sink",
                format(),
                &RelayConfig::default(),
            )
            .err()
            .unwrap();
        assert!(matches!(err, RelayError::MissingStage { .. }));
    }

    #[test]
    fn test_build_source_wrong_element_kind() {
        let err = MockFactory::new()
            .build_source(
                &parse("mocksrc name=out ! appsink"),
                "out",
                format(),
                &RelayConfig::default(),
            )
            .err()
            .unwrap();
        assert!(err.is_construction());
    }

    #[test]
    fn test_build_source_bad_number() {
        let err = MockFactory::new()
            .build_source(
                &parse("mocksrc num-buffers=lots ! appsink name=out"),
                "out",
                format(),
                &RelayConfig::default(),
            )
            .err()
            .unwrap();
        assert!(err.to_string().contains("num-buffers"));
    }

    #[test]
    fn test_build_sink_records_probe() {
        let factory = MockFactory::new();
        assert!(factory.sink_probe().is_none());

        let sink = factory
            .build_sink(
                &parse("appsrc name=feed ! audioconvert ! fakesink"),
                "feed",
                format(),
                &RelayConfig::default(),
            )
            .unwrap();
        assert_eq!(sink.name(), "feed");
        assert!(factory.sink_probe().is_some());
    }

    #[test]
    fn test_build_sink_appsrc_must_be_first() {
        let err = MockFactory::new()
            .build_sink(
                &parse("queue ! appsrc name=feed ! fakesink"),
                "feed",
                format(),
                &RelayConfig::default(),
            )
            .err()
            .unwrap();
        assert!(err.to_string().contains("first stage"));
    }
}
