//! Builder pattern for `StreamRelay`.

use std::sync::Arc;

use crate::pipeline::{Controller, PipelineDescription, PipelineFactory};
use crate::session::{RelaySession, SessionState};
use crate::{
    event_callback, EventCallback, FormatDescriptor, FormatPreset, RelayConfig, RelayError,
    RelayEvent, SinkEndpoint, SourceEndpoint,
};

/// Where one side of the relay comes from.
enum EndpointPlan<E: ?Sized> {
    /// An endpoint built by the caller.
    Ready(Box<E>),
    /// Launch-style text plus the name of its hand-over stage.
    Described { text: String, stage: String },
}

/// Builder for configuring and starting a relay.
///
/// Use [`StreamRelay::builder()`] to create a new builder.
///
/// # Endpoint Example
///
/// ```
/// use stream_relay::{ChannelSink, FormatPreset, MockSource, StreamRelay};
///
/// let format = FormatPreset::Transcription.descriptor();
/// let (sink, _handle) = ChannelSink::new(format);
///
/// let session = StreamRelay::builder()
///     .source(MockSource::new(format).with_buffers(10, 320))
///     .sink(sink)
///     .on_event(|e| tracing::info!(?e, "relay event"))
///     .start()?;
/// # Ok::<(), stream_relay::RelayError>(())
/// ```
///
/// # Description Example
///
/// ```
/// use stream_relay::{MockFactory, StreamRelay};
///
/// let session = StreamRelay::builder()
///     .factory(MockFactory::new())
///     .source_description("mocksrc num-buffers=10 ! audioconvert ! appsink name=out", "out")
///     .sink_description("appsrc name=feed ! fakesink", "feed")
///     .start()?;
/// # Ok::<(), stream_relay::RelayError>(())
/// ```
///
/// [`StreamRelay::builder()`]: crate::StreamRelay::builder
#[must_use]
pub struct RelayBuilder {
    /// Explicit format; falls back to the source endpoint's caps, then the default preset.
    format: Option<FormatDescriptor>,
    source: Option<EndpointPlan<dyn SourceEndpoint>>,
    sink: Option<EndpointPlan<dyn SinkEndpoint>>,
    factory: Option<Arc<dyn PipelineFactory>>,
    event_callback: Option<EventCallback>,
    config: RelayConfig,
}

impl Default for RelayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RelayBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            format: None,
            source: None,
            sink: None,
            factory: None,
            event_callback: None,
            config: RelayConfig::default(),
        }
    }

    /// Set the relay format from a preset.
    ///
    /// Default: the source endpoint's caps, or [`FormatPreset::CdQuality`] for
    /// described pipelines.
    pub fn format(mut self, preset: FormatPreset) -> Self {
        self.format = Some(preset.descriptor());
        self
    }

    /// Set the relay format from a descriptor.
    pub fn caps(mut self, format: FormatDescriptor) -> Self {
        self.format = Some(format);
        self
    }

    /// Set custom relay configuration.
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a ready-made source endpoint.
    pub fn source<S: SourceEndpoint + 'static>(mut self, source: S) -> Self {
        self.source = Some(EndpointPlan::Ready(Box::new(source)));
        self
    }

    /// Use a ready-made sink endpoint.
    pub fn sink<S: SinkEndpoint + 'static>(mut self, sink: S) -> Self {
        self.sink = Some(EndpointPlan::Ready(Box::new(sink)));
        self
    }

    /// Build the source from launch-style text through the factory.
    ///
    /// `stage` is the `name` of the element buffers leave the pipeline through.
    pub fn source_description(mut self, text: impl Into<String>, stage: impl Into<String>) -> Self {
        self.source = Some(EndpointPlan::Described {
            text: text.into(),
            stage: stage.into(),
        });
        self
    }

    /// Build the sink from launch-style text through the factory.
    ///
    /// `stage` is the `name` of the element buffers enter the pipeline through.
    pub fn sink_description(mut self, text: impl Into<String>, stage: impl Into<String>) -> Self {
        self.sink = Some(EndpointPlan::Described {
            text: text.into(),
            stage: stage.into(),
        });
        self
    }

    /// Set the factory that builds described pipelines.
    ///
    /// With the `gstreamer` feature the default is `GstFactory`; without it,
    /// descriptions need an explicit factory.
    pub fn factory<F: PipelineFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include state transitions, dropped and late buffers, and
    /// pipeline errors.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(RelayEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Validates the builder configuration.
    fn validate(&self) -> Result<(), RelayError> {
        if self.source.is_none() {
            return Err(RelayError::NoSourceConfigured);
        }
        if self.sink.is_none() {
            return Err(RelayError::NoSinkConfigured);
        }
        self.config.validate()
    }

    fn resolve_format(&self) -> FormatDescriptor {
        if let Some(format) = self.format {
            return format;
        }
        match &self.source {
            Some(EndpointPlan::Ready(source)) => source.caps(),
            _ => FormatPreset::default().descriptor(),
        }
    }

    fn resolve_factory(&self) -> Result<Arc<dyn PipelineFactory>, RelayError> {
        if let Some(factory) = &self.factory {
            return Ok(factory.clone());
        }
        #[cfg(feature = "gstreamer")]
        {
            Ok(Arc::new(crate::gst::GstFactory::new()?))
        }
        #[cfg(not(feature = "gstreamer"))]
        {
            Err(RelayError::construction(
                "no pipeline factory configured - use factory() to build described pipelines",
            ))
        }
    }

    /// Builds both pipelines and sets them playing.
    ///
    /// Returns a [`RelaySession`] in state
    /// [`RelayState::Running`](crate::RelayState::Running); await
    /// [`RelaySession::run()`] to relay buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No source or no sink is configured
    /// - A description does not parse, or names a missing or unknown stage
    /// - The endpoints do not share the relay format
    /// - The configuration is invalid
    /// - Either pipeline refuses to start (both are unwound to null)
    pub fn start(mut self) -> Result<RelaySession, RelayError> {
        self.validate()?;

        let format = self.resolve_format();
        format.validate()?;

        let source = match self.source.take() {
            Some(EndpointPlan::Ready(source)) => source,
            Some(EndpointPlan::Described { text, stage }) => {
                let description = PipelineDescription::parse(&text)?;
                self.resolve_factory()?
                    .build_source(&description, &stage, format, &self.config)?
            }
            None => return Err(RelayError::NoSourceConfigured),
        };

        let sink = match self.sink.take() {
            Some(EndpointPlan::Ready(sink)) => sink,
            Some(EndpointPlan::Described { text, stage }) => {
                let description = PipelineDescription::parse(&text)?;
                self.resolve_factory()?
                    .build_sink(&description, &stage, format, &self.config)?
            }
            None => return Err(RelayError::NoSinkConfigured),
        };

        tracing::info!(
            "starting relay {} -> {} at {}",
            source.name(),
            sink.name(),
            format
        );

        let state = Arc::new(SessionState::new());
        let (controller, control_tx) = Controller::start(
            source,
            sink,
            format,
            &self.config,
            state.clone(),
            self.event_callback.take(),
        )?;

        Ok(RelaySession::new(controller, state, control_tx))
    }
}

/// Main entry point for stream-relay.
///
/// Use [`StreamRelay::builder()`] to start configuring a relay.
pub struct StreamRelay;

impl StreamRelay {
    /// Creates a new builder for configuring a relay.
    pub fn builder() -> RelayBuilder {
        RelayBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ChannelSink, MockFactory, MockSink, MockSource, RelayState, SourceConfig};

    #[test]
    fn test_builder_default() {
        let builder = RelayBuilder::new();
        assert!(builder.source.is_none());
        assert!(builder.sink.is_none());
        assert_eq!(builder.resolve_format(), FormatPreset::CdQuality.descriptor());
    }

    #[test]
    fn test_builder_format() {
        let builder = StreamRelay::builder().format(FormatPreset::Mono48k);
        assert_eq!(builder.format, Some(FormatDescriptor::s16le(1, 48000)));
    }

    #[test]
    fn test_format_follows_source_caps() {
        let builder = StreamRelay::builder().source(MockSource::transcription());
        assert_eq!(builder.resolve_format(), FormatDescriptor::s16le(1, 16000));
    }

    #[test]
    fn test_builder_rejects_no_source() {
        let (sink, _handle) = ChannelSink::new(FormatPreset::CdQuality.descriptor());
        let result = StreamRelay::builder().sink(sink).start();
        assert!(matches!(result, Err(RelayError::NoSourceConfigured)));
    }

    #[test]
    fn test_builder_rejects_no_sink() {
        let result = StreamRelay::builder()
            .source(MockSource::transcription())
            .start();
        assert!(matches!(result, Err(RelayError::NoSinkConfigured)));
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let (sink, _probe) = MockSink::new(FormatPreset::Transcription.descriptor());
        let result = StreamRelay::builder()
            .source(MockSource::transcription())
            .sink(sink)
            .config(RelayConfig {
                source: SourceConfig {
                    emit_signals: false,
                    ..Default::default()
                },
                ..Default::default()
            })
            .start();
        assert!(matches!(result, Err(RelayError::InvalidConfig { .. })));
    }

    #[cfg(not(feature = "gstreamer"))]
    #[test]
    fn test_description_without_factory() {
        let result = StreamRelay::builder()
            .source_description("mocksrc ! appsink name=out", "out")
            .sink_description("appsrc name=feed ! fakesink", "feed")
            .start();
        assert!(matches!(result, Err(RelayError::Construction { .. })));
    }

    #[test]
    fn test_start_from_descriptions() {
        let factory = MockFactory::new();
        let session = StreamRelay::builder()
            .factory(factory.clone())
            .format(FormatPreset::Transcription)
            .source_description("mocksrc num-buffers=2 ! appsink name=out", "out")
            .sink_description("appsrc name=feed ! fakesink", "feed")
            .start()
            .unwrap();

        assert_eq!(session.state(), RelayState::Running);
        assert!(factory.sink_probe().is_some());
    }
}
