//! GStreamer backend: real pipelines relayed from `appsink` to `appsrc`.
//!
//! Enabled with the `gstreamer` feature. Pipelines are built from launch
//! descriptions; the hand-over stage is looked up by name and wrapped:
//!
//! - Source side: an `appsink` whose `new-sample` callback announces buffers
//! - Sink side: an `appsrc` fed with `push_buffer` and `end_of_stream`
//!
//! Bus messages are bridged through a sync handler, so no GLib main loop is
//! required. Only end-of-stream and error messages are forwarded; everything
//! else is dropped at the bus.

mod sink;
mod source;

pub use sink::GstSink;
pub use source::GstSource;

use std::str::FromStr;
use std::time::Duration;

use gstreamer as gst;
use gstreamer::prelude::*;

use crate::pipeline::{check_stage_caps, Bus, PipelineDescription, PipelineFactory, PipelineState};
use crate::{
    BusEvent, Endpoint, FormatDescriptor, RelayConfig, RelayError, SinkEndpoint, SourceEndpoint,
};

/// Builds endpoints from launch descriptions with GStreamer.
///
/// # Example
///
/// ```ignore
/// use stream_relay::{FormatPreset, GstFactory, PipelineDescription, StreamRelay};
///
/// let format = FormatPreset::CdQuality.descriptor();
/// let session = StreamRelay::builder()
///     .factory(GstFactory::new()?)
///     .caps(format)
///     .source_description(
///         PipelineDescription::file_decoder("song.mp3", &format, "relay_sink").to_string(),
///         "relay_sink",
///     )
///     .sink_description(
///         PipelineDescription::app_player(&format, "relay_src").to_string(),
///         "relay_src",
///     )
///     .start()?;
/// ```
#[derive(Debug, Clone, Copy)]
pub struct GstFactory {
    _private: (),
}

impl GstFactory {
    /// Initializes GStreamer. Safe to call repeatedly.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Backend`] if GStreamer cannot be initialized.
    pub fn new() -> Result<Self, RelayError> {
        gst::init().map_err(|e| RelayError::Backend(e.to_string()))?;
        Ok(Self { _private: () })
    }
}

impl PipelineFactory for GstFactory {
    fn build_source(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        config: &RelayConfig,
    ) -> Result<Box<dyn SourceEndpoint>, RelayError> {
        check_stage_caps(description.require_stage(stage)?, &format, Endpoint::Source)?;
        let pipeline = launch(description, config.verbose)?;
        let source = GstSource::new(pipeline, stage, format, &config.source)?;
        Ok(Box::new(source))
    }

    fn build_sink(
        &self,
        description: &PipelineDescription,
        stage: &str,
        format: FormatDescriptor,
        config: &RelayConfig,
    ) -> Result<Box<dyn SinkEndpoint>, RelayError> {
        check_stage_caps(description.require_stage(stage)?, &format, Endpoint::Sink)?;
        let pipeline = launch(description, config.verbose)?;
        let sink = GstSink::new(pipeline, stage, format, &config.sink)?;
        Ok(Box::new(sink))
    }
}

/// Parses and instantiates a pipeline.
fn launch(description: &PipelineDescription, verbose: bool) -> Result<gst::Pipeline, RelayError> {
    let text = description.to_string();
    tracing::debug!("launching pipeline: {}", text);

    let pipeline = gst::parse::launch(&text)
        .map_err(|e| RelayError::construction(e.to_string()))?
        .downcast::<gst::Pipeline>()
        .map_err(|_| RelayError::construction(format!("'{text}' is not a pipeline")))?;

    if verbose {
        pipeline.connect_deep_notify(None, |_, origin, pspec| {
            let value = origin.property_value(pspec.name());
            tracing::debug!("{}: {} = {:?}", origin.path_string(), pspec.name(), value);
        });
    }
    Ok(pipeline)
}

/// Looks up the hand-over element and downcasts it.
fn hand_over_element<T: IsA<gst::Element>>(
    pipeline: &gst::Pipeline,
    stage: &str,
    kind: &str,
) -> Result<T, RelayError> {
    pipeline
        .by_name(stage)
        .ok_or_else(|| RelayError::MissingStage {
            name: stage.to_string(),
        })?
        .downcast::<T>()
        .map_err(|_| RelayError::construction(format!("stage '{stage}' is not an {kind}")))
}

/// Forwards end-of-stream and error messages from a pipeline bus to `bus`.
fn bridge_bus(pipeline: &gst::Pipeline, bus: &Bus) -> Result<(), RelayError> {
    let gst_bus = pipeline
        .bus()
        .ok_or_else(|| RelayError::Backend("pipeline has no bus".to_string()))?;
    let bus = bus.clone();
    gst_bus.set_sync_handler(move |_, msg| {
        if let Some(event) = bus_event(msg) {
            bus.post(event);
        }
        gst::BusSyncReply::Drop
    });
    Ok(())
}

fn bus_event(msg: &gst::Message) -> Option<BusEvent> {
    match msg.view() {
        gst::MessageView::Eos(_) => Some(BusEvent::EndOfStream),
        gst::MessageView::Error(err) => Some(BusEvent::Error {
            message: err.error().to_string(),
            debug: err.debug().map(|d| d.to_string()),
        }),
        _ => None,
    }
}

fn to_caps(format: &FormatDescriptor) -> Result<gst::Caps, RelayError> {
    gst::Caps::from_str(&format.to_caps()).map_err(|e| RelayError::invalid_format(e.to_string()))
}

fn to_gst_state(state: PipelineState) -> gst::State {
    match state {
        PipelineState::Null => gst::State::Null,
        PipelineState::Ready => gst::State::Ready,
        PipelineState::Paused => gst::State::Paused,
        PipelineState::Playing => gst::State::Playing,
    }
}

fn set_pipeline_state(
    pipeline: &gst::Pipeline,
    origin: Endpoint,
    target: PipelineState,
) -> Result<(), RelayError> {
    pipeline
        .set_state(to_gst_state(target))
        .map(|_| ())
        .map_err(|e| RelayError::StateChange {
            origin,
            target,
            reason: e.to_string(),
        })
}

fn to_clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(duration.as_nanos() as u64)
}

fn from_clock_time(time: gst::ClockTime) -> Duration {
    Duration::from_nanos(time.nseconds())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_mapping() {
        assert_eq!(to_gst_state(PipelineState::Playing), gst::State::Playing);
        assert_eq!(to_gst_state(PipelineState::Null), gst::State::Null);
    }

    #[test]
    fn test_clock_time_conversion() {
        let d = Duration::from_millis(1500);
        assert_eq!(from_clock_time(to_clock_time(d)), d);
    }

    #[test]
    fn test_caps_conversion() {
        let _factory = GstFactory::new().unwrap();
        let caps = to_caps(&FormatDescriptor::s16le(2, 44100)).unwrap();
        let back: FormatDescriptor = caps.to_string().parse().unwrap();
        assert_eq!(back, FormatDescriptor::s16le(2, 44100));
    }

    #[test]
    fn test_bad_description_fails_to_launch() {
        let factory = GstFactory::new().unwrap();
        let description: PipelineDescription =
            "nosuchelement ! appsink name=out".parse().unwrap();
        let result = factory.build_source(
            &description,
            "out",
            FormatDescriptor::s16le(2, 44100),
            &RelayConfig::default(),
        );
        assert!(matches!(result, Err(RelayError::Construction { .. })));
    }

    #[test]
    fn test_hand_over_stage_kind_checked() {
        let factory = GstFactory::new().unwrap();
        let description: PipelineDescription =
            "audiotestsrc num-buffers=1 ! fakesink name=out".parse().unwrap();
        let result = factory.build_source(
            &description,
            "out",
            FormatDescriptor::s16le(2, 44100),
            &RelayConfig::default(),
        );
        assert!(matches!(result, Err(RelayError::Construction { .. })));
    }
}
