//! `appsink`-backed source endpoint.

use std::sync::Arc;

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use parking_lot::Mutex;

use super::{bridge_bus, from_clock_time, hand_over_element, set_pipeline_state, to_caps};
use crate::pipeline::{Bus, BusCallback, Pipeline, PipelineState, ReadyCallback};
use crate::{BufferUnit, Endpoint, FormatDescriptor, RelayError, SourceConfig, SourceEndpoint};

/// A GStreamer pipeline ending in a named `appsink`.
///
/// Pulled buffers are handed over without copying: the payload keeps the
/// mapped GStreamer buffer alive until the last reference is dropped.
pub struct GstSource {
    name: String,
    format: FormatDescriptor,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    state: PipelineState,
    bus: Bus,
    ready: Arc<Mutex<Option<ReadyCallback>>>,
}

impl GstSource {
    /// Wraps the appsink named `stage` inside `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingStage`] if there is no such element and
    /// [`RelayError::Construction`] if it is not an appsink.
    pub fn new(
        pipeline: gst::Pipeline,
        stage: &str,
        format: FormatDescriptor,
        config: &SourceConfig,
    ) -> Result<Self, RelayError> {
        let appsink: gst_app::AppSink = hand_over_element(&pipeline, stage, "appsink")?;

        appsink.set_caps(Some(&to_caps(&format)?));
        appsink.set_property("emit-signals", config.emit_signals);
        appsink.set_property("sync", config.sync_to_clock);

        let ready: Arc<Mutex<Option<ReadyCallback>>> = Arc::new(Mutex::new(None));
        let notify = ready.clone();
        let emit = config.emit_signals;
        appsink.set_callbacks(
            gst_app::AppSinkCallbacks::builder()
                .new_sample(move |_| {
                    if emit {
                        let callback = notify.lock().clone();
                        if let Some(callback) = callback {
                            callback();
                        }
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        let bus = Bus::new();
        bridge_bus(&pipeline, &bus)?;

        Ok(Self {
            name: stage.to_string(),
            format,
            pipeline,
            appsink,
            state: PipelineState::Null,
            bus,
            ready,
        })
    }

    /// Format announced by the sample, if it parses.
    fn sample_format(sample: &gst::Sample) -> Option<FormatDescriptor> {
        let caps = sample.caps()?;
        caps.to_string().parse().ok()
    }
}

impl Pipeline for GstSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
        set_pipeline_state(&self.pipeline, Endpoint::Source, state)?;
        self.state = state;
        Ok(())
    }

    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
        self.bus.add_watch(callback);
        Ok(())
    }
}

impl SourceEndpoint for GstSource {
    fn caps(&self) -> FormatDescriptor {
        self.format
    }

    fn on_buffer_ready(&mut self, callback: ReadyCallback) {
        *self.ready.lock() = Some(callback);
    }

    fn pull_ready_buffer(&mut self) -> Result<BufferUnit, RelayError> {
        let sample = self
            .appsink
            .try_pull_sample(gst::ClockTime::ZERO)
            .ok_or(RelayError::NoBufferAvailable)?;
        let format = Self::sample_format(&sample).unwrap_or(self.format);
        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| RelayError::Backend("sample without buffer".to_string()))?;

        let pts = buffer.pts().map(from_clock_time);
        let duration = buffer.duration().map(from_clock_time);
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| RelayError::Backend("buffer is not readable".to_string()))?;

        let mut unit = BufferUnit::new(Bytes::from_owner(mapped), format);
        if let Some(pts) = pts {
            unit = unit.with_pts(pts);
        }
        if let Some(duration) = duration {
            unit = unit.with_duration(duration);
        }
        Ok(unit)
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
