//! `appsrc`-backed sink endpoint.

use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;

use super::{bridge_bus, hand_over_element, set_pipeline_state, to_caps, to_clock_time};
use crate::pipeline::{Bus, BusCallback, Pipeline, PipelineState};
use crate::{
    BufferUnit, Endpoint, FlowStatus, FormatDescriptor, RelayError, SinkConfig, SinkEndpoint,
    SinkError, StreamFormat,
};

/// A GStreamer pipeline starting at a named `appsrc`.
///
/// The sink pipeline posts end-of-stream once its renderer has played every
/// buffer pushed before [`signal_end_of_stream`](SinkEndpoint::signal_end_of_stream).
pub struct GstSink {
    name: String,
    format: FormatDescriptor,
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    state: PipelineState,
    bus: Bus,
    eos: bool,
}

impl GstSink {
    /// Wraps the appsrc named `stage` inside `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MissingStage`] if there is no such element and
    /// [`RelayError::Construction`] if it is not an appsrc.
    pub fn new(
        pipeline: gst::Pipeline,
        stage: &str,
        format: FormatDescriptor,
        config: &SinkConfig,
    ) -> Result<Self, RelayError> {
        let appsrc: gst_app::AppSrc = hand_over_element(&pipeline, stage, "appsrc")?;

        appsrc.set_caps(Some(&to_caps(&format)?));
        appsrc.set_format(match config.stream_format {
            StreamFormat::Time => gst::Format::Time,
            StreamFormat::Bytes => gst::Format::Bytes,
        });
        appsrc.set_block(config.block);
        appsrc.set_max_bytes(config.max_bytes);

        let bus = Bus::new();
        bridge_bus(&pipeline, &bus)?;

        Ok(Self {
            name: stage.to_string(),
            format,
            pipeline,
            appsrc,
            state: PipelineState::Null,
            bus,
            eos: false,
        })
    }
}

impl Pipeline for GstSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> PipelineState {
        self.state
    }

    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError> {
        set_pipeline_state(&self.pipeline, Endpoint::Sink, state)?;
        self.state = state;
        Ok(())
    }

    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError> {
        self.bus.add_watch(callback);
        Ok(())
    }
}

impl SinkEndpoint for GstSink {
    fn caps(&self) -> FormatDescriptor {
        self.format
    }

    fn push_buffer(&mut self, buffer: BufferUnit) -> Result<FlowStatus, SinkError> {
        if self.eos {
            return Err(SinkError::AlreadyAtEos);
        }

        let pts = buffer.pts();
        let duration = buffer.duration();
        let mut gst_buffer = gst::Buffer::from_slice(buffer.into_payload());
        if let Some(meta) = gst_buffer.get_mut() {
            meta.set_pts(pts.map(to_clock_time));
            meta.set_duration(duration.map(to_clock_time));
        }

        match self.appsrc.push_buffer(gst_buffer) {
            Ok(_) => Ok(FlowStatus::Accepted),
            Err(gst::FlowError::Eos) => Err(SinkError::AlreadyAtEos),
            Err(gst::FlowError::Flushing) => Err(SinkError::Flushing),
            Err(gst::FlowError::NotLinked) => Ok(FlowStatus::Dropped),
            Err(e) => Err(SinkError::flow(format!("{e:?}"))),
        }
    }

    fn signal_end_of_stream(&mut self) {
        if self.eos {
            return;
        }
        self.eos = true;
        if let Err(e) = self.appsrc.end_of_stream() {
            tracing::warn!("{}: end-of-stream rejected: {:?}", self.name, e);
        }
    }

    fn is_eos(&self) -> bool {
        self.eos
    }
}

impl Drop for GstSink {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}
