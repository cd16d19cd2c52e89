//! # stream-relay
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Relay media buffers from one pipeline into another.
//!
//! `stream-relay` connects a producing pipeline (decoder, capture, generator)
//! to an independent rendering pipeline through a single hand-over point. The
//! two sides run at their own rates and on their own threads; the relay moves
//! every buffer across in order, forwards end-of-stream from the source to the
//! sink, and shuts both down as soon as either reports an error.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stream_relay::{FormatPreset, PipelineDescription, StreamRelay};
//!
//! let format = FormatPreset::CdQuality.descriptor();
//!
//! let session = StreamRelay::builder()
//!     .caps(format)
//!     .source_description(
//!         PipelineDescription::file_decoder("song.mp3", &format, "relay_sink").to_string(),
//!         "relay_sink",
//!     )
//!     .sink_description(
//!         PipelineDescription::app_player(&format, "relay_src").to_string(),
//!         "relay_src",
//!     )
//!     .on_event(|e| tracing::info!(?e, "relay event"))
//!     .start()?;
//!
//! // Runs until the sink has played everything
//! session.run().await?;
//! ```
//!
//! ## Architecture
//!
//! The crate keeps each pipeline behind its own thread boundary:
//!
//! - **Source pipeline**: produces buffers on its own thread and announces each one
//! - **Controller**: a single async loop that pulls, checks and pushes one buffer
//!   per announcement, fed by two channels (in-order flow, priority control)
//! - **Sink pipeline**: queues pushed buffers and renders them at its own pace
//!
//! Callbacks from either pipeline only enqueue messages, so relay logic never
//! runs concurrently with itself.
//!
//! ## Backends
//!
//! In-process endpoints ([`MockSource`], [`ChannelSink`], [`MockSink`]) are always
//! available. The `gstreamer` feature adds `GstFactory`, which builds real
//! pipelines from launch descriptions and relays through `appsink`/`appsrc`.

#![warn(missing_docs)]
// Media code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod buffer;
mod builder;
mod config;
mod error;
mod event;
pub mod format;
#[cfg(feature = "gstreamer")]
pub mod gst;
pub mod pipeline;
mod session;
pub mod sink;
pub mod source;

pub use buffer::BufferUnit;
pub use builder::{RelayBuilder, StreamRelay};
pub use config::{FormatPreset, RelayConfig, SinkConfig, SourceConfig, StreamFormat, TransferMode};
pub use error::{RelayError, SinkError};
pub use event::{event_callback, BusEvent, Endpoint, EventCallback, RelayEvent};
pub use format::{Endianness, FormatDescriptor, SampleEncoding};
pub use pipeline::{
    check_stage_caps, Bus, BusCallback, MockFactory, Pipeline, PipelineDescription,
    PipelineFactory, PipelineState, ReadyCallback, RelayState, Stage,
};
pub use session::{Completion, RelayMonitor, RelaySession, SessionStats, StopHandle};
pub use sink::{ChannelSink, ChannelSinkHandle, FlowStatus, MockSink, MockSinkProbe, SinkEndpoint};
pub use source::{MockSource, SourceEndpoint};

#[cfg(feature = "gstreamer")]
pub use gst::GstFactory;
