//! Pipeline handles and the relay controller.
//!
//! The relay connects two independent pipelines through one hand-over point:
//!
//! ```text
//! Source Pipeline → Source Endpoint → Controller → Sink Endpoint → Sink Pipeline
//!        │                                ▲                             │
//!        └──────────── bus ───────────────┴──────────── bus ────────────┘
//! ```
//!
//! - **Pipeline**: lifecycle state plus a bus, implemented by every endpoint
//! - **Bus**: watcher list that carries [`BusEvent`]s out of a pipeline
//! - **Description**: launch-style text that pipelines are built from
//! - **Factory**: turns descriptions into endpoints
//! - **Controller**: state machine and event loop driving the hand-over

mod bus;
mod controller;
mod description;
mod factory;

pub use bus::Bus;
pub use controller::RelayState;
pub(crate) use controller::{ControlMessage, Controller};
pub use description::{PipelineDescription, Stage};
pub use factory::{check_stage_caps, MockFactory, PipelineFactory};

use std::fmt;
use std::sync::Arc;

use crate::{BusEvent, RelayError};

/// Lifecycle state of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PipelineState {
    /// No resources allocated; the initial and final state.
    #[default]
    Null,
    /// Resources allocated, nothing flowing.
    Ready,
    /// Prerolled but not advancing.
    Paused,
    /// Data is flowing.
    Playing,
}

impl PipelineState {
    /// Returns `true` only for [`PipelineState::Playing`].
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing)
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Ready => "ready",
            Self::Paused => "paused",
            Self::Playing => "playing",
        };
        f.write_str(name)
    }
}

/// Callback fired once per buffer that a source has ready for pulling.
pub type ReadyCallback = Arc<dyn Fn() + Send + Sync>;

/// Callback fired for every event posted on a pipeline's bus.
pub type BusCallback = Arc<dyn Fn(BusEvent) + Send + Sync>;

/// A pipeline the relay controls.
///
/// Both endpoint traits build on this one. Callbacks registered through
/// [`add_bus_watch`](Pipeline::add_bus_watch) may be invoked from any thread;
/// the relay only enqueues work from them.
pub trait Pipeline: Send {
    /// Name used in logs, usually the hand-over stage name.
    fn name(&self) -> &str;

    /// The state the pipeline was last set to.
    fn state(&self) -> PipelineState;

    /// Requests a lifecycle transition.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::StateChange`] if the pipeline refuses the state.
    fn set_state(&mut self, state: PipelineState) -> Result<(), RelayError>;

    /// Registers a callback for end-of-stream and error events.
    ///
    /// # Errors
    ///
    /// Returns an error if the pipeline has no bus to watch.
    fn add_bus_watch(&mut self, callback: BusCallback) -> Result<(), RelayError>;
}
