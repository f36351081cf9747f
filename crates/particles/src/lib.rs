//! Simulation core of the particle field.
//!
//! Layers of drifting particles, an eased pointer force field, a capped
//! proximity graph for connection lines, a parallax camera and the scheduler
//! that ties them to a [`RenderBackend`]. Nothing in this crate touches a GPU;
//! [`HeadlessBackend`] stands in for one in tests and headless runs.

pub mod animation;
pub mod backend;
pub mod camera;
pub mod controller;
pub mod graph;
pub mod input;
pub mod layers;
pub mod palette;
pub mod time;

pub use animation::{
    AnimationScheduler, CountingHost, FieldState, FrameHost, SchedulerPhase, StepSummary,
    TeardownReport, TickOutcome,
};
pub use backend::{
    BackendError, FrameView, HeadlessBackend, HeadlessSurface, RenderBackend, ResourceLedger,
};
pub use camera::{CameraRig, CameraState, ResizeError, ResizeHandler, Viewport};
pub use controller::{FieldController, FieldError, ListenerError, ListenerRegistry};
pub use graph::{ConnectionGraphBuilder, FLOATS_PER_EDGE};
pub use input::{InputState, InputTracker};
pub use layers::{Layer, LayerFrame, Particle, ParticleLayerSet, SimulationParams};
pub use palette::WeightedPalette;
pub use time::{
    BoxedTimeSource, FixedStepTimeSource, SystemTimeSource, TimeSample, TimeSource,
    MAX_FRAME_DELTA,
};
