use fieldconfig::{AnimationProfile, Profiles, ResolvedField};
use glam::Vec2;
use tracing::{debug, error, trace, warn};

use crate::backend::{BackendError, FrameView, RenderBackend};
use crate::camera::{CameraRig, ResizeError, ResizeHandler, Viewport};
use crate::graph::ConnectionGraphBuilder;
use crate::input::InputTracker;
use crate::layers::{LayerFrame, ParticleLayerSet};
use crate::palette::WeightedPalette;
use crate::time::TimeSample;

/// Whatever drives frames: a window's redraw request, or a test counter.
pub trait FrameHost {
    fn request_frame(&mut self);
}

/// Frame host that only counts requests. Used by headless runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountingHost {
    pub requests: u64,
}

impl FrameHost for CountingHost {
    fn request_frame(&mut self) {
        self.requests += 1;
    }
}

/// Result of a single simulation step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepSummary {
    pub eased_pointer: Vec2,
    pub edges: usize,
}

/// All simulation state for one mounted field. Owned by the scheduler; no
/// globals.
#[derive(Debug, Clone)]
pub struct FieldState {
    variant: String,
    input: InputTracker,
    layers: ParticleLayerSet,
    graph: ConnectionGraphBuilder,
    camera: CameraRig,
    resize: ResizeHandler,
    profiles: Profiles,
    speaking: bool,
    line_color: [f32; 3],
}

impl FieldState {
    pub fn new(field: &ResolvedField, viewport: Viewport) -> Self {
        Self {
            variant: field.variant.clone(),
            input: InputTracker::new(field.easing_factor),
            layers: ParticleLayerSet::new(field),
            graph: ConnectionGraphBuilder::new(
                field.connection_threshold,
                field.connection_cap,
                field.connection_stride,
            ),
            camera: CameraRig::new(&field.camera, viewport),
            resize: ResizeHandler::new(viewport),
            profiles: field.profiles.clone(),
            speaking: false,
            line_color: WeightedPalette::new(&field.palette).primary(),
        }
    }

    pub fn variant(&self) -> &str {
        &self.variant
    }

    pub fn layers(&self) -> &ParticleLayerSet {
        &self.layers
    }

    pub fn graph(&self) -> &ConnectionGraphBuilder {
        &self.graph
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn input(&self) -> &InputTracker {
        &self.input
    }

    pub fn viewport(&self) -> Viewport {
        self.resize.viewport()
    }

    pub fn speaking(&self) -> bool {
        self.speaking
    }

    pub fn set_speaking(&mut self, speaking: bool) {
        self.speaking = speaking;
    }

    pub fn profile(&self) -> AnimationProfile {
        self.profiles.select(self.speaking)
    }

    /// Records a pointer sample in NDC.
    pub fn set_pointer(&mut self, x: f32, y: f32) {
        self.input.set_target(x, y);
    }

    /// Records a pointer sample in physical pixels of the current viewport.
    pub fn set_pointer_pixels(&mut self, x: f64, y: f64) {
        let viewport = self.resize.viewport();
        self.input
            .set_target_from_pixels(x, y, viewport.width, viewport.height);
    }

    /// Applies a container size change; returns the new viewport if it changed.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<Option<Viewport>, ResizeError> {
        let changed = self.resize.handle(width, height)?;
        if let Some(viewport) = changed {
            self.camera.set_viewport(viewport);
        }
        Ok(changed)
    }

    /// Advances the simulation one tick without touching any device.
    pub fn step(&mut self, sample: &TimeSample) -> StepSummary {
        let profile = self.profile();
        let eased = self.input.tick();
        let pointer_world = self.camera.pointer_to_world(eased);
        self.layers.update(&LayerFrame {
            time: sample.seconds,
            delta: sample.delta,
            pointer_world,
            profile: &profile,
        });
        let edges = match self.layers.foreground() {
            Some(layer) => self.graph.rebuild(layer.positions()),
            None => 0,
        };
        self.graph.update_opacity(sample.seconds, &profile);
        self.camera.update(eased, sample.seconds, &profile);
        StepSummary {
            eased_pointer: eased,
            edges,
        }
    }

    fn frame_view(&self, time: TimeSample) -> FrameView<'_> {
        FrameView {
            camera: self.camera.state(),
            layers: self.layers.layers(),
            edges: self.graph.edges(),
            line_color: self.line_color,
            line_opacity: self.graph.opacity(),
            time,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerPhase {
    Idle,
    Running,
    Stopped,
    Disposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Rendered { edges: usize },
    /// The frame was dropped (spurious callback, or a transient surface error).
    Skipped,
    /// The scheduler is not running; nothing happened.
    Stopped,
}

/// Totals reported when a scheduler is torn down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TeardownReport {
    pub ticks: u64,
    pub rendered: u64,
}

#[derive(Debug, Default)]
struct FrameStats {
    window_start: Option<f32>,
    frames: u32,
}

impl FrameStats {
    fn record(&mut self, seconds: f32, edges: usize) {
        let start = *self.window_start.get_or_insert(seconds);
        self.frames += 1;
        let elapsed = seconds - start;
        if elapsed >= 1.0 {
            let fps = self.frames as f32 / elapsed;
            debug!(fps = fps.round(), edges, "render stats");
            self.window_start = Some(seconds);
            self.frames = 0;
        }
    }
}

/// The only active loop of a mounted field.
///
/// Each tick reads input once, updates layers, rebuilds the connection graph,
/// moves the camera, uploads dirty layers, renders and requests the next
/// frame. At most one frame request is outstanding at any time.
pub struct AnimationScheduler<B: RenderBackend> {
    state: FieldState,
    backend: B,
    phase: SchedulerPhase,
    pending: bool,
    in_flight: bool,
    ticks: u64,
    rendered: u64,
    stats: FrameStats,
}

impl<B: RenderBackend> AnimationScheduler<B> {
    pub fn new(state: FieldState, backend: B) -> Self {
        Self {
            state,
            backend,
            phase: SchedulerPhase::Idle,
            pending: false,
            in_flight: false,
            ticks: 0,
            rendered: 0,
            stats: FrameStats::default(),
        }
    }

    pub fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.phase == SchedulerPhase::Running
    }

    pub fn has_pending_frame(&self) -> bool {
        self.pending
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn state(&self) -> &FieldState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut FieldState {
        &mut self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn start(&mut self, host: &mut dyn FrameHost) {
        if matches!(self.phase, SchedulerPhase::Running | SchedulerPhase::Disposed) {
            return;
        }
        self.phase = SchedulerPhase::Running;
        debug!(variant = self.state.variant(), "animation started");
        self.request(host);
    }

    /// Cancels the pending frame. No later callback runs a tick.
    pub fn stop(&mut self) {
        if self.phase == SchedulerPhase::Running {
            debug!(ticks = self.ticks, "animation stopped");
            self.phase = SchedulerPhase::Stopped;
        }
        self.pending = false;
    }

    fn request(&mut self, host: &mut dyn FrameHost) {
        if !self.pending {
            self.pending = true;
            host.request_frame();
        }
    }

    /// Runs one frame in response to a host callback.
    pub fn tick(&mut self, sample: TimeSample, host: &mut dyn FrameHost) -> TickOutcome {
        if !self.is_running() {
            return TickOutcome::Stopped;
        }
        if !self.pending {
            trace!(frame = sample.frame_index, "ignoring unrequested frame");
            return TickOutcome::Skipped;
        }
        self.pending = false;
        self.in_flight = true;
        self.ticks += 1;

        let summary = self.state.step(&sample);
        let result = self.sync_and_render(sample);
        self.in_flight = false;

        let outcome = match result {
            Ok(()) => {
                self.rendered += 1;
                self.stats.record(sample.seconds, summary.edges);
                TickOutcome::Rendered {
                    edges: summary.edges,
                }
            }
            Err(BackendError::SurfaceLost | BackendError::SurfaceOutdated) => {
                let viewport = self.state.viewport();
                warn!(width = viewport.width, height = viewport.height, "surface lost; reconfiguring");
                self.backend.reconfigure();
                TickOutcome::Skipped
            }
            Err(BackendError::Timeout) => {
                trace!("frame acquisition timed out; skipping");
                TickOutcome::Skipped
            }
            Err(err @ BackendError::Other(_)) => {
                warn!(error = %err, "frame dropped");
                TickOutcome::Skipped
            }
            Err(err) => {
                error!(error = %err, "render backend failed; stopping animation");
                self.stop();
                return TickOutcome::Stopped;
            }
        };

        if self.is_running() {
            self.request(host);
        }
        outcome
    }

    fn sync_and_render(&mut self, sample: TimeSample) -> Result<(), BackendError> {
        for (index, layer) in self.state.layers.layers().iter().enumerate() {
            if layer.is_dirty() {
                self.backend.upload(index, layer)?;
            }
        }
        for layer in self.state.layers.layers_mut() {
            layer.mark_clean();
        }
        let frame = self.state.frame_view(sample);
        self.backend.render(&frame)
    }

    /// Routes a container size change to the camera and the backend. Zero
    /// sizes are skipped.
    pub fn resize(&mut self, width: u32, height: u32) {
        match self.state.resize(width, height) {
            Ok(Some(viewport)) => self.backend.resize(viewport),
            Ok(None) => {}
            Err(err) => debug!(error = %err, "skipping resize"),
        }
    }

    /// Stops, disposes the backend and frees the simulation buffers.
    pub fn teardown(mut self) -> TeardownReport {
        self.shutdown();
        TeardownReport {
            ticks: self.ticks,
            rendered: self.rendered,
        }
    }

    fn shutdown(&mut self) {
        if self.phase == SchedulerPhase::Disposed {
            return;
        }
        self.stop();
        if self.in_flight {
            warn!("tearing down with a frame still in flight");
            self.in_flight = false;
        }
        self.backend.dispose();
        self.phase = SchedulerPhase::Disposed;
        debug!(ticks = self.ticks, "animation torn down");
    }
}

impl<B: RenderBackend> Drop for AnimationScheduler<B> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
