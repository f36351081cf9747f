use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::camera::{CameraState, Viewport};
use crate::layers::Layer;
use crate::time::TimeSample;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("rendering capability unavailable: {0}")]
    Unavailable(String),
    #[error("surface lost")]
    SurfaceLost,
    #[error("surface outdated")]
    SurfaceOutdated,
    #[error("timed out acquiring the next frame")]
    Timeout,
    #[error("out of GPU memory")]
    OutOfMemory,
    #[error("backend already disposed")]
    Disposed,
    #[error("render failed: {0}")]
    Other(String),
}

/// Everything a backend reads to draw one frame. Borrowed immutably, so
/// rendering can never mutate the simulation.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub camera: &'a CameraState,
    /// Back to front.
    pub layers: &'a [Layer],
    /// Flat edge endpoints, six floats per edge.
    pub edges: &'a [f32],
    pub line_color: [f32; 3],
    pub line_opacity: f32,
    pub time: TimeSample,
}

/// Device-side half of a mounted field.
///
/// A backend owns every handle it creates. `dispose` releases all of them and
/// must be idempotent; after it, `upload` and `render` return
/// [`BackendError::Disposed`].
pub trait RenderBackend {
    /// Whatever the backend draws into: a window, or a headless surface.
    type Container;

    fn create_surface(
        container: Self::Container,
        viewport: Viewport,
        ledger: ResourceLedger,
    ) -> Result<Self, BackendError>
    where
        Self: Sized;

    /// Syncs a layer's buffers to the device. Uploading an unchanged layer
    /// twice is a no-op.
    fn upload(&mut self, index: usize, layer: &Layer) -> Result<(), BackendError>;

    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), BackendError>;

    fn resize(&mut self, viewport: Viewport);

    /// Re-applies the current surface configuration after the surface was
    /// lost or went out of date. The size is unchanged.
    fn reconfigure(&mut self);

    fn dispose(&mut self);

    fn is_disposed(&self) -> bool;
}

#[derive(Debug, Default)]
struct LedgerCounts {
    allocated: AtomicU64,
    released: AtomicU64,
}

/// Shared counters of device resources, so hosts and tests can verify that
/// every allocation is released exactly once.
#[derive(Debug, Clone, Default)]
pub struct ResourceLedger {
    counts: Arc<LedgerCounts>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self, kind: &'static str) {
        self.counts.allocated.fetch_add(1, Ordering::Relaxed);
        trace!(kind, "resource acquired");
    }

    pub fn release(&self, kind: &'static str) {
        self.counts.released.fetch_add(1, Ordering::Relaxed);
        trace!(kind, "resource released");
    }

    pub fn allocated_total(&self) -> u64 {
        self.counts.allocated.load(Ordering::Relaxed)
    }

    pub fn released_total(&self) -> u64 {
        self.counts.released.load(Ordering::Relaxed)
    }

    pub fn live(&self) -> u64 {
        self.allocated_total().saturating_sub(self.released_total())
    }
}

/// Container for [`HeadlessBackend`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeadlessSurface {
    unavailable: bool,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// A surface whose backend refuses to start, as on a machine without a GPU.
    pub fn unavailable() -> Self {
        Self { unavailable: true }
    }
}

#[derive(Debug, Clone, Copy)]
struct HeadlessBuffer {
    generation: u64,
    len: usize,
}

/// CPU-only backend that tracks what a device backend would allocate.
#[derive(Debug)]
pub struct HeadlessBackend {
    ledger: ResourceLedger,
    viewport: Viewport,
    layers: Vec<Option<HeadlessBuffer>>,
    line_buffer: bool,
    uploads: u64,
    frames: u64,
    reconfigures: u64,
    last_edges: usize,
    disposed: bool,
}

const SURFACE: &str = "surface";
const LAYER_BUFFER: &str = "layer buffer";
const LINE_BUFFER: &str = "line buffer";

impl HeadlessBackend {
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Uploads that actually copied data.
    pub fn uploads(&self) -> u64 {
        self.uploads
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn reconfigures(&self) -> u64 {
        self.reconfigures
    }

    pub fn last_edge_count(&self) -> usize {
        self.last_edges
    }

    pub fn ledger(&self) -> &ResourceLedger {
        &self.ledger
    }
}

impl RenderBackend for HeadlessBackend {
    type Container = HeadlessSurface;

    fn create_surface(
        container: HeadlessSurface,
        viewport: Viewport,
        ledger: ResourceLedger,
    ) -> Result<Self, BackendError> {
        if container.unavailable {
            return Err(BackendError::Unavailable(
                "headless surface marked unavailable".into(),
            ));
        }
        ledger.acquire(SURFACE);
        debug!(width = viewport.width, height = viewport.height, "headless surface created");
        Ok(Self {
            ledger,
            viewport,
            layers: Vec::new(),
            line_buffer: false,
            uploads: 0,
            frames: 0,
            reconfigures: 0,
            last_edges: 0,
            disposed: false,
        })
    }

    fn upload(&mut self, index: usize, layer: &Layer) -> Result<(), BackendError> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        if self.layers.len() <= index {
            self.layers.resize(index + 1, None);
        }
        let generation = layer.generation();
        let len = layer.count();
        match self.layers[index] {
            Some(buffer) if buffer.generation == generation && buffer.len == len => return Ok(()),
            Some(buffer) if buffer.len == len => {}
            Some(_) => {
                self.ledger.release(LAYER_BUFFER);
                self.ledger.acquire(LAYER_BUFFER);
            }
            None => self.ledger.acquire(LAYER_BUFFER),
        }
        self.layers[index] = Some(HeadlessBuffer { generation, len });
        self.uploads += 1;
        Ok(())
    }

    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), BackendError> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        if !frame.edges.is_empty() && !self.line_buffer {
            self.ledger.acquire(LINE_BUFFER);
            self.line_buffer = true;
        }
        self.last_edges = frame.edges.len() / crate::graph::FLOATS_PER_EDGE;
        self.frames += 1;
        Ok(())
    }

    fn resize(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    fn reconfigure(&mut self) {
        if !self.disposed {
            self.reconfigures += 1;
        }
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for _ in self.layers.drain(..).flatten() {
            self.ledger.release(LAYER_BUFFER);
        }
        if self.line_buffer {
            self.ledger.release(LINE_BUFFER);
            self.line_buffer = false;
        }
        self.ledger.release(SURFACE);
        self.disposed = true;
        debug!(frames = self.frames, "headless backend disposed");
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for HeadlessBackend {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{LayerFrame, ParticleLayerSet};
    use fieldconfig::{AnimationProfile, FieldConfig};
    use glam::Vec2;

    fn layer_set() -> ParticleLayerSet {
        ParticleLayerSet::new(&FieldConfig::default().resolve(None).unwrap())
    }

    #[test]
    fn upload_is_idempotent_per_generation() {
        let ledger = ResourceLedger::new();
        let mut backend =
            HeadlessBackend::create_surface(HeadlessSurface::new(), Viewport::new(64, 64), ledger.clone())
                .unwrap();
        let mut set = layer_set();
        let layer = &set.layers()[1];
        backend.upload(1, layer).unwrap();
        backend.upload(1, layer).unwrap();
        assert_eq!(backend.uploads(), 1);

        let profile = AnimationProfile::idle();
        set.update(&LayerFrame {
            time: 0.1,
            delta: 0.016,
            pointer_world: Vec2::ZERO,
            profile: &profile,
        });
        backend.upload(1, &set.layers()[1]).unwrap();
        assert_eq!(backend.uploads(), 2);
        assert_eq!(ledger.live(), 2);
    }

    #[test]
    fn dispose_releases_everything_once() {
        let ledger = ResourceLedger::new();
        let mut backend =
            HeadlessBackend::create_surface(HeadlessSurface::new(), Viewport::new(64, 64), ledger.clone())
                .unwrap();
        let set = layer_set();
        for (index, layer) in set.layers().iter().enumerate() {
            backend.upload(index, layer).unwrap();
        }
        let camera = crate::camera::CameraRig::new(
            &FieldConfig::default().camera,
            Viewport::new(64, 64),
        );
        let edges = [0.0f32; 6];
        let frame = FrameView {
            camera: camera.state(),
            layers: set.layers(),
            edges: &edges,
            line_color: [1.0; 3],
            line_opacity: 0.5,
            time: TimeSample::new(0.0, 0.0, 0),
        };
        backend.render(&frame).unwrap();
        assert_eq!(backend.last_edge_count(), 1);
        assert_eq!(ledger.live(), 1 + set.len() as u64 + 1);

        backend.dispose();
        backend.dispose();
        assert!(backend.is_disposed());
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.allocated_total(), ledger.released_total());
        assert_eq!(backend.render(&frame), Err(BackendError::Disposed));
        assert_eq!(backend.upload(0, &set.layers()[0]), Err(BackendError::Disposed));
    }

    #[test]
    fn dropping_an_undisposed_backend_releases_its_surface() {
        let ledger = ResourceLedger::new();
        let mut backend =
            HeadlessBackend::create_surface(HeadlessSurface::new(), Viewport::new(64, 64), ledger.clone())
                .unwrap();
        backend.upload(0, &layer_set().layers()[0]).unwrap();
        assert_eq!(ledger.live(), 2);
        drop(backend);
        assert_eq!(ledger.live(), 0);
        assert_eq!(ledger.allocated_total(), ledger.released_total());
    }

    #[test]
    fn reconfigure_keeps_the_viewport() {
        let ledger = ResourceLedger::new();
        let mut backend =
            HeadlessBackend::create_surface(HeadlessSurface::new(), Viewport::new(64, 48), ledger.clone())
                .unwrap();
        backend.reconfigure();
        assert_eq!(backend.reconfigures(), 1);
        assert_eq!(backend.viewport(), Viewport::new(64, 48));
        assert_eq!(ledger.live(), 1);

        backend.dispose();
        backend.reconfigure();
        assert_eq!(backend.reconfigures(), 1);
    }

    #[test]
    fn unavailable_surface_fails_to_create() {
        let ledger = ResourceLedger::new();
        let result =
            HeadlessBackend::create_surface(HeadlessSurface::unavailable(), Viewport::new(1, 1), ledger.clone());
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
        assert_eq!(ledger.allocated_total(), 0);
    }
}
