use std::sync::Arc;

use particles::{BackendError, FrameView, Layer, RenderBackend, ResourceLedger, Viewport};
use tracing::{debug, trace, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::context::GpuContext;
use super::pipeline::FieldPipelines;
use super::uniforms::{pack_edges, pack_layer, CameraUniforms, LineVertex, ParticleInstance};
use crate::types::{AdapterProfile, Antialiasing};

const SURFACE: &str = "surface";
const UNIFORM_BUFFER: &str = "uniform buffer";
const MSAA_TARGET: &str = "msaa target";
const LAYER_BUFFER: &str = "layer buffer";
const LINE_BUFFER: &str = "line buffer";

/// Vertices per billboard quad.
const QUAD_VERTICES: u32 = 6;

/// Window handed to [`GpuBackend::create_surface`], plus the knobs that
/// shape the swapchain.
#[derive(Clone)]
pub struct GpuSurfaceTarget {
    pub window: Arc<Window>,
    pub antialiasing: Antialiasing,
    pub clear_color: [f64; 3],
}

struct MultisampleTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl MultisampleTarget {
    fn new(
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
        viewport: Viewport,
        sample_count: u32,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("msaa color target"),
            size: wgpu::Extent3d {
                width: viewport.width.max(1),
                height: viewport.height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

struct InstanceBuffer {
    buffer: wgpu::Buffer,
    /// Capacity in elements.
    capacity: usize,
    len: usize,
    generation: u64,
}

/// wgpu implementation of [`RenderBackend`]: one instanced billboard draw
/// per layer, then one line-list draw for the connection graph.
pub struct GpuBackend {
    context: GpuContext,
    pipelines: FieldPipelines,
    uniforms: CameraUniforms,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    multisample_target: Option<MultisampleTarget>,
    layers: Vec<Option<InstanceBuffer>>,
    lines: Option<InstanceBuffer>,
    instance_scratch: Vec<ParticleInstance>,
    line_scratch: Vec<LineVertex>,
    clear_color: wgpu::Color,
    ledger: ResourceLedger,
    disposed: bool,
}

impl GpuBackend {
    pub fn adapter_profile(&self) -> &AdapterProfile {
        &self.context.adapter_profile
    }

    pub fn sample_count(&self) -> u32 {
        self.context.sample_count
    }

    fn create_multisample_target(&self) -> Option<MultisampleTarget> {
        (self.context.sample_count > 1).then(|| {
            MultisampleTarget::new(
                &self.context.device,
                self.context.surface_format,
                self.context.viewport,
                self.context.sample_count,
            )
        })
    }

    fn sync_lines(&mut self, frame: &FrameView<'_>) -> u32 {
        pack_edges(
            frame.edges,
            frame.line_color,
            frame.line_opacity,
            &mut self.line_scratch,
        );
        let needed = self.line_scratch.len();
        if needed == 0 {
            return 0;
        }

        let too_small = self
            .lines
            .as_ref()
            .map_or(true, |lines| lines.capacity < needed);
        if too_small {
            let capacity = needed.next_power_of_two();
            if let Some(old) = self.lines.take() {
                old.buffer.destroy();
                self.ledger.release(LINE_BUFFER);
            }
            let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("connection lines"),
                size: (capacity * std::mem::size_of::<LineVertex>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.ledger.acquire(LINE_BUFFER);
            trace!(capacity, "line buffer grown");
            self.lines = Some(InstanceBuffer {
                buffer,
                capacity,
                len: 0,
                generation: 0,
            });
        }

        let Some(lines) = self.lines.as_mut() else {
            return 0;
        };
        self.context
            .queue
            .write_buffer(&lines.buffer, 0, bytemuck::cast_slice(&self.line_scratch));
        lines.len = needed;
        needed as u32
    }
}

impl RenderBackend for GpuBackend {
    type Container = GpuSurfaceTarget;

    fn create_surface(
        container: GpuSurfaceTarget,
        viewport: Viewport,
        ledger: ResourceLedger,
    ) -> Result<Self, BackendError> {
        let context = GpuContext::new(container.window, viewport, container.antialiasing)
            .map_err(|err| BackendError::Unavailable(format!("{err:#}")))?;
        ledger.acquire(SURFACE);

        let pipelines = FieldPipelines::new(
            &context.device,
            context.surface_format,
            context.sample_count,
        );

        let uniforms = CameraUniforms::new(context.viewport);
        let uniform_buffer = context
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("camera uniforms"),
                contents: bytemuck::bytes_of(&uniforms),
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            });
        ledger.acquire(UNIFORM_BUFFER);

        let bind_group = context.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("camera bind group"),
            layout: &pipelines.uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let [r, g, b] = container.clear_color;
        let mut backend = Self {
            context,
            pipelines,
            uniforms,
            uniform_buffer,
            bind_group,
            multisample_target: None,
            layers: Vec::new(),
            lines: None,
            instance_scratch: Vec::new(),
            line_scratch: Vec::new(),
            clear_color: wgpu::Color { r, g, b, a: 1.0 },
            ledger,
            disposed: false,
        };
        backend.multisample_target = backend.create_multisample_target();
        if backend.multisample_target.is_some() {
            backend.ledger.acquire(MSAA_TARGET);
        }

        debug!(
            adapter = %backend.context.adapter_profile.name,
            width = backend.context.viewport.width,
            height = backend.context.viewport.height,
            sample_count = backend.context.sample_count,
            "gpu backend ready"
        );
        Ok(backend)
    }

    fn upload(&mut self, index: usize, layer: &Layer) -> Result<(), BackendError> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }
        if self.layers.len() <= index {
            self.layers.resize_with(index + 1, || None);
        }

        let generation = layer.generation();
        let len = layer.count();
        if let Some(existing) = &self.layers[index] {
            if existing.generation == generation && existing.len == len {
                return Ok(());
            }
        }

        pack_layer(layer, &mut self.instance_scratch);
        let needs_buffer = self.layers[index]
            .as_ref()
            .map_or(true, |existing| existing.capacity < len);
        if needs_buffer {
            if let Some(old) = self.layers[index].take() {
                old.buffer.destroy();
                self.ledger.release(LAYER_BUFFER);
            }
            let capacity = len.max(1);
            let buffer = self.context.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(layer.name()),
                size: (capacity * std::mem::size_of::<ParticleInstance>()) as wgpu::BufferAddress,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            self.ledger.acquire(LAYER_BUFFER);
            self.layers[index] = Some(InstanceBuffer {
                buffer,
                capacity,
                len: 0,
                generation: 0,
            });
        }

        let Some(slot) = self.layers[index].as_mut() else {
            return Err(BackendError::Other(format!("layer {index} has no buffer")));
        };
        if !self.instance_scratch.is_empty() {
            self.context.queue.write_buffer(
                &slot.buffer,
                0,
                bytemuck::cast_slice(&self.instance_scratch),
            );
        }
        slot.len = len;
        slot.generation = generation;
        Ok(())
    }

    fn render(&mut self, frame: &FrameView<'_>) -> Result<(), BackendError> {
        if self.disposed {
            return Err(BackendError::Disposed);
        }

        let surface_texture = self
            .context
            .surface
            .get_current_texture()
            .map_err(|err| match err {
                wgpu::SurfaceError::Lost => BackendError::SurfaceLost,
                wgpu::SurfaceError::Outdated => BackendError::SurfaceOutdated,
                wgpu::SurfaceError::Timeout => BackendError::Timeout,
                wgpu::SurfaceError::OutOfMemory => BackendError::OutOfMemory,
                other => BackendError::Other(other.to_string()),
            })?;

        self.uniforms
            .update(frame.camera, self.context.viewport, frame.time.seconds);
        self.context
            .queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&self.uniforms));
        let line_vertices = self.sync_lines(frame);

        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let (target, resolve_target) = match &self.multisample_target {
            Some(msaa) => (&msaa.view, Some(&view)),
            None => (&view, None),
        };

        let mut encoder = self
            .context
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("field encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("field pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    depth_slice: None,
                    resolve_target,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_bind_group(0, &self.bind_group, &[]);

            pass.set_pipeline(&self.pipelines.particles);
            for slot in self.layers.iter().take(frame.layers.len()).flatten() {
                if slot.len == 0 {
                    continue;
                }
                pass.set_vertex_buffer(0, slot.buffer.slice(..));
                pass.draw(0..QUAD_VERTICES, 0..slot.len as u32);
            }

            if line_vertices > 0 {
                if let Some(lines) = &self.lines {
                    pass.set_pipeline(&self.pipelines.lines);
                    pass.set_vertex_buffer(0, lines.buffer.slice(..));
                    pass.draw(0..line_vertices, 0..1);
                }
            }
        }

        self.context.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn resize(&mut self, viewport: Viewport) {
        if self.disposed || viewport.is_empty() {
            return;
        }
        self.context.resize(viewport);
        if let Some(old) = self.multisample_target.take() {
            old.texture.destroy();
            self.ledger.release(MSAA_TARGET);
        }
        self.multisample_target = self.create_multisample_target();
        if self.multisample_target.is_some() {
            self.ledger.acquire(MSAA_TARGET);
        }
        debug!(width = viewport.width, height = viewport.height, "gpu surface resized");
    }

    fn reconfigure(&mut self) {
        if self.disposed {
            return;
        }
        self.context.reconfigure();
    }

    fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for slot in self.layers.drain(..).flatten() {
            slot.buffer.destroy();
            self.ledger.release(LAYER_BUFFER);
        }
        if let Some(lines) = self.lines.take() {
            lines.buffer.destroy();
            self.ledger.release(LINE_BUFFER);
        }
        if let Some(msaa) = self.multisample_target.take() {
            msaa.texture.destroy();
            self.ledger.release(MSAA_TARGET);
        }
        self.uniform_buffer.destroy();
        self.ledger.release(UNIFORM_BUFFER);
        self.ledger.release(SURFACE);
        self.disposed = true;
        if self.ledger.live() > 0 {
            warn!(live = self.ledger.live(), "gpu backend disposed with live resources");
        } else {
            debug!("gpu backend disposed");
        }
    }

    fn is_disposed(&self) -> bool {
        self.disposed
    }
}

impl Drop for GpuBackend {
    fn drop(&mut self) {
        self.dispose();
    }
}
