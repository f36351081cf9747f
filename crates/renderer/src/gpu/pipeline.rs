use super::shaders::{create_module, LINE_SHADER, PARTICLE_SHADER};
use super::uniforms::{LineVertex, ParticleInstance};

/// Render pipelines for the billboards and connection lines, sharing one
/// camera bind group layout.
pub(crate) struct FieldPipelines {
    pub uniform_layout: wgpu::BindGroupLayout,
    pub particles: wgpu::RenderPipeline,
    pub lines: wgpu::RenderPipeline,
}

impl FieldPipelines {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        sample_count: u32,
    ) -> Self {
        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("camera layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("field pipeline layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });

        let particle_module = create_module(device, "particle shader", PARTICLE_SHADER);
        let line_module = create_module(device, "line shader", LINE_SHADER);

        let particles = build_pipeline(
            device,
            &layout,
            PipelineSpec {
                label: "particle pipeline",
                module: &particle_module,
                vertex_entry: "vs_particle",
                fragment_entry: "fs_particle",
                buffer: ParticleInstance::layout(),
                topology: wgpu::PrimitiveTopology::TriangleList,
            },
            surface_format,
            sample_count,
        );
        let lines = build_pipeline(
            device,
            &layout,
            PipelineSpec {
                label: "line pipeline",
                module: &line_module,
                vertex_entry: "vs_line",
                fragment_entry: "fs_line",
                buffer: LineVertex::layout(),
                topology: wgpu::PrimitiveTopology::LineList,
            },
            surface_format,
            sample_count,
        );

        Self {
            uniform_layout,
            particles,
            lines,
        }
    }
}

struct PipelineSpec<'a> {
    label: &'static str,
    module: &'a wgpu::ShaderModule,
    vertex_entry: &'static str,
    fragment_entry: &'static str,
    buffer: wgpu::VertexBufferLayout<'static>,
    topology: wgpu::PrimitiveTopology,
}

fn build_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    spec: PipelineSpec<'_>,
    surface_format: wgpu::TextureFormat,
    sample_count: u32,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(spec.label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: spec.module,
            entry_point: Some(spec.vertex_entry),
            buffers: &[spec.buffer],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: spec.topology,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            polygon_mode: wgpu::PolygonMode::Fill,
            unclipped_depth: false,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        fragment: Some(wgpu::FragmentState {
            module: spec.module,
            entry_point: Some(spec.fragment_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format: surface_format,
                blend: Some(additive_blend()),
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    })
}

/// Premultiplied additive blending; draw order only matters for the glow.
fn additive_blend() -> wgpu::BlendState {
    let add = wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    };
    wgpu::BlendState {
        color: add,
        alpha: add,
    }
}
