//! WGSL sources for the particle and line pipelines.

pub(crate) const PARTICLE_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    right: vec4<f32>,
    up: vec4<f32>,
    viewport: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct ParticleIn {
    @location(0) position: vec3<f32>,
    @location(1) size: f32,
    @location(2) color: vec4<f32>,
};

struct ParticleOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) local: vec2<f32>,
};

@vertex
fn vs_particle(@builtin(vertex_index) vertex_index: u32, particle: ParticleIn) -> ParticleOut {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];
    let extent = particle.size * camera.viewport.w;
    let world = particle.position
        + (camera.right.xyz * corner.x + camera.up.xyz * corner.y) * extent;

    var out: ParticleOut;
    out.clip = camera.view_proj * vec4<f32>(world, 1.0);
    out.color = particle.color;
    out.local = corner;
    return out;
}

@fragment
fn fs_particle(frag: ParticleOut) -> @location(0) vec4<f32> {
    let d = length(frag.local);
    if (d > 1.0) {
        discard;
    }
    let falloff = 1.0 - smoothstep(0.0, 1.0, d);
    let alpha = frag.color.a * falloff;
    return vec4<f32>(frag.color.rgb * alpha, alpha);
}
"#;

pub(crate) const LINE_SHADER: &str = r#"
struct Camera {
    view_proj: mat4x4<f32>,
    right: vec4<f32>,
    up: vec4<f32>,
    viewport: vec4<f32>,
};

@group(0) @binding(0)
var<uniform> camera: Camera;

struct LineIn {
    @location(0) position: vec3<f32>,
    @location(1) color: vec4<f32>,
};

struct LineOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) color: vec4<f32>,
};

@vertex
fn vs_line(line: LineIn) -> LineOut {
    var out: LineOut;
    out.clip = camera.view_proj * vec4<f32>(line.position, 1.0);
    out.color = line.color;
    return out;
}

@fragment
fn fs_line(frag: LineOut) -> @location(0) vec4<f32> {
    return vec4<f32>(frag.color.rgb * frag.color.a, frag.color.a);
}
"#;

pub(crate) fn create_module(device: &wgpu::Device, label: &str, source: &str) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(label),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    })
}
