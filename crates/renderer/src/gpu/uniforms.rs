use bytemuck::{Pod, Zeroable};
use particles::{CameraState, Viewport};

/// World units per unit of particle `size`, applied in the vertex shader.
pub(crate) const POINT_SCALE: f32 = 1.5;

/// Camera block shared by the particle and line pipelines (std140 layout).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// xyz: camera right vector.
    pub right: [f32; 4],
    /// xyz: camera up vector.
    pub up: [f32; 4],
    /// width, height, seconds, point scale.
    pub viewport: [f32; 4],
}

impl CameraUniforms {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            view_proj: glam::Mat4::IDENTITY.to_cols_array_2d(),
            right: [1.0, 0.0, 0.0, 0.0],
            up: [0.0, 1.0, 0.0, 0.0],
            viewport: [
                viewport.width as f32,
                viewport.height as f32,
                0.0,
                POINT_SCALE,
            ],
        }
    }

    pub fn update(&mut self, camera: &CameraState, viewport: Viewport, seconds: f32) {
        self.view_proj = camera.view_projection().to_cols_array_2d();
        let (right, up) = camera.basis();
        self.right = right.extend(0.0).to_array();
        self.up = up.extend(0.0).to_array();
        self.viewport = [
            viewport.width as f32,
            viewport.height as f32,
            seconds,
            POINT_SCALE,
        ];
    }
}

/// One billboard instance per particle.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct ParticleInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 4],
}

impl ParticleInstance {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32, 2 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// One endpoint of a connection line.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub(crate) struct LineVertex {
    pub position: [f32; 3],
    pub color: [f32; 4],
}

impl LineVertex {
    pub const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Fills `out` with one instance per particle of a layer, alpha from the
/// layer's current opacity.
pub(crate) fn pack_layer(layer: &particles::Layer, out: &mut Vec<ParticleInstance>) {
    out.clear();
    let opacity = layer.opacity();
    let positions = layer.positions();
    let colors = layer.colors();
    for (index, size) in layer.sizes().iter().enumerate() {
        let v = index * 3;
        out.push(ParticleInstance {
            position: [positions[v], positions[v + 1], positions[v + 2]],
            size: *size,
            color: [colors[v], colors[v + 1], colors[v + 2], opacity],
        });
    }
}

/// Expands flat edge endpoints into line-list vertices.
pub(crate) fn pack_edges(edges: &[f32], color: [f32; 3], opacity: f32, out: &mut Vec<LineVertex>) {
    out.clear();
    let rgba = [color[0], color[1], color[2], opacity];
    for point in edges.chunks_exact(3) {
        out.push(LineVertex {
            position: [point[0], point[1], point[2]],
            color: rgba,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_block_is_std140_sized() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 112);
        assert_eq!(std::mem::size_of::<ParticleInstance>(), 32);
        assert_eq!(std::mem::size_of::<LineVertex>(), 28);
    }

    #[test]
    fn edges_expand_to_two_vertices_each() {
        let edges = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0];
        let mut out = Vec::new();
        pack_edges(&edges, [0.5, 0.5, 1.0], 0.3, &mut out);
        assert_eq!(out.len(), 4);
        assert_eq!(out[1].position, [3.0, 4.0, 5.0]);
        assert_eq!(out[3].color, [0.5, 0.5, 1.0, 0.3]);
    }

    #[test]
    fn layers_pack_with_current_opacity() {
        let field = fieldconfig::FieldConfig::default().resolve(None).unwrap();
        let set = particles::ParticleLayerSet::new(&field);
        let layer = &set.layers()[1];
        let mut out = Vec::new();
        pack_layer(layer, &mut out);
        assert_eq!(out.len(), layer.count());
        assert!(out.iter().all(|instance| instance.color[3] == layer.opacity()));
        assert_eq!(out[0].position, layer.positions()[0..3]);
    }
}
