//! wgpu backend for the particle field.
//!
//! - `context` owns instance, device and swapchain wiring.
//! - `pipeline` builds the billboard and line pipelines around one camera
//!   bind group layout, with `shaders` holding their WGSL.
//! - `uniforms` defines the GPU-side structs and packs layers and edges.
//! - `state` implements `particles::RenderBackend` on top of all of it.

mod context;
mod pipeline;
mod shaders;
mod state;
mod uniforms;

pub use state::{GpuBackend, GpuSurfaceTarget};
