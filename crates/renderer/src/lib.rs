//! Renderer crate for driftfield.
//!
//! Puts a `particles::FieldController` inside a `winit` window and draws it
//! with `wgpu`. The flow is:
//!
//! ```text
//!   driftfield CLI
//!          │ RendererConfig
//!          ▼
//!   WindowRuntime::spawn ──▶ window thread ──▶ winit event loop
//!          │ FieldCommand                          │
//!          └──────────── EventLoopProxy ──────────▶ FieldController<GpuBackend>
//!                                                  │ on_frame()
//!                                                  └─▶ GpuBackend::render ─▶ surface
//! ```
//!
//! All simulation state lives on the window thread. The caller only holds a
//! [`WindowRuntime`] and talks to it through [`FieldCommand`]s.

mod gpu;
mod runtime;
mod types;
mod window;

pub use gpu::{GpuBackend, GpuSurfaceTarget};
pub use runtime::FramePacer;
pub use types::{AdapterProfile, Antialiasing, RendererConfig};
pub use window::{FieldCommand, WindowRuntime};
