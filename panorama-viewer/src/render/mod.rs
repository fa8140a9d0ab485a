//! Rendering: backend seam, wgpu renderer and GPU bring-up

pub mod backend;
pub mod gpu_context;
pub mod renderer;

pub use backend::{NullBackend, RenderBackend};
pub use gpu_context::{GpuContext, GpuError, WindowSurface};
pub use renderer::PanoramaRenderer;
