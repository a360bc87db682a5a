use thiserror::Error;

use crate::programs::ProgramKind;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    UnsupportedSurface,
    #[error("GPU ran out of memory")]
    OutOfMemory,
    #[error("{program:?}: shader parse failed: {message}")]
    ShaderParse { program: ProgramKind, message: String },
    #[error("{program:?}: block `{block}` is {shader} bytes in WGSL but {host} bytes on the host")]
    LayoutMismatch {
        program: ProgramKind,
        block: &'static str,
        shader: u32,
        host: u32,
    },
    #[error("pipeline creation failed: {0}")]
    Pipeline(String),
}
