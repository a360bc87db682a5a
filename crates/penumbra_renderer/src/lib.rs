//! Stencil shadow volumes and shadow maps for point and spot lights on wgpu.
//!
//! [`Scene`] records each frame into [`FrameCommands`] without touching the
//! GPU; [`FrameOrchestrator`] uploads, encodes and presents what it recorded.

pub mod commands;
pub mod context;
pub mod error;
pub mod frame;
pub mod global_resources;
pub mod light;
pub mod mesh;
pub mod programs;
pub mod render_pass;
pub mod scene;
pub mod scene_renderer;
pub mod shadow_maps;
pub mod shadow_volume;
pub mod texture;

pub use commands::{DrawCall, FrameCommands, PassTarget, PipelineKey};
pub use error::RenderError;
pub use frame::FrameOrchestrator;
pub use global_resources::MAX_INSTANCES;
pub use programs::{ProgramKind, ProgramReflection, Semantic};
pub use render_pass::{PassKind, RenderPass, RenderState, StencilPolicy};
pub use scene::{PassContext, Scene, SceneSettings};
