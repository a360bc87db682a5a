use penumbra_core::RenderMode;

use crate::{
    global_resources::{DrawUniform, InstanceArray, TransformBlock},
    mesh::ShadowVertex,
    programs::ProgramKind,
    render_pass::{PassKind, RenderPass, RenderStateTracker},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub program: ProgramKind,
    pub pass: PassKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    Quad,
    Cube,
    ShadowVolume { first_vertex: u32, vertex_count: u32 },
    /// Screen-aligned quad expanded in the vertex shader.
    Sprite,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    Background,
    Objects,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawCall {
    pub pipeline: PipelineKey,
    pub pass: RenderPass,
    pub mesh: MeshKind,
    pub instances: u32,
    pub transform_slot: u32,
    pub draw_slot: u32,
    pub material: Option<MaterialKind>,
}

/// Where a pass renders and what it clears first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PassTarget {
    Scene {
        clear_color: bool,
        clear_depth: bool,
        clear_stencil: bool,
    },
    PointShadowFace(u32),
    SpotShadow,
}

impl PassTarget {
    pub const SCENE_CLEAR_ALL: PassTarget = PassTarget::Scene {
        clear_color: true,
        clear_depth: true,
        clear_stencil: true,
    };
    pub const SCENE_CLEAR_STENCIL: PassTarget = PassTarget::Scene {
        clear_color: false,
        clear_depth: false,
        clear_stencil: true,
    };
    pub const SCENE_LOAD: PassTarget = PassTarget::Scene {
        clear_color: false,
        clear_depth: false,
        clear_stencil: false,
    };
}

#[derive(Clone, Debug)]
pub struct PassRecord {
    pub label: String,
    pub target: PassTarget,
    pub draws: Vec<DrawCall>,
}

/// One frame of GPU work as plain data: passes in submission order plus every
/// uniform and vertex they reference.
#[derive(Default)]
pub struct FrameCommands {
    passes: Vec<PassRecord>,
    transforms: Vec<TransformBlock>,
    draw_uniforms: Vec<DrawUniform>,
    shadow_volume: Vec<ShadowVertex>,
    instances: InstanceArray,
    tracker: RenderStateTracker,
    viewport: [f32; 2],
    render_mode: RenderMode,
}

impl FrameCommands {
    /// Forgets the previous frame while keeping allocations.
    pub fn reset(&mut self, viewport: [f32; 2]) {
        self.passes.clear();
        self.transforms.clear();
        self.draw_uniforms.clear();
        self.shadow_volume.clear();
        self.tracker.reset();
        self.viewport = viewport;
    }

    pub fn viewport(&self) -> [f32; 2] {
        self.viewport
    }

    /// Pipelines the frame expects: sample count and polygon mode.
    pub fn set_render_mode(&mut self, render_mode: RenderMode) {
        self.render_mode = render_mode;
    }

    pub fn render_mode(&self) -> RenderMode {
        self.render_mode
    }

    pub fn begin_pass(&mut self, label: impl Into<String>, target: PassTarget) {
        self.passes.push(PassRecord {
            label: label.into(),
            target,
            draws: Vec::new(),
        });
    }

    pub fn push_transform(&mut self, block: TransformBlock) -> u32 {
        self.transforms.push(block);
        (self.transforms.len() - 1) as u32
    }

    pub fn push_draw_uniform(&mut self, uniform: DrawUniform) -> u32 {
        self.draw_uniforms.push(uniform);
        (self.draw_uniforms.len() - 1) as u32
    }

    /// Returns `(first_vertex, vertex_count)` of the appended range.
    pub fn push_shadow_volume(&mut self, vertices: &[ShadowVertex]) -> (u32, u32) {
        let first = self.shadow_volume.len() as u32;
        self.shadow_volume.extend_from_slice(vertices);
        (first, vertices.len() as u32)
    }

    /// Appends to the current pass. Draws before any `begin_pass` are dropped.
    pub fn draw(&mut self, call: DrawCall) {
        let Some(pass) = self.passes.last_mut() else {
            log::warn!("draw recorded outside of a pass: {:?}", call.pipeline);
            return;
        };
        self.tracker.apply(call.pipeline.pass);
        pass.draws.push(call);
    }

    /// Ends the frame leaving color writes enabled.
    pub fn close_frame(&mut self) {
        self.tracker.restore_color_writes();
    }

    pub fn passes(&self) -> &[PassRecord] {
        &self.passes
    }

    pub fn transforms(&self) -> &[TransformBlock] {
        &self.transforms
    }

    pub fn draw_uniforms(&self) -> &[DrawUniform] {
        &self.draw_uniforms
    }

    pub fn shadow_volume_vertices(&self) -> &[ShadowVertex] {
        &self.shadow_volume
    }

    pub fn instances(&self) -> &InstanceArray {
        &self.instances
    }

    pub fn instances_mut(&mut self) -> &mut InstanceArray {
        &mut self.instances
    }

    pub fn tracker(&self) -> &RenderStateTracker {
        &self.tracker
    }

    pub fn draw_calls(&self) -> impl Iterator<Item = &DrawCall> {
        self.passes.iter().flat_map(|pass| pass.draws.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Mat4;

    fn call(pass: PassKind) -> DrawCall {
        DrawCall {
            pipeline: PipelineKey {
                program: ProgramKind::Default,
                pass,
            },
            pass: RenderPass::DEPTH_PASS,
            mesh: MeshKind::Quad,
            instances: 1,
            transform_slot: 0,
            draw_slot: 0,
            material: None,
        }
    }

    #[test]
    fn draws_land_in_the_open_pass() {
        let mut frame = FrameCommands::default();
        frame.draw(call(PassKind::DepthPrime));
        assert!(frame.passes().is_empty());

        frame.begin_pass("a", PassTarget::SCENE_CLEAR_ALL);
        frame.draw(call(PassKind::DepthPrime));
        frame.begin_pass("b", PassTarget::SCENE_CLEAR_STENCIL);
        frame.draw(call(PassKind::LightUnstenciled));
        frame.draw(call(PassKind::LightUnstenciled));

        assert_eq!(frame.passes().len(), 2);
        assert_eq!(frame.passes()[1].draws.len(), 2);
        assert_eq!(frame.draw_calls().count(), 3);
        assert_eq!(frame.tracker().steps().len(), 2);
    }

    #[test]
    fn slots_are_sequential_and_reset() {
        let mut frame = FrameCommands::default();
        let block = TransformBlock::new(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(frame.push_transform(block), 0);
        assert_eq!(frame.push_transform(block), 1);
        assert_eq!(frame.push_shadow_volume(&[[0.0; 4]; 6]), (0, 6));
        assert_eq!(frame.push_shadow_volume(&[[1.0; 4]; 3]), (6, 3));

        frame.reset([640.0, 480.0]);
        assert!(frame.transforms().is_empty());
        assert!(frame.shadow_volume_vertices().is_empty());
        assert_eq!(frame.viewport(), [640.0, 480.0]);
    }
}
