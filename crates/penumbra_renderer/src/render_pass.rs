use bitflags::bitflags;
use wgpu::{
    BlendComponent, BlendFactor, BlendOperation, BlendState, ColorTargetState, ColorWrites, CompareFunction,
    DepthStencilState, Face, FrontFace, PolygonMode, PrimitiveState, PrimitiveTopology, StencilFaceState,
    StencilOperation, StencilState, TextureFormat,
};

bitflags! {
    /// Classifies a draw along two axes: which geometry pass it belongs to and
    /// which lighting terms it contributes.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RenderPass: u32 {
        const DEPTH_PASS    = 0x0001;
        const SHADOW_VOLUME = 0x0002;
        const DIRECT_LIGHT  = 0x0004;
        const AMBIENT_LIGHT = 0x0008;
        const SHADOW_MAP    = 0x0010;

        const LIGHT_PASS  = Self::DIRECT_LIGHT.bits() | Self::AMBIENT_LIGHT.bits();
        const SHADOW_PASS = Self::SHADOW_MAP.bits() | Self::SHADOW_VOLUME.bits();
    }
}

impl RenderPass {
    pub fn is_depth(self) -> bool {
        self.intersects(Self::DEPTH_PASS)
    }

    pub fn has_direct(self) -> bool {
        self.intersects(Self::DIRECT_LIGHT)
    }

    pub fn has_ambient(self) -> bool {
        self.intersects(Self::AMBIENT_LIGHT)
    }

    pub fn has_light(self) -> bool {
        self.intersects(Self::LIGHT_PASS)
    }

    pub fn has_shadow(self) -> bool {
        self.intersects(Self::SHADOW_PASS)
    }

    pub fn has_shadow_volume(self) -> bool {
        self.intersects(Self::SHADOW_VOLUME)
    }

    pub fn has_shadow_map(self) -> bool {
        self.intersects(Self::SHADOW_MAP)
    }
}

/// How shadow-volume faces update the stencil buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilPolicy {
    /// Carmack's reverse: count faces behind the visible surface.
    DepthFail,
    /// Count faces between the eye and the visible surface.
    DepthPass,
}

impl StencilPolicy {
    pub fn from_carmack_reverse(enabled: bool) -> Self {
        if enabled {
            StencilPolicy::DepthFail
        } else {
            StencilPolicy::DepthPass
        }
    }

    /// Returns `(front, back)` face operations.
    pub fn face_states(self) -> (StencilFaceState, StencilFaceState) {
        let keep = StencilFaceState {
            compare: CompareFunction::Always,
            fail_op: StencilOperation::Keep,
            depth_fail_op: StencilOperation::Keep,
            pass_op: StencilOperation::Keep,
        };
        match self {
            StencilPolicy::DepthFail => (
                StencilFaceState {
                    depth_fail_op: StencilOperation::DecrementWrap,
                    ..keep
                },
                StencilFaceState {
                    depth_fail_op: StencilOperation::IncrementWrap,
                    ..keep
                },
            ),
            StencilPolicy::DepthPass => (
                StencilFaceState {
                    pass_op: StencilOperation::IncrementWrap,
                    ..keep
                },
                StencilFaceState {
                    pass_op: StencilOperation::DecrementWrap,
                    ..keep
                },
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StencilMode {
    Disabled,
    /// Shadow-volume faces count into the stencil buffer.
    Accumulate(StencilPolicy),
    /// Only pixels whose stencil is zero pass; stencil is read-only.
    OutsideVolume,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlendMode {
    Replace,
    Additive,
}

/// Fixed-function state of one draw group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RenderState {
    pub color_write: bool,
    pub depth_write: bool,
    pub depth_compare: CompareFunction,
    pub stencil: StencilMode,
    pub blend: BlendMode,
    pub cull: Option<Face>,
}

impl RenderState {
    /// State of a freshly bound target before any pass touched it.
    pub const INITIAL: RenderState = RenderState {
        color_write: true,
        depth_write: true,
        depth_compare: CompareFunction::LessEqual,
        stencil: StencilMode::Disabled,
        blend: BlendMode::Replace,
        cull: Some(Face::Back),
    };

    pub fn depth_stencil_state(&self, format: TextureFormat) -> DepthStencilState {
        let stencil = match self.stencil {
            StencilMode::Disabled => StencilState::default(),
            StencilMode::Accumulate(policy) => {
                let (front, back) = policy.face_states();
                StencilState {
                    front,
                    back,
                    read_mask: 0xff,
                    write_mask: 0xff,
                }
            }
            StencilMode::OutsideVolume => {
                let equal_zero = StencilFaceState {
                    compare: CompareFunction::Equal,
                    fail_op: StencilOperation::Keep,
                    depth_fail_op: StencilOperation::Keep,
                    pass_op: StencilOperation::Keep,
                };
                StencilState {
                    front: equal_zero,
                    back: equal_zero,
                    read_mask: 0xff,
                    write_mask: 0,
                }
            }
        };

        DepthStencilState {
            format,
            depth_write_enabled: self.depth_write,
            depth_compare: self.depth_compare,
            stencil,
            bias: Default::default(),
        }
    }

    pub fn color_target(&self, format: TextureFormat) -> ColorTargetState {
        let blend = match self.blend {
            BlendMode::Replace => None,
            BlendMode::Additive => {
                let add = BlendComponent {
                    src_factor: BlendFactor::One,
                    dst_factor: BlendFactor::One,
                    operation: BlendOperation::Add,
                };
                Some(BlendState { color: add, alpha: add })
            }
        };
        ColorTargetState {
            format,
            blend,
            write_mask: if self.color_write {
                ColorWrites::ALL
            } else {
                ColorWrites::empty()
            },
        }
    }

    pub fn primitive_state(&self, polygon_mode: PolygonMode, unclipped_depth: bool) -> PrimitiveState {
        PrimitiveState {
            topology: PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: FrontFace::Ccw,
            cull_mode: self.cull,
            unclipped_depth,
            polygon_mode,
            conservative: false,
        }
    }
}

/// The named pass states a frame moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PassKind {
    DepthPrime,
    ShadowVolume(StencilPolicy),
    /// Direct light restricted to pixels outside every shadow volume.
    LightStenciled,
    LightUnstenciled,
    LightSprite,
    /// Depth rendered from a light into a shadow map.
    LightSourceDepth,
}

impl PassKind {
    pub fn render_state(self) -> RenderState {
        match self {
            PassKind::DepthPrime => RenderState {
                color_write: false,
                ..RenderState::INITIAL
            },
            PassKind::ShadowVolume(policy) => RenderState {
                color_write: false,
                depth_write: false,
                stencil: StencilMode::Accumulate(policy),
                cull: None,
                ..RenderState::INITIAL
            },
            PassKind::LightStenciled => RenderState {
                depth_write: false,
                stencil: StencilMode::OutsideVolume,
                blend: BlendMode::Additive,
                ..RenderState::INITIAL
            },
            PassKind::LightUnstenciled => RenderState {
                depth_write: false,
                blend: BlendMode::Additive,
                ..RenderState::INITIAL
            },
            PassKind::LightSprite => RenderState {
                depth_write: false,
                cull: None,
                ..RenderState::INITIAL
            },
            PassKind::LightSourceDepth => RenderState {
                color_write: false,
                cull: None,
                ..RenderState::INITIAL
            },
        }
    }

    /// Whether the pass renders into a shadow map rather than the scene targets.
    pub fn targets_shadow_map(self) -> bool {
        matches!(self, PassKind::LightSourceDepth)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Scene,
    ShadowMap,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateStep {
    pub target: TargetKind,
    pub pass: PassKind,
    pub state: RenderState,
}

/// Captures the sequence of fixed-function states a frame goes through.
#[derive(Clone, Debug)]
pub struct RenderStateTracker {
    current: RenderState,
    steps: Vec<StateStep>,
}

impl Default for RenderStateTracker {
    fn default() -> Self {
        Self {
            current: RenderState::INITIAL,
            steps: Vec::new(),
        }
    }
}

impl RenderStateTracker {
    pub fn apply(&mut self, pass: PassKind) {
        let target = if pass.targets_shadow_map() {
            TargetKind::ShadowMap
        } else {
            TargetKind::Scene
        };
        let state = pass.render_state();
        let step = StateStep { target, pass, state };
        if self.steps.last() != Some(&step) {
            self.steps.push(step);
        }
        self.current = state;
    }

    /// Leaves the target with color writes on for whoever draws next.
    pub fn restore_color_writes(&mut self) {
        self.current.color_write = true;
    }

    pub fn current(&self) -> &RenderState {
        &self.current
    }

    pub fn steps(&self) -> &[StateStep] {
        &self.steps
    }

    pub fn reset(&mut self) {
        self.current = RenderState::INITIAL;
        self.steps.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_test_bits_not_equality() {
        let pass = RenderPass::DIRECT_LIGHT | RenderPass::SHADOW_MAP;
        assert!(pass.has_direct());
        assert!(pass.has_light());
        assert!(pass.has_shadow());
        assert!(!pass.has_ambient());
        assert!(!pass.is_depth());

        assert!(RenderPass::AMBIENT_LIGHT.has_light());
        assert!(RenderPass::SHADOW_VOLUME.has_shadow());
        assert!(!RenderPass::DEPTH_PASS.has_light());
        assert_eq!(RenderPass::LIGHT_PASS.bits(), 0x0c);
        assert_eq!(RenderPass::SHADOW_PASS.bits(), 0x12);
    }

    #[test]
    fn depth_fail_pairs_ops_on_depth_fail() {
        let (front, back) = StencilPolicy::DepthFail.face_states();
        assert_eq!(back.depth_fail_op, StencilOperation::IncrementWrap);
        assert_eq!(front.depth_fail_op, StencilOperation::DecrementWrap);
        assert_eq!(front.pass_op, StencilOperation::Keep);
        assert_eq!(back.pass_op, StencilOperation::Keep);
        assert_eq!(front.compare, CompareFunction::Always);
    }

    #[test]
    fn depth_pass_pairs_ops_on_pass() {
        let (front, back) = StencilPolicy::DepthPass.face_states();
        assert_eq!(back.pass_op, StencilOperation::DecrementWrap);
        assert_eq!(front.pass_op, StencilOperation::IncrementWrap);
        assert_eq!(front.depth_fail_op, StencilOperation::Keep);
        assert_eq!(back.depth_fail_op, StencilOperation::Keep);
    }

    #[test]
    fn shadow_volume_state_is_stencil_only() {
        let state = PassKind::ShadowVolume(StencilPolicy::DepthFail).render_state();
        assert!(!state.color_write);
        assert!(!state.depth_write);
        assert_eq!(state.cull, None);

        let ds = state.depth_stencil_state(TextureFormat::Depth24PlusStencil8);
        assert!(ds.stencil.is_enabled());
        assert_eq!(ds.stencil.write_mask, 0xff);
        assert_eq!(state.color_target(TextureFormat::Rgba16Float).write_mask, ColorWrites::empty());
    }

    #[test]
    fn stenciled_light_tests_equal_zero_and_adds() {
        let state = PassKind::LightStenciled.render_state();
        let ds = state.depth_stencil_state(TextureFormat::Depth24PlusStencil8);
        assert_eq!(ds.stencil.front.compare, CompareFunction::Equal);
        assert_eq!(ds.stencil.back.compare, CompareFunction::Equal);
        assert_eq!(ds.stencil.write_mask, 0);

        let target = state.color_target(TextureFormat::Rgba16Float);
        assert_eq!(target.write_mask, ColorWrites::ALL);
        let blend = target.blend.unwrap();
        assert_eq!(blend.color.src_factor, BlendFactor::One);
        assert_eq!(blend.color.dst_factor, BlendFactor::One);
    }

    #[test]
    fn only_depth_passes_write_depth() {
        let policy = StencilPolicy::DepthPass;
        for pass in [
            PassKind::ShadowVolume(policy),
            PassKind::LightStenciled,
            PassKind::LightUnstenciled,
            PassKind::LightSprite,
        ] {
            assert!(!pass.render_state().depth_write, "{pass:?}");
        }
        assert!(PassKind::DepthPrime.render_state().depth_write);
        assert!(!PassKind::DepthPrime.render_state().color_write);
        assert!(PassKind::LightSourceDepth.render_state().depth_write);
    }

    #[test]
    fn shadow_map_depth_has_no_stencil() {
        let ds = PassKind::LightSourceDepth
            .render_state()
            .depth_stencil_state(TextureFormat::Depth32Float);
        assert!(!ds.stencil.is_enabled());
    }

    #[test]
    fn tracker_collapses_repeats_and_restores_color() {
        let mut tracker = RenderStateTracker::default();
        tracker.apply(PassKind::DepthPrime);
        tracker.apply(PassKind::DepthPrime);
        tracker.apply(PassKind::LightSourceDepth);
        assert_eq!(tracker.steps().len(), 2);
        assert_eq!(tracker.steps()[1].target, TargetKind::ShadowMap);
        assert!(!tracker.current().color_write);

        tracker.restore_color_writes();
        assert!(tracker.current().color_write);

        tracker.reset();
        assert!(tracker.steps().is_empty());
        assert_eq!(*tracker.current(), RenderState::INITIAL);
    }
}
