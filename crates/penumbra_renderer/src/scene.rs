//! The demo scene and its multi-pass frame.
//!
//! `Scene` owns every CPU-side piece of state (cubes, lights, the animation
//! clock) and records each frame into [`FrameCommands`]. Recording touches no
//! GPU object; the frame orchestrator uploads and encodes what was recorded.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3, Vec4};
use log::{debug, info, warn};
use penumbra_core::{Camera, RenderMode};
use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    commands::{DrawCall, FrameCommands, MaterialKind, MeshKind, PassTarget, PipelineKey},
    global_resources::{DrawUniform, MAX_INSTANCES, TransformBlock},
    light::{LIGHT_PATH_OFFSET, LIGHT_PATH_SCALE, LightParams, PointLight, ShadowLookup, SpotLight, lissajous},
    mesh::{AdjacencyMesh, create_cube_adjacency},
    programs::ProgramKind,
    render_pass::{PassKind, RenderPass, StencilPolicy},
    shadow_maps::{SHADOW_FAR, cube_face_matrices, spot_matrices},
    shadow_volume::build_shadow_volumes,
};

pub const DEFAULT_BASE_AMBIENT: f32 = 1e-3;

const FIRST_CUBE_POSITION: Vec3 = Vec3::new(0.0, 0.5, 0.0);
const FIRST_LIGHT_POSITION: Vec3 = Vec3::new(-3.0, 3.0, 0.0);
const FIRST_LIGHT_PATH_ORIGIN: Vec3 = Vec3::new(-3.0, 2.0, 0.0);
const FIRST_LIGHT_MOVEMENT: Vec4 = Vec4::new(0.0, 1.0, 0.0, 0.0);
const FIRST_LIGHT_COLOR: Vec3 = Vec3::new(10.0, 10.0, 10.0);
const BACKGROUND_SCALE: Vec3 = Vec3::new(30.0, 1.0, 30.0);

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneSettings {
    /// Ambient intensity shared by all point lights.
    pub base_ambient: f32,
    pub seed: u64,
    /// Shade spot lights with their direct term, shadowed by the spot map.
    pub spot_direct_light: bool,
}

impl Default for SceneSettings {
    fn default() -> Self {
        Self {
            base_ambient: DEFAULT_BASE_AMBIENT,
            seed: 0x5eed,
            spot_direct_light: false,
        }
    }
}

/// The view a group of passes renders with.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassContext {
    pub transform_slot: u32,
    pub view_position: Vec3,
    pub instance_count: u32,
}

/// Floor plus the Z and X walls.
pub fn background_transforms() -> [Mat4; 3] {
    let scale = Mat4::from_scale(BACKGROUND_SCALE);
    [
        scale,
        Mat4::from_translation(Vec3::new(0.0, 0.0, 15.0)) * Mat4::from_rotation_x(-FRAC_PI_2) * scale,
        Mat4::from_translation(Vec3::new(15.0, 0.0, 0.0)) * Mat4::from_rotation_z(FRAC_PI_2) * scale,
    ]
}

pub fn cube_transform(index: usize, position: Vec3) -> Mat4 {
    let angle = (20.0 * index as f32).to_radians();
    Mat4::from_translation(position) * Mat4::from_axis_angle(Vec3::ONE.normalize(), angle)
}

pub struct Scene {
    settings: SceneSettings,
    initialized: bool,
    clock: f32,
    viewport: [f32; 2],
    cube_positions: Vec<Vec3>,
    cube_models: Vec<Mat4>,
    background: [Mat4; 3],
    point_lights: Vec<PointLight>,
    spot_lights: Vec<SpotLight>,
    cube_adjacency: AdjacencyMesh,
    commands: FrameCommands,
}

impl Scene {
    pub fn new(settings: SceneSettings) -> Self {
        Self {
            settings,
            initialized: false,
            clock: 0.0,
            viewport: [1.0, 1.0],
            cube_positions: Vec::new(),
            cube_models: Vec::new(),
            background: background_transforms(),
            point_lights: Vec::new(),
            spot_lights: Vec::new(),
            cube_adjacency: create_cube_adjacency(),
            commands: FrameCommands::default(),
        }
    }

    /// Generates cubes and lights. Calling it again is a no-op.
    pub fn init(&mut self, num_instances: usize, num_point_lights: usize, num_spot_lights: usize) {
        if self.initialized {
            debug!("Scene already initialized");
            return;
        }

        let num_instances = if num_instances > MAX_INSTANCES {
            warn!("{num_instances} cubes requested, clamping to {MAX_INSTANCES}");
            MAX_INSTANCES
        } else {
            num_instances
        };

        let mut rng = StdRng::seed_from_u64(self.settings.seed);

        self.cube_positions = (0..num_instances)
            .map(|i| {
                if i == 0 {
                    FIRST_CUBE_POSITION
                } else {
                    Vec3::new(rng.gen_range(-5.0..=5.0), rng.gen_range(1.0..=5.0), rng.gen_range(-5.0..=5.0))
                }
            })
            .collect();
        self.cube_models = self
            .cube_positions
            .iter()
            .enumerate()
            .map(|(i, p)| cube_transform(i, *p))
            .collect();

        // Total ambient stays the same however many lights share it
        let ambient = self.settings.base_ambient / num_point_lights.max(1) as f32;

        self.point_lights = (0..num_point_lights)
            .map(|i| {
                if i == 0 {
                    return PointLight {
                        position: FIRST_LIGHT_POSITION,
                        color: FIRST_LIGHT_COLOR.extend(ambient),
                        movement: FIRST_LIGHT_MOVEMENT,
                    };
                }
                let movement = random_movement(&mut rng);
                PointLight {
                    position: LIGHT_PATH_OFFSET + lissajous(movement, 0.0) * LIGHT_PATH_SCALE,
                    color: random_color(&mut rng).extend(ambient),
                    movement,
                }
            })
            .collect();

        self.spot_lights = (0..num_spot_lights)
            .map(|_| {
                let movement = random_movement(&mut rng);
                SpotLight::new(
                    LIGHT_PATH_OFFSET + lissajous(movement, 0.0) * LIGHT_PATH_SCALE,
                    random_color(&mut rng).extend(ambient),
                    movement,
                )
            })
            .collect();

        self.initialized = true;
        info!(
            "Scene ready: {} cubes, {} point lights, {} spot lights",
            self.cube_positions.len(),
            self.point_lights.len(),
            self.spot_lights.len()
        );
    }

    /// Moves the lights along their paths. Positions use the clock value from
    /// before `dt` is added.
    pub fn update(&mut self, dt: f32) {
        let t = self.clock;

        for (i, light) in self.point_lights.iter_mut().enumerate() {
            light.position = if i == 0 {
                FIRST_LIGHT_PATH_ORIGIN + lissajous(light.movement, t)
            } else {
                LIGHT_PATH_OFFSET + lissajous(light.movement, t) * LIGHT_PATH_SCALE
            };
        }

        for light in &mut self.spot_lights {
            light.position = LIGHT_PATH_OFFSET + lissajous(light.movement, t) * LIGHT_PATH_SCALE;
            light.aim_at_origin();
        }

        self.clock += dt;
    }

    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.viewport = [width.max(1) as f32, height.max(1) as f32];
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn clock(&self) -> f32 {
        self.clock
    }

    pub fn settings(&self) -> &SceneSettings {
        &self.settings
    }

    pub fn set_spot_direct_light(&mut self, enabled: bool) {
        self.settings.spot_direct_light = enabled;
    }

    pub fn point_lights(&self) -> &[PointLight] {
        &self.point_lights
    }

    pub fn spot_lights(&self) -> &[SpotLight] {
        &self.spot_lights
    }

    pub fn cube_models(&self) -> &[Mat4] {
        &self.cube_models
    }

    pub fn background_models(&self) -> &[Mat4; 3] {
        &self.background
    }

    pub fn commands(&self) -> &FrameCommands {
        &self.commands
    }

    // --------------------------------------------------------------------------
    // Frame recording
    // --------------------------------------------------------------------------

    /// Starts a frame seen through `camera`: uploads instance transforms and
    /// the camera transform block.
    pub fn begin_frame(&mut self, camera: &Camera, render_mode: &RenderMode) -> PassContext {
        self.commands.reset(self.viewport);
        self.commands.set_render_mode(*render_mode);

        let instance_count = self.commands.instances_mut().write(self.cube_models.iter().copied()) as u32;
        let transform_slot = self
            .commands
            .push_transform(TransformBlock::new(camera.world_to_view(), camera.projection()));

        PassContext {
            transform_slot,
            view_position: camera.position(),
            instance_count,
        }
    }

    /// Leaves color writes enabled for whatever draws after the scene.
    pub fn end_frame(&mut self) {
        self.commands.close_frame();
    }

    /// Full frame with stencil shadow volumes for point lights.
    pub fn draw(&mut self, camera: &Camera, render_mode: &RenderMode, carmack_reverse: bool) {
        let ctx = self.begin_frame(camera, render_mode);
        self.draw_depth_prime(&ctx);

        let policy = StencilPolicy::from_carmack_reverse(carmack_reverse);
        for i in 0..self.point_lights.len() {
            let light = LightParams::point(&self.point_lights[i]);

            // New pass per light: the stencil starts at zero
            self.commands.begin_pass(format!("Point Light {i}"), PassTarget::SCENE_CLEAR_STENCIL);
            self.draw_shadow_volumes(&ctx, &light, policy);
            self.draw_lit(&ctx, PassKind::LightStenciled, RenderPass::DIRECT_LIGHT, &light);
            self.draw_lit(&ctx, PassKind::LightUnstenciled, RenderPass::AMBIENT_LIGHT, &light);
        }

        for i in 0..self.spot_lights.len() {
            let light = LightParams::spot(&self.spot_lights[i]);

            self.commands.begin_pass(format!("Spot Light {i}"), PassTarget::SCENE_LOAD);
            if self.settings.spot_direct_light {
                self.draw_lit(&ctx, PassKind::LightUnstenciled, RenderPass::DIRECT_LIGHT, &light);
            }
            self.draw_lit(&ctx, PassKind::LightUnstenciled, RenderPass::AMBIENT_LIGHT, &light);
        }

        self.end_frame();
    }

    /// Full frame with shadow maps: per light its depth passes, then its
    /// light passes.
    pub fn draw_shadow_mapped(&mut self, camera: &Camera, render_mode: &RenderMode) {
        let ctx = self.begin_frame(camera, render_mode);
        self.draw_depth_prime(&ctx);

        for i in 0..self.point_lights.len() {
            self.draw_depth_single_point_light(&ctx, i);
            self.draw_light_single_point_light(&ctx, i);
        }
        for i in 0..self.spot_lights.len() {
            self.draw_depth_single_spot_light(&ctx, i);
            self.draw_light_single_spot_light(&ctx, i);
        }

        self.end_frame();
    }

    /// Clears the scene targets and fills depth with color writes off.
    pub fn draw_depth_prime(&mut self, ctx: &PassContext) {
        self.commands.begin_pass("Depth Prime", PassTarget::SCENE_CLEAR_ALL);
        self.draw_geometry(
            ctx,
            (ProgramKind::DefaultDepthPass, ProgramKind::InstancingDepthPass),
            PassKind::DepthPrime,
            RenderPass::DEPTH_PASS,
            None,
        );
    }

    /// Renders distance to the point light into all six cube faces.
    pub fn draw_depth_single_point_light(&mut self, ctx: &PassContext, index: usize) {
        let Some(light) = self.point_lights.get(index) else {
            warn!("No point light {index}");
            return;
        };
        let light = LightParams::point(light).with_shadow(ShadowLookup::Cube, Mat4::IDENTITY, SHADOW_FAR);

        for face in 0..6u32 {
            let (view, projection) = cube_face_matrices(light.position, face as usize, SHADOW_FAR);
            let face_ctx = PassContext {
                transform_slot: self.commands.push_transform(TransformBlock::new(view, projection)),
                view_position: light.position,
                instance_count: ctx.instance_count,
            };

            self.commands
                .begin_pass(format!("Point Light {index} Face {face}"), PassTarget::PointShadowFace(face));
            self.draw_geometry(
                &face_ctx,
                (ProgramKind::LightSourceDepthPass, ProgramKind::InstancedLightSourceDepthPass),
                PassKind::LightSourceDepth,
                RenderPass::SHADOW_MAP,
                Some(&light),
            );
        }
    }

    /// Direct light tested against the cube map, then ambient.
    pub fn draw_light_single_point_light(&mut self, ctx: &PassContext, index: usize) {
        let Some(light) = self.point_lights.get(index) else {
            warn!("No point light {index}");
            return;
        };
        let light = LightParams::point(light).with_shadow(ShadowLookup::Cube, Mat4::IDENTITY, SHADOW_FAR);

        self.commands.begin_pass(format!("Point Light {index}"), PassTarget::SCENE_LOAD);
        self.draw_lit(
            ctx,
            PassKind::LightUnstenciled,
            RenderPass::DIRECT_LIGHT | RenderPass::SHADOW_MAP,
            &light,
        );
        self.draw_lit(ctx, PassKind::LightUnstenciled, RenderPass::AMBIENT_LIGHT, &light);
    }

    /// Renders scene depth from the spot light into the 2D shadow map.
    pub fn draw_depth_single_spot_light(&mut self, ctx: &PassContext, index: usize) {
        let Some(light) = self.spot_lights.get(index) else {
            warn!("No spot light {index}");
            return;
        };
        let (view, projection) = spot_matrices(light.position, light.direction);
        let light_ctx = PassContext {
            transform_slot: self.commands.push_transform(TransformBlock::new(view, projection)),
            view_position: light.position,
            instance_count: ctx.instance_count,
        };

        self.commands.begin_pass(format!("Spot Light {index} Depth"), PassTarget::SpotShadow);
        self.draw_geometry(
            &light_ctx,
            (ProgramKind::DefaultDepthPass, ProgramKind::InstancingDepthPass),
            PassKind::LightSourceDepth,
            RenderPass::SHADOW_MAP,
            None,
        );
    }

    /// Ambient for the spot light, preceded by its shadow-mapped direct term
    /// when enabled.
    pub fn draw_light_single_spot_light(&mut self, ctx: &PassContext, index: usize) {
        let Some(light) = self.spot_lights.get(index) else {
            warn!("No spot light {index}");
            return;
        };
        let (view, projection) = spot_matrices(light.position, light.direction);
        let light = LightParams::spot(light).with_shadow(ShadowLookup::Spot, projection * view, SHADOW_FAR);

        self.commands.begin_pass(format!("Spot Light {index}"), PassTarget::SCENE_LOAD);
        if self.settings.spot_direct_light {
            self.draw_lit(
                ctx,
                PassKind::LightUnstenciled,
                RenderPass::DIRECT_LIGHT | RenderPass::SHADOW_MAP,
                &light,
            );
        }
        self.draw_lit(ctx, PassKind::LightUnstenciled, RenderPass::AMBIENT_LIGHT, &light);
    }

    // --------------------------------------------------------------------------
    // Draw helpers
    // --------------------------------------------------------------------------

    fn draw_lit(&mut self, ctx: &PassContext, pass: PassKind, flags: RenderPass, light: &LightParams) {
        self.draw_geometry(ctx, (ProgramKind::Default, ProgramKind::Instancing), pass, flags, Some(light));

        // Light source marker, drawn during the ambient pass
        if flags.has_ambient() {
            self.draw_sprite(ctx, light);
        }
    }

    /// Background quads with the first program, instanced cubes with the second.
    fn draw_geometry(
        &mut self,
        ctx: &PassContext,
        (background, instanced): (ProgramKind, ProgramKind),
        pass: PassKind,
        flags: RenderPass,
        light: Option<&LightParams>,
    ) {
        let lit = flags.has_light();

        for model in self.background {
            let draw_slot = self.commands.push_draw_uniform(DrawUniform::new(
                &model,
                flags,
                light,
                ctx.view_position,
                self.viewport,
            ));
            self.commands.draw(DrawCall {
                pipeline: PipelineKey { program: background, pass },
                pass: flags,
                mesh: MeshKind::Quad,
                instances: 1,
                transform_slot: ctx.transform_slot,
                draw_slot,
                material: lit.then_some(MaterialKind::Background),
            });
        }

        if ctx.instance_count == 0 {
            return;
        }
        let draw_slot = self.commands.push_draw_uniform(DrawUniform::new(
            &Mat4::IDENTITY,
            flags,
            light,
            ctx.view_position,
            self.viewport,
        ));
        self.commands.draw(DrawCall {
            pipeline: PipelineKey { program: instanced, pass },
            pass: flags,
            mesh: MeshKind::Cube,
            instances: ctx.instance_count,
            transform_slot: ctx.transform_slot,
            draw_slot,
            material: lit.then_some(MaterialKind::Objects),
        });
    }

    fn draw_shadow_volumes(&mut self, ctx: &PassContext, light: &LightParams, policy: StencilPolicy) {
        let models = &self.cube_models[..ctx.instance_count as usize];
        let vertices = build_shadow_volumes(&self.cube_adjacency, models, light.position);
        let (first_vertex, vertex_count) = self.commands.push_shadow_volume(&vertices);
        if vertex_count == 0 {
            return;
        }

        let draw_slot = self.commands.push_draw_uniform(DrawUniform::new(
            &Mat4::IDENTITY,
            RenderPass::SHADOW_VOLUME,
            Some(light),
            ctx.view_position,
            self.viewport,
        ));
        self.commands.draw(DrawCall {
            pipeline: PipelineKey {
                program: ProgramKind::InstancedShadowVolume,
                pass: PassKind::ShadowVolume(policy),
            },
            pass: RenderPass::SHADOW_VOLUME,
            mesh: MeshKind::ShadowVolume {
                first_vertex,
                vertex_count,
            },
            instances: 1,
            transform_slot: ctx.transform_slot,
            draw_slot,
            material: None,
        });
    }

    fn draw_sprite(&mut self, ctx: &PassContext, light: &LightParams) {
        let draw_slot = self.commands.push_draw_uniform(DrawUniform::sprite(light, self.viewport));
        self.commands.draw(DrawCall {
            pipeline: PipelineKey {
                program: ProgramKind::PointRendering,
                pass: PassKind::LightSprite,
            },
            pass: RenderPass::AMBIENT_LIGHT,
            mesh: MeshKind::Sprite,
            instances: 1,
            transform_slot: ctx.transform_slot,
            draw_slot,
            material: None,
        });
    }
}

fn random_movement(rng: &mut StdRng) -> Vec4 {
    Vec4::new(
        rng.gen_range(-2.0..=2.0),
        rng.gen_range(-2.0..=2.0),
        rng.gen_range(-2.0..=2.0),
        rng.gen_range(-2.0..=2.0),
    )
}

fn random_color(rng: &mut StdRng) -> Vec3 {
    Vec3::new(rng.gen_range(0.0..=5.0), rng.gen_range(0.0..=5.0), rng.gen_range(0.0..=5.0))
}
