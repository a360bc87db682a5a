use std::sync::Arc;

use log::{error, info, warn};
use penumbra_core::{Camera, DemoConfig, RenderMode, ShadowTechnique};
use winit::window::Window;

use crate::{
    context::GpuContext,
    error::RenderError,
    global_resources::{GlobalResources, InstanceData, MAX_INSTANCES},
    programs::{
        GpuProgram, GpuProgramRenderContext, PipelineConfig, ProgramReflection, ProgramRegistry, Semantic,
        TonemapProgram,
    },
    scene::{Scene, SceneSettings},
    scene_renderer::{SceneRenderer, SceneTargets},
    shadow_maps::ShadowMapTargets,
    texture::TextureHelper,
};

/// Color and depth/stencil targets of the scene passes.
struct HdrTargets {
    sample_count: u32,
    color: wgpu::TextureView,
    /// Present only when `color` is multisampled.
    resolve: Option<wgpu::TextureView>,
    depth_stencil: wgpu::TextureView,
}

impl HdrTargets {
    fn new(device: &wgpu::Device, width: u32, height: u32, sample_count: u32) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let color = TextureHelper::create_hdr_texture(device, width, height, sample_count, "HDR Color");
        let resolve = (sample_count > 1)
            .then(|| TextureHelper::create_hdr_texture(device, width, height, 1, "HDR Resolve"));
        let depth_stencil =
            TextureHelper::create_depth_stencil_texture(device, width, height, sample_count, "Depth Stencil");

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            error!("Failed to create {width}x{height} render targets ({sample_count}x MSAA): {err}");
        }

        Self {
            sample_count,
            color,
            resolve,
            depth_stencil,
        }
    }

    fn resolved(&self) -> &wgpu::TextureView {
        self.resolve.as_ref().unwrap_or(&self.color)
    }
}

/// Owns the GPU side of the demo and turns each frame of the scene into
/// submitted work.
pub struct FrameOrchestrator {
    ctx: GpuContext,
    global: GlobalResources,
    registry: ProgramRegistry,
    shadow_maps: ShadowMapTargets,
    scene_renderer: SceneRenderer,
    tonemap: TonemapProgram,
    tonemap_bind_group: wgpu::BindGroup,
    targets: HdrTargets,
    scene: Scene,
    minimized: bool,
}

impl FrameOrchestrator {
    pub fn new(window: Arc<Window>, config: &DemoConfig) -> Result<Self, RenderError> {
        let ctx = GpuContext::new(window, config.vsync)?;
        let (width, height) = ctx.size();

        // Shader layouts are checked before any GPU object depends on them
        let reflection = ProgramReflection::reflect_all()?;
        let instance_block_size = reflection
            .block_size(Semantic::InstanceBlock)
            .map_or((size_of::<InstanceData>() * MAX_INSTANCES) as u64, u64::from);
        let global = GlobalResources::new(&ctx.device, instance_block_size);

        let sample_count = Self::supported_samples(&ctx, config.msaa);
        let registry = ProgramRegistry::new(
            &ctx.device,
            reflection,
            &global,
            PipelineConfig {
                sample_count,
                wireframe: false,
            },
        )?;

        let shadow_maps = ShadowMapTargets::new(&ctx.device, &global.shadow_layout, config.shadow_map_size);
        let scene_renderer = SceneRenderer::new(&ctx.device, &ctx.queue, &global, &config.texture_dir);

        let mut tonemap = TonemapProgram::new(
            &GpuProgramRenderContext {
                device: &ctx.device,
                queue: &ctx.queue,
                format: ctx.config.format,
            },
            &(),
        );
        tonemap.set_enabled(&ctx.queue, config.tonemapping);

        let targets = HdrTargets::new(&ctx.device, width, height, sample_count);
        let tonemap_bind_group = tonemap.bind_group(&ctx.device, targets.resolved());

        let mut scene = Scene::new(SceneSettings {
            base_ambient: config.base_ambient,
            seed: config.seed,
            spot_direct_light: config.spot_direct_light,
        });
        scene.init(config.num_cubes, config.num_point_lights, config.num_spot_lights);
        scene.set_viewport(width, height);

        info!("Renderer ready: {width}x{height}, {sample_count}x MSAA, {:?}", ctx.config.format);

        Ok(Self {
            ctx,
            global,
            registry,
            shadow_maps,
            scene_renderer,
            tonemap,
            tonemap_bind_group,
            targets,
            scene,
            minimized: false,
        })
    }

    fn supported_samples(ctx: &GpuContext, requested: u32) -> u32 {
        if requested > 1 && !ctx.supports_msaa(requested) {
            warn!("{requested}x MSAA unsupported, rendering without it");
            return 1;
        }
        requested.max(1)
    }

    pub fn supports_msaa(&self, samples: u32) -> bool {
        self.ctx.supports_msaa(samples)
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn size(&self) -> (u32, u32) {
        self.ctx.size()
    }

    /// Zero-sized windows stop rendering until the next real size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.minimized = width == 0 || height == 0;
        if self.minimized {
            return;
        }
        self.ctx.resize(width, height);
        self.scene.set_viewport(width, height);
        self.rebuild_targets(self.targets.sample_count);
    }

    fn rebuild_targets(&mut self, sample_count: u32) {
        let (width, height) = self.ctx.size();
        self.targets = HdrTargets::new(&self.ctx.device, width, height, sample_count);
        self.tonemap_bind_group = self.tonemap.bind_group(&self.ctx.device, self.targets.resolved());
    }

    pub fn set_shadow_map_size(&mut self, size: u32) {
        self.shadow_maps
            .rebuild(&self.ctx.device, &self.global.shadow_layout, size);
    }

    pub fn update(&mut self, dt: f32, animate: bool) {
        if animate {
            self.scene.update(dt);
        }
    }

    /// Brings surface, targets and pipelines in line with `render_mode` and
    /// returns the mode actually in effect.
    fn apply_render_mode(&mut self, render_mode: &RenderMode) -> RenderMode {
        self.ctx.set_vsync(render_mode.vsync);
        self.tonemap.set_enabled(&self.ctx.queue, render_mode.tonemapping);

        let sample_count = Self::supported_samples(&self.ctx, render_mode.msaa_level);
        if sample_count != self.targets.sample_count {
            info!("MSAA: {sample_count}x");
            self.rebuild_targets(sample_count);
        }

        RenderMode {
            msaa_level: sample_count,
            ..*render_mode
        }
    }

    /// Records, uploads, encodes and presents one frame. Only running out of
    /// GPU memory is an error; a lost surface skips the frame.
    pub fn render(
        &mut self,
        camera: &Camera,
        render_mode: &RenderMode,
        carmack_reverse: bool,
        technique: ShadowTechnique,
    ) -> Result<(), RenderError> {
        if self.minimized {
            return Ok(());
        }

        let render_mode = self.apply_render_mode(render_mode);

        // 1. Record the frame
        match technique {
            ShadowTechnique::Volumes => self.scene.draw(camera, &render_mode, carmack_reverse),
            ShadowTechnique::Maps => self.scene.draw_shadow_mapped(camera, &render_mode),
        }
        let commands = self.scene.commands();
        let recorded = commands.render_mode();
        self.registry.rebuild_pipelines(
            &self.ctx.device,
            PipelineConfig {
                sample_count: recorded.msaa_level,
                wireframe: recorded.wireframe,
            },
        );

        // 2. Acquire the swapchain image
        let frame = match self.ctx.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost or outdated, reconfiguring");
                self.ctx.reconfigure();
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(err) => {
                warn!("Skipping frame: {err}");
                return Ok(());
            }
        };
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());

        // 3. Upload uniforms, instances and shadow volumes
        self.global.upload(&self.ctx.device, &self.ctx.queue, commands);

        // 4. Scene passes, then tonemap into the swapchain
        let mut encoder = self
            .ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Encoder"),
            });

        self.scene_renderer.encode(
            &mut encoder,
            commands,
            &self.registry,
            &self.global,
            &SceneTargets {
                color: &self.targets.color,
                resolve: self.targets.resolve.as_ref(),
                depth_stencil: &self.targets.depth_stencil,
                shadow_maps: &self.shadow_maps,
            },
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Tonemap Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });
            self.tonemap.record(&mut render_pass, &self.tonemap_bind_group);
        } // Pass ends here (release lock)

        self.ctx.queue.submit(std::iter::once(encoder.finish()));
        frame.present();
        Ok(())
    }
}
