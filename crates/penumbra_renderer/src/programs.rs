use std::collections::HashMap;

use log::{debug, info, warn};

use crate::{
    commands::PipelineKey,
    error::RenderError,
    global_resources::{DrawUniform, GlobalResources, InstanceData, MAX_INSTANCES, TransformBlock},
    mesh::{Vertex, shadow_vertex_desc},
    render_pass::{PassKind, StencilPolicy},
    texture::TextureHelper,
};

pub mod tonemap_program;

pub use tonemap_program::{TonemapParams, TonemapProgram};

const SCENE_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/scene.wgsl"));
const DEPTH_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/depth.wgsl"));
const SHADOW_VOLUME_SOURCE: &str = concat!(
    include_str!("shaders/common.wgsl"),
    include_str!("shaders/shadow_volume.wgsl")
);
const POINT_SOURCE: &str = concat!(include_str!("shaders/common.wgsl"), include_str!("shaders/point.wgsl"));
const TONEMAP_SOURCE: &str = include_str!("shaders/tonemap.wgsl");

/// Holds common WGPU references to simplify function signatures.
pub struct GpuProgramRenderContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub format: wgpu::TextureFormat, // The output format (Swapchain or HDR)
}

pub trait GpuProgram {
    /// Data required to initialize the pipeline (e.g., global layouts)
    type InitData;

    /// Data required to draw a frame
    type DrawData<'a>
    where
        Self: 'a;

    /// Compiles shaders, creates pipeline layouts and the pipeline itself.
    fn new(ctx: &GpuProgramRenderContext, init_data: &Self::InitData) -> Self;

    /// Encodes commands into the render pass.
    fn record<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, data: Self::DrawData<'a>);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProgramKind {
    Default,
    Instancing,
    PointRendering,
    DefaultDepthPass,
    InstancingDepthPass,
    InstancedShadowVolume,
    LightSourceDepthPass,
    InstancedLightSourceDepthPass,
    Tonemapping,
}

impl ProgramKind {
    pub const ALL: [ProgramKind; 9] = [
        ProgramKind::Default,
        ProgramKind::Instancing,
        ProgramKind::PointRendering,
        ProgramKind::DefaultDepthPass,
        ProgramKind::InstancingDepthPass,
        ProgramKind::InstancedShadowVolume,
        ProgramKind::LightSourceDepthPass,
        ProgramKind::InstancedLightSourceDepthPass,
        ProgramKind::Tonemapping,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ProgramKind::Default => "Default",
            ProgramKind::Instancing => "Instancing",
            ProgramKind::PointRendering => "Point Rendering",
            ProgramKind::DefaultDepthPass => "Default Depth Pass",
            ProgramKind::InstancingDepthPass => "Instancing Depth Pass",
            ProgramKind::InstancedShadowVolume => "Instanced Shadow Volume",
            ProgramKind::LightSourceDepthPass => "Light Source Depth Pass",
            ProgramKind::InstancedLightSourceDepthPass => "Instanced Light Source Depth Pass",
            ProgramKind::Tonemapping => "Tonemapping",
        }
    }

    pub fn source(self) -> &'static str {
        match self {
            ProgramKind::Default | ProgramKind::Instancing => SCENE_SOURCE,
            ProgramKind::PointRendering => POINT_SOURCE,
            ProgramKind::DefaultDepthPass
            | ProgramKind::InstancingDepthPass
            | ProgramKind::LightSourceDepthPass
            | ProgramKind::InstancedLightSourceDepthPass => DEPTH_SOURCE,
            ProgramKind::InstancedShadowVolume => SHADOW_VOLUME_SOURCE,
            ProgramKind::Tonemapping => TONEMAP_SOURCE,
        }
    }

    pub fn vertex_entry(self) -> &'static str {
        match self {
            ProgramKind::Default => "vs_default",
            ProgramKind::Instancing => "vs_instanced",
            ProgramKind::PointRendering => "vs_sprite",
            ProgramKind::DefaultDepthPass => "vs_depth_default",
            ProgramKind::InstancingDepthPass => "vs_depth_instanced",
            ProgramKind::InstancedShadowVolume => "vs_shadow_volume",
            ProgramKind::LightSourceDepthPass => "vs_light_depth_default",
            ProgramKind::InstancedLightSourceDepthPass => "vs_light_depth_instanced",
            ProgramKind::Tonemapping => "vs_fullscreen",
        }
    }

    pub fn fragment_entry(self) -> &'static str {
        match self {
            ProgramKind::Default | ProgramKind::Instancing => "fs_lit",
            ProgramKind::PointRendering => "fs_sprite",
            ProgramKind::DefaultDepthPass | ProgramKind::InstancingDepthPass => "fs_depth_only",
            ProgramKind::InstancedShadowVolume => "fs_shadow_volume",
            ProgramKind::LightSourceDepthPass | ProgramKind::InstancedLightSourceDepthPass => "fs_light_depth",
            ProgramKind::Tonemapping => "fs_tonemap",
        }
    }

    /// Fragment stage used in `pass`. Plain depth programs rasterize shadow
    /// maps without one.
    pub fn fragment_entry_for(self, pass: PassKind) -> Option<&'static str> {
        match (self, pass) {
            (ProgramKind::DefaultDepthPass | ProgramKind::InstancingDepthPass, PassKind::LightSourceDepth) => None,
            _ => Some(self.fragment_entry()),
        }
    }

    pub fn is_lit(self) -> bool {
        matches!(self, ProgramKind::Default | ProgramKind::Instancing)
    }

    pub fn is_instanced(self) -> bool {
        matches!(
            self,
            ProgramKind::Instancing
                | ProgramKind::InstancingDepthPass
                | ProgramKind::InstancedLightSourceDepthPass
        )
    }

    pub fn vertex_layout(self) -> Option<wgpu::VertexBufferLayout<'static>> {
        match self {
            ProgramKind::PointRendering | ProgramKind::Tonemapping => None,
            ProgramKind::InstancedShadowVolume => Some(shadow_vertex_desc()),
            _ => Some(Vertex::desc()),
        }
    }

    /// The pass states a pipeline is built for.
    pub fn supported_passes(self) -> &'static [PassKind] {
        match self {
            ProgramKind::Default | ProgramKind::Instancing => &[PassKind::LightStenciled, PassKind::LightUnstenciled],
            ProgramKind::PointRendering => &[PassKind::LightSprite],
            ProgramKind::DefaultDepthPass | ProgramKind::InstancingDepthPass => {
                &[PassKind::DepthPrime, PassKind::LightSourceDepth]
            }
            ProgramKind::InstancedShadowVolume => &[
                PassKind::ShadowVolume(StencilPolicy::DepthFail),
                PassKind::ShadowVolume(StencilPolicy::DepthPass),
            ],
            ProgramKind::LightSourceDepthPass | ProgramKind::InstancedLightSourceDepthPass => {
                &[PassKind::LightSourceDepth]
            }
            // owned by the frame orchestrator
            ProgramKind::Tonemapping => &[],
        }
    }

    /// Resources a program cannot run without.
    fn required(self) -> &'static [Semantic] {
        const FRAME: &[Semantic] = &[Semantic::TransformBlock, Semantic::DrawData];
        const INSTANCED: &[Semantic] = &[Semantic::TransformBlock, Semantic::DrawData, Semantic::InstanceBlock];
        const LIT: &[Semantic] = &[
            Semantic::TransformBlock,
            Semantic::DrawData,
            Semantic::InstanceBlock,
            Semantic::DiffuseMap,
            Semantic::NormalMap,
            Semantic::SpecularMap,
            Semantic::OcclusionMap,
            Semantic::PointShadowMap,
            Semantic::SpotShadowMap,
        ];
        match self {
            ProgramKind::Default | ProgramKind::Instancing => LIT,
            ProgramKind::InstancingDepthPass | ProgramKind::InstancedLightSourceDepthPass => INSTANCED,
            ProgramKind::Tonemapping => &[Semantic::HdrSource, Semantic::TonemapParams],
            _ => FRAME,
        }
    }
}

/// A named shader resource, resolved to a binding slot per program.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Semantic {
    TransformBlock,
    DrawData,
    InstanceBlock,
    DiffuseMap,
    NormalMap,
    SpecularMap,
    OcclusionMap,
    MaterialSampler,
    PointShadowMap,
    SpotShadowMap,
    ShadowSampler,
    HdrSource,
    TonemapParams,
}

impl Semantic {
    pub fn from_wgsl_name(name: &str) -> Option<Self> {
        Some(match name {
            "transform_block" => Semantic::TransformBlock,
            "draw_data" => Semantic::DrawData,
            "instance_block" => Semantic::InstanceBlock,
            "diffuse_map" => Semantic::DiffuseMap,
            "normal_map" => Semantic::NormalMap,
            "specular_map" => Semantic::SpecularMap,
            "occlusion_map" => Semantic::OcclusionMap,
            "material_sampler" => Semantic::MaterialSampler,
            "point_shadow_map" => Semantic::PointShadowMap,
            "spot_shadow_map" => Semantic::SpotShadowMap,
            "shadow_sampler" => Semantic::ShadowSampler,
            "hdr_source" => Semantic::HdrSource,
            "tonemap_params" => Semantic::TonemapParams,
            _ => return None,
        })
    }

    /// Size of the host-side struct backing a uniform block.
    pub fn host_size(self) -> Option<u32> {
        let size = match self {
            Semantic::TransformBlock => size_of::<TransformBlock>(),
            Semantic::DrawData => size_of::<DrawUniform>(),
            Semantic::InstanceBlock => size_of::<InstanceData>() * MAX_INSTANCES,
            Semantic::TonemapParams => size_of::<TonemapParams>(),
            _ => return None,
        };
        Some(size as u32)
    }

    fn block_name(self) -> &'static str {
        match self {
            Semantic::TransformBlock => "TransformBlock",
            Semantic::DrawData => "DrawData",
            Semantic::InstanceBlock => "InstanceData[MAX_INSTANCES]",
            Semantic::TonemapParams => "TonemapParams",
            _ => "resource",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingSlot {
    pub group: u32,
    pub binding: u32,
}

/// Binding slots and uniform block sizes read out of every program's WGSL.
#[derive(Debug, Default)]
pub struct ProgramReflection {
    slots: HashMap<(ProgramKind, Semantic), BindingSlot>,
    block_sizes: HashMap<Semantic, u32>,
}

impl ProgramReflection {
    /// Parses all programs and checks their uniform blocks against the host
    /// structs.
    pub fn reflect_all() -> Result<Self, RenderError> {
        let mut reflection = Self::default();
        for kind in ProgramKind::ALL {
            reflection.reflect(kind)?;
        }
        Ok(reflection)
    }

    fn reflect(&mut self, program: ProgramKind) -> Result<(), RenderError> {
        let source = program.source();
        let module = naga::front::wgsl::parse_str(source).map_err(|err| RenderError::ShaderParse {
            program,
            message: err.emit_to_string(source),
        })?;

        let mut layouter = naga::proc::Layouter::default();
        layouter.update(module.to_ctx()).map_err(|err| RenderError::ShaderParse {
            program,
            message: err.to_string(),
        })?;

        for entry in [program.vertex_entry(), program.fragment_entry()] {
            if !module.entry_points.iter().any(|ep| ep.name == entry) {
                return Err(RenderError::ShaderParse {
                    program,
                    message: format!("missing entry point `{entry}`"),
                });
            }
        }

        for (_, var) in module.global_variables.iter() {
            let (Some(name), Some(binding)) = (var.name.as_deref(), var.binding.as_ref()) else {
                continue;
            };
            let Some(semantic) = Semantic::from_wgsl_name(name) else {
                debug!("{}: ignoring unknown binding `{name}`", program.label());
                continue;
            };

            if let Some(host) = semantic.host_size() {
                let shader = layouter[var.ty].size;
                if shader != host {
                    return Err(RenderError::LayoutMismatch {
                        program,
                        block: semantic.block_name(),
                        shader,
                        host,
                    });
                }
                self.block_sizes.insert(semantic, shader);
            }

            self.slots.insert(
                (program, semantic),
                BindingSlot {
                    group: binding.group,
                    binding: binding.binding,
                },
            );
        }

        if let Some(missing) = program.required().iter().find(|s| !self.slots.contains_key(&(program, **s))) {
            return Err(RenderError::ShaderParse {
                program,
                message: format!("no binding for {missing:?}"),
            });
        }

        Ok(())
    }

    pub fn slot(&self, program: ProgramKind, semantic: Semantic) -> Option<BindingSlot> {
        self.slots.get(&(program, semantic)).copied()
    }

    pub fn block_size(&self, semantic: Semantic) -> Option<u32> {
        self.block_sizes.get(&semantic).copied()
    }
}

/// Pipeline-affecting render settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub sample_count: u32,
    pub wireframe: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_count: 1,
            wireframe: false,
        }
    }
}

/// Compiled scene programs and one pipeline per `(program, pass)` pair.
pub struct ProgramRegistry {
    reflection: ProgramReflection,
    modules: HashMap<ProgramKind, wgpu::ShaderModule>,
    frame_pipeline_layout: wgpu::PipelineLayout,
    lit_pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
    config: PipelineConfig,
    features: wgpu::Features,
}

impl ProgramRegistry {
    pub fn new(
        device: &wgpu::Device,
        reflection: ProgramReflection,
        global: &GlobalResources,
        config: PipelineConfig,
    ) -> Result<Self, RenderError> {
        let features = device.features();
        if !features.contains(wgpu::Features::DEPTH_CLIP_CONTROL) {
            warn!("DEPTH_CLIP_CONTROL unsupported: shadow volumes may be clipped by the far plane");
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let modules = ProgramKind::ALL
            .into_iter()
            .filter(|kind| !kind.supported_passes().is_empty())
            .map(|kind| {
                let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(kind.label()),
                    source: wgpu::ShaderSource::Wgsl(kind.source().into()),
                });
                (kind, module)
            })
            .collect();

        let frame_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Frame Pipeline Layout"),
            bind_group_layouts: &[&global.frame_layout],
            push_constant_ranges: &[],
        });
        let lit_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lit Pipeline Layout"),
            // [0: frame, 1: material, 2: shadow maps]
            bind_group_layouts: &[&global.frame_layout, &global.material_layout, &global.shadow_layout],
            push_constant_ranges: &[],
        });

        let mut registry = Self {
            reflection,
            modules,
            frame_pipeline_layout,
            lit_pipeline_layout,
            pipelines: HashMap::new(),
            config,
            features,
        };
        registry.build_pipelines(device);

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Pipeline(err.to_string()));
        }

        info!("Built {} pipelines for {} programs", registry.pipelines.len(), registry.modules.len());
        Ok(registry)
    }

    pub fn reflection(&self) -> &ProgramReflection {
        &self.reflection
    }

    pub fn slot(&self, program: ProgramKind, semantic: Semantic) -> Option<BindingSlot> {
        self.reflection.slot(program, semantic)
    }

    pub fn pipeline(&self, key: PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.pipelines.get(&key)
    }

    pub fn config(&self) -> PipelineConfig {
        self.config
    }

    /// Rebuilds every pipeline when `config` differs from the current one.
    /// Failures are logged and the previous pipelines kept.
    pub fn rebuild_pipelines(&mut self, device: &wgpu::Device, config: PipelineConfig) {
        if config == self.config {
            return;
        }

        let previous = std::mem::take(&mut self.pipelines);
        let previous_config = self.config;
        self.config = config;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.build_pipelines(device);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Pipeline rebuild for {config:?} failed: {err}");
            self.pipelines = previous;
            self.config = previous_config;
            return;
        }
        debug!("Rebuilt pipelines for {config:?}");
    }

    fn build_pipelines(&mut self, device: &wgpu::Device) {
        for (&program, module) in &self.modules {
            for &pass in program.supported_passes() {
                let layout = if program.is_lit() {
                    &self.lit_pipeline_layout
                } else {
                    &self.frame_pipeline_layout
                };
                let pipeline = Self::create_pipeline(device, layout, module, program, pass, self.config, self.features);
                self.pipelines.insert(PipelineKey { program, pass }, pipeline);
            }
        }
    }

    fn create_pipeline(
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        module: &wgpu::ShaderModule,
        program: ProgramKind,
        pass: PassKind,
        config: PipelineConfig,
        features: wgpu::Features,
    ) -> wgpu::RenderPipeline {
        let state = pass.render_state();
        let to_shadow_map = pass.targets_shadow_map();

        let (depth_format, sample_count) = if to_shadow_map {
            (TextureHelper::SHADOW_FORMAT, 1)
        } else {
            (TextureHelper::DEPTH_STENCIL_FORMAT, config.sample_count)
        };

        let polygon_mode = if config.wireframe
            && !to_shadow_map
            && !matches!(pass, PassKind::ShadowVolume(_))
            && features.contains(wgpu::Features::POLYGON_MODE_LINE)
        {
            wgpu::PolygonMode::Line
        } else {
            wgpu::PolygonMode::Fill
        };
        let unclipped_depth =
            matches!(pass, PassKind::ShadowVolume(_)) && features.contains(wgpu::Features::DEPTH_CLIP_CONTROL);

        let buffers: Vec<wgpu::VertexBufferLayout> = program.vertex_layout().into_iter().collect();
        let targets = if to_shadow_map {
            vec![]
        } else {
            vec![Some(state.color_target(TextureHelper::HDR_FORMAT))]
        };

        let label = format!("{} / {:?}", program.label(), pass);
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some(&label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some(program.vertex_entry()),
                compilation_options: Default::default(),
                buffers: &buffers,
            },
            fragment: program.fragment_entry_for(pass).map(|entry| wgpu::FragmentState {
                module,
                entry_point: Some(entry),
                compilation_options: Default::default(),
                targets: &targets,
            }),
            depth_stencil: Some(state.depth_stencil_state(depth_format)),
            primitive: state.primitive_state(polygon_mode, unclipped_depth),
            multisample: wgpu::MultisampleState {
                count: sample_count,
                ..Default::default()
            },
            multiview: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_program_parses_and_matches_host_layouts() {
        let reflection = ProgramReflection::reflect_all().unwrap();
        assert_eq!(reflection.block_size(Semantic::TransformBlock), Some(112));
        assert_eq!(reflection.block_size(Semantic::DrawData), Some(208));
        assert_eq!(
            reflection.block_size(Semantic::InstanceBlock),
            Some(48 * MAX_INSTANCES as u32)
        );
        assert_eq!(reflection.block_size(Semantic::TonemapParams), Some(16));
    }

    #[test]
    fn scene_programs_share_frame_bindings() {
        let reflection = ProgramReflection::reflect_all().unwrap();
        let frame = [
            (Semantic::TransformBlock, 0),
            (Semantic::DrawData, 1),
            (Semantic::InstanceBlock, 2),
        ];
        for program in ProgramKind::ALL.into_iter().filter(|p| *p != ProgramKind::Tonemapping) {
            for (semantic, binding) in frame {
                assert_eq!(
                    reflection.slot(program, semantic),
                    Some(BindingSlot {
                        group: GlobalResources::FRAME_GROUP,
                        binding
                    }),
                    "{program:?} {semantic:?}"
                );
            }
        }
    }

    #[test]
    fn lit_programs_bind_materials_and_shadow_maps() {
        let reflection = ProgramReflection::reflect_all().unwrap();
        for program in [ProgramKind::Default, ProgramKind::Instancing] {
            assert_eq!(
                reflection.slot(program, Semantic::OcclusionMap),
                Some(BindingSlot { group: 1, binding: 3 })
            );
            assert_eq!(
                reflection.slot(program, Semantic::ShadowSampler),
                Some(BindingSlot { group: 2, binding: 2 })
            );
        }
        assert_eq!(reflection.slot(ProgramKind::DefaultDepthPass, Semantic::DiffuseMap), None);
        assert_eq!(
            reflection.slot(ProgramKind::Tonemapping, Semantic::HdrSource),
            Some(BindingSlot { group: 0, binding: 0 })
        );
    }

    #[test]
    fn plain_depth_programs_drop_the_fragment_stage_for_shadow_maps() {
        assert_eq!(ProgramKind::DefaultDepthPass.fragment_entry_for(PassKind::LightSourceDepth), None);
        assert_eq!(
            ProgramKind::DefaultDepthPass.fragment_entry_for(PassKind::DepthPrime),
            Some("fs_depth_only")
        );
        assert_eq!(
            ProgramKind::LightSourceDepthPass.fragment_entry_for(PassKind::LightSourceDepth),
            Some("fs_light_depth")
        );
    }

    #[test]
    fn only_scene_programs_own_pipelines() {
        let count: usize = ProgramKind::ALL.iter().map(|p| p.supported_passes().len()).sum();
        assert_eq!(count, 13);
        assert!(ProgramKind::Tonemapping.supported_passes().is_empty());
    }
}
