use std::path::Path;

use log::{debug, warn};

use crate::{
    commands::{FrameCommands, MaterialKind, MeshKind, PassRecord, PassTarget},
    global_resources::GlobalResources,
    mesh::{GpuMesh, create_cube, create_quad},
    programs::ProgramRegistry,
    shadow_maps::ShadowMapTargets,
    texture::{
        GpuTexture, SamplerKind, create_checkerboard_texture, create_samplers, create_single_color_texture,
        load_texture,
    },
};

const DIFFUSE_TEXTURE: &str = "Terracotta_Tiles_002_Base_Color.jpg";
const NORMAL_TEXTURE: &str = "Terracotta_Tiles_002_Normal.jpg";
const SPECULAR_TEXTURE: &str = "Terracotta_Tiles_002_Roughness.jpg";
const OCCLUSION_TEXTURE: &str = "Terracotta_Tiles_002_ambientOcclusion.jpg";

/// Attachments the scene passes render into.
pub struct SceneTargets<'a> {
    pub color: &'a wgpu::TextureView,
    /// Single-sample HDR view when `color` is multisampled.
    pub resolve: Option<&'a wgpu::TextureView>,
    pub depth_stencil: &'a wgpu::TextureView,
    pub shadow_maps: &'a ShadowMapTargets,
}

/// GPU geometry and materials the recorded draws refer to, plus the encoder
/// that replays a [`FrameCommands`].
pub struct SceneRenderer {
    quad: GpuMesh,
    cube: GpuMesh,
    background_material: wgpu::BindGroup,
    objects_material: wgpu::BindGroup,
}

fn load_or(device: &wgpu::Device, queue: &wgpu::Queue, path: &Path, srgb: bool, fallback: impl FnOnce() -> GpuTexture) -> GpuTexture {
    match load_texture(device, queue, path, srgb) {
        Ok(texture) => texture,
        Err(err) => {
            warn!("Failed to load {}: {err}; using a fallback texture", path.display());
            fallback()
        }
    }
}

fn material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    label: &str,
    textures: [&GpuTexture; 4],
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    let [diffuse, normal, specular, occlusion] = textures;
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&diffuse.view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&normal.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(&specular.view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(&occlusion.view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

impl SceneRenderer {
    /// Uploads meshes and loads the material textures from `texture_dir`.
    /// Missing textures fall back to generated ones.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, global: &GlobalResources, texture_dir: &Path) -> Self {
        let quad = GpuMesh::upload(device, &create_quad(), "Quad");
        let cube = GpuMesh::upload(device, &create_cube(), "Cube");

        let white = create_single_color_texture(device, queue, 255, 255, 255);
        let grey = create_single_color_texture(device, queue, 127, 127, 127);
        let flat_normal = create_single_color_texture(device, queue, 127, 127, 255);
        let checkerboard = create_checkerboard_texture(device, queue, 256, 16);

        let diffuse = load_or(device, queue, &texture_dir.join(DIFFUSE_TEXTURE), true, || {
            create_checkerboard_texture(device, queue, 256, 16)
        });
        let normal = load_or(device, queue, &texture_dir.join(NORMAL_TEXTURE), false, || {
            create_single_color_texture(device, queue, 127, 127, 255)
        });
        let specular = load_or(device, queue, &texture_dir.join(SPECULAR_TEXTURE), false, || {
            create_single_color_texture(device, queue, 127, 127, 127)
        });
        let occlusion = load_or(device, queue, &texture_dir.join(OCCLUSION_TEXTURE), false, || {
            create_single_color_texture(device, queue, 255, 255, 255)
        });

        let samplers = create_samplers(device);
        let sampler = samplers.sampler(SamplerKind::Anisotropic);

        let background_material = material_bind_group(
            device,
            &global.material_layout,
            "Background Material",
            [&checkerboard, &flat_normal, &grey, &white],
            sampler,
        );
        let objects_material = material_bind_group(
            device,
            &global.material_layout,
            "Objects Material",
            [&diffuse, &normal, &specular, &occlusion],
            sampler,
        );

        Self {
            quad,
            cube,
            background_material,
            objects_material,
        }
    }

    fn material(&self, kind: MaterialKind) -> &wgpu::BindGroup {
        match kind {
            MaterialKind::Background => &self.background_material,
            MaterialKind::Objects => &self.objects_material,
        }
    }

    /// Replays every recorded pass in order. The last scene pass resolves the
    /// multisampled color target.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        commands: &FrameCommands,
        registry: &ProgramRegistry,
        global: &GlobalResources,
        targets: &SceneTargets,
    ) {
        let last_scene_pass = commands
            .passes()
            .iter()
            .rposition(|pass| matches!(pass.target, PassTarget::Scene { .. }));

        for (index, pass) in commands.passes().iter().enumerate() {
            let resolve = if Some(index) == last_scene_pass {
                targets.resolve
            } else {
                None
            };
            let Some(mut render_pass) = Self::begin_pass(encoder, pass, targets, resolve) else {
                warn!("Skipping pass `{}`: no target", pass.label);
                continue;
            };
            self.record_draws(&mut render_pass, pass, registry, global, targets.shadow_maps);
        }
    }

    fn begin_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        pass: &PassRecord,
        targets: &SceneTargets,
        resolve: Option<&wgpu::TextureView>,
    ) -> Option<wgpu::RenderPass<'e>> {
        let render_pass = match pass.target {
            PassTarget::Scene {
                clear_color,
                clear_depth,
                clear_stencil,
            } => encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(&pass.label),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: targets.color,
                    resolve_target: resolve,
                    depth_slice: None,
                    ops: wgpu::Operations {
                        load: if clear_color {
                            wgpu::LoadOp::Clear(wgpu::Color::BLACK)
                        } else {
                            wgpu::LoadOp::Load
                        },
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: targets.depth_stencil,
                    depth_ops: Some(wgpu::Operations {
                        load: if clear_depth { wgpu::LoadOp::Clear(1.0) } else { wgpu::LoadOp::Load },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: if clear_stencil { wgpu::LoadOp::Clear(0) } else { wgpu::LoadOp::Load },
                        store: wgpu::StoreOp::Store,
                    }),
                }),
                ..Default::default()
            }),
            PassTarget::PointShadowFace(face) => {
                let view = targets.shadow_maps.face_view(face)?;
                Self::begin_shadow_pass(encoder, &pass.label, view)
            }
            PassTarget::SpotShadow => Self::begin_shadow_pass(encoder, &pass.label, &targets.shadow_maps.spot_view),
        };
        Some(render_pass)
    }

    fn begin_shadow_pass<'e>(
        encoder: &'e mut wgpu::CommandEncoder,
        label: &str,
        view: &wgpu::TextureView,
    ) -> wgpu::RenderPass<'e> {
        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0), // Clear to "Far" (1.0)
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        })
    }

    fn record_draws(
        &self,
        render_pass: &mut wgpu::RenderPass,
        pass: &PassRecord,
        registry: &ProgramRegistry,
        global: &GlobalResources,
        shadow_maps: &ShadowMapTargets,
    ) {
        if matches!(pass.target, PassTarget::Scene { .. }) {
            // Stenciled light passes compare against zero
            render_pass.set_stencil_reference(0);
        }

        for draw in &pass.draws {
            let Some(pipeline) = registry.pipeline(draw.pipeline) else {
                debug!("No pipeline for {:?}", draw.pipeline);
                continue;
            };
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(
                GlobalResources::FRAME_GROUP,
                &global.frame_bind_group,
                &GlobalResources::dynamic_offsets(draw.transform_slot, draw.draw_slot),
            );

            if draw.pipeline.program.is_lit() {
                let material = self.material(draw.material.unwrap_or(MaterialKind::Objects));
                render_pass.set_bind_group(GlobalResources::MATERIAL_GROUP, material, &[]);
                render_pass.set_bind_group(GlobalResources::SHADOW_GROUP, &shadow_maps.bind_group, &[]);
            }

            match draw.mesh {
                MeshKind::Quad | MeshKind::Cube => {
                    let mesh = if draw.mesh == MeshKind::Quad { &self.quad } else { &self.cube };
                    render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                    render_pass.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                    render_pass.draw_indexed(0..mesh.index_count, 0, 0..draw.instances);
                }
                MeshKind::ShadowVolume {
                    first_vertex,
                    vertex_count,
                } => {
                    render_pass.set_vertex_buffer(0, global.shadow_volume_buffer().slice(..));
                    render_pass.draw(first_vertex..first_vertex + vertex_count, 0..1);
                }
                MeshKind::Sprite => render_pass.draw(0..6, 0..1),
            }
        }
    }
}
