use bytemuck::{Pod, Zeroable};
use wgpu::{RenderPipeline, util::DeviceExt};

use crate::programs::{GpuProgram, GpuProgramRenderContext, ProgramKind};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TonemapParams {
    pub enabled: u32,
    pub _padding: [u32; 3],
}

impl TonemapParams {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: enabled as u32,
            _padding: [0; 3],
        }
    }
}

/// Fullscreen pass from the resolved HDR target to the swapchain.
pub struct TonemapProgram {
    pipeline: RenderPipeline,
    pub layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    enabled: bool,
}

impl GpuProgram for TonemapProgram {
    type InitData = ();
    type DrawData<'a> = &'a wgpu::BindGroup;

    fn new(ctx: &GpuProgramRenderContext, _: &Self::InitData) -> Self {
        let shader = ctx.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(ProgramKind::Tonemapping.label()),
            source: wgpu::ShaderSource::Wgsl(ProgramKind::Tonemapping.source().into()),
        });

        let layout = ctx.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Tonemap Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Resolved HDR color ---
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
                // --- BINDING 1: Params ---
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(size_of::<TonemapParams>() as u64),
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = ctx.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Tonemap Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = ctx.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            cache: None,
            label: Some("Tonemap Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some(ProgramKind::Tonemapping.vertex_entry()),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some(ProgramKind::Tonemapping.fragment_entry()),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: ctx.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            depth_stencil: None,
            primitive: wgpu::PrimitiveState::default(),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        let params_buffer = ctx.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Tonemap Params"),
            contents: bytemuck::bytes_of(&TonemapParams::new(true)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            pipeline,
            layout,
            params_buffer,
            enabled: true,
        }
    }

    fn record<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>, source: Self::DrawData<'a>) {
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, source, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

impl TonemapProgram {
    /// Binds a resolved HDR view; rebuilt whenever the HDR target is.
    pub fn bind_group(&self, device: &wgpu::Device, hdr_view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Tonemap Bind Group"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(hdr_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: self.params_buffer.as_entire_binding(),
                },
            ],
        })
    }

    pub fn set_enabled(&mut self, queue: &wgpu::Queue, enabled: bool) {
        if self.enabled != enabled {
            queue.write_buffer(&self.params_buffer, 0, bytemuck::bytes_of(&TonemapParams::new(enabled)));
            self.enabled = enabled;
        }
    }
}
