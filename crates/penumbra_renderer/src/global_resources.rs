use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use wgpu::util::DeviceExt;

use crate::{commands::FrameCommands, light::LightParams, render_pass::RenderPass};

/// Capacity of the instance buffer; must match `array<InstanceData, N>` in WGSL.
pub const MAX_INSTANCES: usize = 1024;

/// Dynamic uniform offsets must be multiples of this.
pub const UNIFORM_STRIDE: u64 = 256;

pub const POINT_SPRITE_SIZE: f32 = 10.0;

/// Rows 0..3 of `m`, i.e. the columns of its transpose. Row 3 of an affine
/// transform is always (0, 0, 0, 1) and is dropped.
pub fn transposed_3x4(m: &Mat4) -> [[f32; 4]; 3] {
    [m.row(0).to_array(), m.row(1).to_array(), m.row(2).to_array()]
}

pub fn from_transposed_3x4(rows: &[[f32; 4]; 3]) -> Mat4 {
    Mat4::from_cols_array_2d(&[rows[0], rows[1], rows[2], [0.0, 0.0, 0.0, 1.0]]).transpose()
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct TransformBlock {
    pub world_to_view: [[f32; 4]; 3], // transposed 3x4
    pub projection: [[f32; 4]; 4],
}

impl TransformBlock {
    pub fn new(world_to_view: Mat4, projection: Mat4) -> Self {
        Self {
            world_to_view: transposed_3x4(&world_to_view),
            projection: projection.to_cols_array_2d(),
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub transformation: [[f32; 4]; 3], // transposed model-to-world
}

impl InstanceData {
    pub fn from_model(model: &Mat4) -> Self {
        Self {
            transformation: transposed_3x4(model),
        }
    }

    pub fn model(&self) -> Mat4 {
        from_transposed_3x4(&self.transformation)
    }
}

/// Per-draw uniform, addressed through a dynamic offset.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct DrawUniform {
    pub model_to_world: [[f32; 4]; 3],
    pub light_position: [f32; 4], // .w = 1 when direct light contributes
    pub light_color: [f32; 4],    // .w = ambient weight, 0 outside ambient passes
    pub view_position: [f32; 4],
    pub spot_direction: [f32; 4], // .w = cos(inner)
    pub spot_params: [f32; 4],    // cos(outer), shadow lookup, shadow far, is spot
    pub light_view_proj: [[f32; 4]; 4],
    pub viewport: [f32; 4], // width, height, point sprite size
}

const _: () = {
    assert!(size_of::<TransformBlock>() == 112);
    assert!(std::mem::offset_of!(TransformBlock, projection) == 48);
    assert!(size_of::<InstanceData>() == 48);
    assert!(size_of::<DrawUniform>() == 208);
    assert!(std::mem::offset_of!(DrawUniform, light_view_proj) == 128);
    assert!(size_of::<DrawUniform>() as u64 <= UNIFORM_STRIDE);
    assert!(size_of::<TransformBlock>() as u64 <= UNIFORM_STRIDE);
};

impl DrawUniform {
    /// Fills the light-dependent fields the way `pass` consumes them.
    pub fn new(
        model: &Mat4,
        pass: RenderPass,
        light: Option<&LightParams>,
        view_position: Vec3,
        viewport: [f32; 2],
    ) -> Self {
        let mut uniform = Self {
            model_to_world: transposed_3x4(model),
            viewport: [viewport[0], viewport[1], POINT_SPRITE_SIZE, 0.0],
            ..Zeroable::zeroed()
        };

        let Some(light) = light else {
            return uniform;
        };

        if pass.has_shadow() || pass.has_light() {
            let direct = if pass.has_direct() { 1.0 } else { 0.0 };
            uniform.light_position = light.position.extend(direct).to_array();
            uniform.spot_params[2] = light.shadow_far;
            uniform.light_view_proj = light.light_view_proj.to_cols_array_2d();
        }

        if pass.has_light() {
            let ambient = if pass.has_ambient() { light.color.w } else { 0.0 };
            uniform.view_position = view_position.extend(1.0).to_array();
            uniform.light_color = light.color.truncate().extend(ambient).to_array();
            if let Some(cone) = light.cone {
                uniform.spot_direction = cone.direction.extend(cone.cos_inner).to_array();
                uniform.spot_params[0] = cone.cos_outer;
                uniform.spot_params[3] = 1.0;
            }
            if pass.has_shadow_map() {
                uniform.spot_params[1] = light.shadow.shader_code();
            }
        }

        uniform
    }

    /// Billboard for a light source, tinted by a fraction of its color.
    pub fn sprite(light: &LightParams, viewport: [f32; 2]) -> Self {
        let tint: Vec4 = (light.color.truncate() * 0.05).extend(1.0);
        Self {
            model_to_world: transposed_3x4(&Mat4::IDENTITY),
            light_position: light.position.extend(1.0).to_array(),
            light_color: tint.to_array(),
            viewport: [viewport[0], viewport[1], POINT_SPRITE_SIZE, 0.0],
            ..Zeroable::zeroed()
        }
    }
}

/// Fixed-capacity instance array, uploaded wholesale each frame.
pub struct InstanceArray {
    data: Box<[InstanceData]>,
}

impl Default for InstanceArray {
    fn default() -> Self {
        Self {
            data: vec![InstanceData::zeroed(); MAX_INSTANCES].into_boxed_slice(),
        }
    }
}

impl InstanceArray {
    /// Writes transforms from the front; anything past `MAX_INSTANCES` is ignored.
    /// Returns the number written.
    pub fn write(&mut self, models: impl IntoIterator<Item = Mat4>) -> usize {
        let mut count = 0;
        for (slot, model) in self.data.iter_mut().zip(models) {
            *slot = InstanceData::from_model(&model);
            count += 1;
        }
        count
    }

    pub fn get(&self, index: usize) -> Option<&InstanceData> {
        self.data.get(index)
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.data)
    }
}

/// Lays `items` out one per `stride` bytes.
pub fn pack_strided<T: Pod>(items: &[T], stride: u64) -> Vec<u8> {
    let stride = stride as usize;
    let mut bytes = vec![0u8; items.len() * stride];
    for (chunk, item) in bytes.chunks_exact_mut(stride).zip(items) {
        let raw = bytemuck::bytes_of(item);
        chunk[..raw.len()].copy_from_slice(raw);
    }
    bytes
}

/// Dynamic-offset uniform buffer that grows to fit the frame.
struct UniformArena {
    label: &'static str,
    buffer: wgpu::Buffer,
    slots: usize,
}

impl UniformArena {
    fn new(device: &wgpu::Device, label: &'static str, slots: usize) -> Self {
        Self {
            label,
            buffer: Self::allocate(device, label, slots),
            slots,
        }
    }

    fn allocate(device: &wgpu::Device, label: &'static str, slots: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: slots as u64 * UNIFORM_STRIDE,
            // COPY_DST is critical for updates!
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Returns true when the buffer had to be replaced.
    fn reserve(&mut self, device: &wgpu::Device, slots: usize) -> bool {
        if slots <= self.slots {
            return false;
        }
        let slots = slots.next_power_of_two();
        log::debug!("Growing {} to {slots} slots", self.label);
        self.buffer = Self::allocate(device, self.label, slots);
        self.slots = slots;
        true
    }

    fn binding(&self, size: u64) -> wgpu::BindingResource<'_> {
        wgpu::BindingResource::Buffer(wgpu::BufferBinding {
            buffer: &self.buffer,
            offset: 0,
            size: NonZeroU64::new(size),
        })
    }
}

fn uniform_entry(binding: u32, dynamic: bool, size: u64) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: dynamic,
            min_binding_size: NonZeroU64::new(size),
        },
        count: None,
    }
}

fn texture_entry(binding: u32, sample_type: wgpu::TextureSampleType, dim: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension: dim,
            sample_type,
        },
        count: None,
    }
}

/// Bind group layouts shared by every scene program plus the per-frame buffers
/// behind group 0.
pub struct GlobalResources {
    pub frame_layout: wgpu::BindGroupLayout,
    pub material_layout: wgpu::BindGroupLayout,
    pub shadow_layout: wgpu::BindGroupLayout,
    pub frame_bind_group: wgpu::BindGroup,
    transforms: UniformArena,
    draws: UniformArena,
    instance_buffer: wgpu::Buffer,
    shadow_volume_buffer: wgpu::Buffer,
    shadow_volume_capacity: u64,
}

impl GlobalResources {
    pub const FRAME_GROUP: u32 = 0;
    pub const MATERIAL_GROUP: u32 = 1;
    pub const SHADOW_GROUP: u32 = 2;

    /// `instance_block_size` comes from the instancing program's reflected layout.
    pub fn new(device: &wgpu::Device, instance_block_size: u64) -> Self {
        let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Frame Bind Group Layout"),
            entries: &[
                // --- BINDING 0: Transform block ---
                uniform_entry(0, true, size_of::<TransformBlock>() as u64),
                // --- BINDING 1: Per-draw data ---
                uniform_entry(1, true, size_of::<DrawUniform>() as u64),
                // --- BINDING 2: Instance transforms ---
                uniform_entry(2, false, instance_block_size),
            ],
        });

        let float = wgpu::TextureSampleType::Float { filterable: true };
        let d2 = wgpu::TextureViewDimension::D2;
        let material_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Material Bind Group Layout"),
            entries: &[
                texture_entry(0, float, d2), // diffuse
                texture_entry(1, float, d2), // normal
                texture_entry(2, float, d2), // specular
                texture_entry(3, float, d2), // occlusion
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let shadow_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Shadow Map Bind Group Layout"),
            entries: &[
                texture_entry(0, wgpu::TextureSampleType::Depth, wgpu::TextureViewDimension::Cube),
                texture_entry(1, wgpu::TextureSampleType::Depth, d2),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let transforms = UniformArena::new(device, "Transform Arena", 16);
        let draws = UniformArena::new(device, "Draw Uniform Arena", 64);

        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Instance Buffer"),
            contents: InstanceArray::default().as_bytes(),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let shadow_volume_capacity = 4096 * size_of::<[f32; 4]>() as u64;
        let shadow_volume_buffer = Self::allocate_shadow_volume_buffer(device, shadow_volume_capacity);

        let frame_bind_group =
            Self::create_frame_bind_group(device, &frame_layout, &transforms, &draws, &instance_buffer);

        Self {
            frame_layout,
            material_layout,
            shadow_layout,
            frame_bind_group,
            transforms,
            draws,
            instance_buffer,
            shadow_volume_buffer,
            shadow_volume_capacity,
        }
    }

    fn create_frame_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        transforms: &UniformArena,
        draws: &UniformArena,
        instances: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: transforms.binding(size_of::<TransformBlock>() as u64),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: draws.binding(size_of::<DrawUniform>() as u64),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: instances.as_entire_binding(),
                },
            ],
        })
    }

    fn allocate_shadow_volume_buffer(device: &wgpu::Device, size: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Shadow Volume Vertices"),
            size,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Copies everything the recorded frame references into GPU buffers.
    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, commands: &FrameCommands) {
        // 1. Grow arenas; a new buffer means a new bind group
        let grew_transforms = self.transforms.reserve(device, commands.transforms().len());
        let grew_draws = self.draws.reserve(device, commands.draw_uniforms().len());
        if grew_transforms || grew_draws {
            self.frame_bind_group = Self::create_frame_bind_group(
                device,
                &self.frame_layout,
                &self.transforms,
                &self.draws,
                &self.instance_buffer,
            );
        }

        // 2. Uniform arenas, one slot per stride
        if !commands.transforms().is_empty() {
            queue.write_buffer(
                &self.transforms.buffer,
                0,
                &pack_strided(commands.transforms(), UNIFORM_STRIDE),
            );
        }
        if !commands.draw_uniforms().is_empty() {
            queue.write_buffer(
                &self.draws.buffer,
                0,
                &pack_strided(commands.draw_uniforms(), UNIFORM_STRIDE),
            );
        }

        // 3. Instances, the whole array in one copy
        queue.write_buffer(&self.instance_buffer, 0, commands.instances().as_bytes());

        // 4. CPU-extruded shadow volumes
        let volume_bytes: &[u8] = bytemuck::cast_slice(commands.shadow_volume_vertices());
        if volume_bytes.len() as u64 > self.shadow_volume_capacity {
            self.shadow_volume_capacity = (volume_bytes.len() as u64).next_power_of_two();
            self.shadow_volume_buffer = Self::allocate_shadow_volume_buffer(device, self.shadow_volume_capacity);
        }
        if !volume_bytes.is_empty() {
            queue.write_buffer(&self.shadow_volume_buffer, 0, volume_bytes);
        }
    }

    pub fn shadow_volume_buffer(&self) -> &wgpu::Buffer {
        &self.shadow_volume_buffer
    }

    pub fn dynamic_offsets(transform_slot: u32, draw_slot: u32) -> [u32; 2] {
        let stride = UNIFORM_STRIDE as u32;
        [transform_slot * stride, draw_slot * stride]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::light::{PointLight, SpotLight};
    use approx::assert_relative_eq;
    use glam::{Quat, Vec4};

    fn sample_light() -> LightParams {
        LightParams::point(&PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec4::new(10.0, 9.0, 8.0, 0.25),
            movement: Vec4::ZERO,
        })
    }

    #[test]
    fn transposed_rows_round_trip() {
        let model = Mat4::from_scale_rotation_translation(
            Vec3::new(2.0, 1.0, 0.5),
            Quat::from_axis_angle(Vec3::ONE.normalize(), 0.7),
            Vec3::new(-3.0, 4.0, 5.0),
        );
        let rows = transposed_3x4(&model);
        // translation sits in the last column of each row
        assert_relative_eq!(rows[0][3], -3.0);
        assert_relative_eq!(rows[1][3], 4.0);
        assert_relative_eq!(rows[2][3], 5.0);
        assert!(from_transposed_3x4(&rows).abs_diff_eq(model, 1e-6));
    }

    #[test]
    fn max_instances_survive_the_upload_bytes() {
        let models: Vec<Mat4> = (0..MAX_INSTANCES)
            .map(|i| {
                let angle = (20.0 * i as f32).to_radians();
                Mat4::from_translation(Vec3::new(i as f32, 0.5, -(i as f32)))
                    * Mat4::from_axis_angle(Vec3::ONE.normalize(), angle)
            })
            .collect();

        let mut array = InstanceArray::default();
        assert_eq!(array.write(models.iter().copied().chain([Mat4::IDENTITY])), MAX_INSTANCES);

        let bytes = array.as_bytes();
        assert_eq!(bytes.len(), MAX_INSTANCES * 48);
        let read_back: &[InstanceData] = bytemuck::cast_slice(bytes);
        for (model, data) in models.iter().zip(read_back) {
            assert!(data.model().abs_diff_eq(*model, 1e-4));
            assert_eq!(data.transformation[0], model.row(0).to_array());
        }
    }

    #[test]
    fn strided_packing_aligns_slots() {
        let blocks = [
            TransformBlock::new(Mat4::IDENTITY, Mat4::IDENTITY),
            TransformBlock::new(Mat4::from_translation(Vec3::X), Mat4::IDENTITY),
        ];
        let bytes = pack_strided(&blocks, UNIFORM_STRIDE);
        assert_eq!(bytes.len(), 512);
        let second: TransformBlock = bytemuck::pod_read_unaligned(&bytes[256..256 + 112]);
        assert_eq!(second.world_to_view[0][3], 1.0);
        assert_eq!(GlobalResources::dynamic_offsets(2, 3), [512, 768]);
    }

    #[test]
    fn depth_pass_carries_no_light() {
        let light = sample_light();
        let uniform = DrawUniform::new(&Mat4::IDENTITY, RenderPass::DEPTH_PASS, Some(&light), Vec3::ONE, [800.0, 600.0]);
        assert_eq!(uniform.light_position, [0.0; 4]);
        assert_eq!(uniform.light_color, [0.0; 4]);
    }

    #[test]
    fn direct_pass_zeroes_ambient_weight() {
        let light = sample_light();
        let uniform = DrawUniform::new(&Mat4::IDENTITY, RenderPass::DIRECT_LIGHT, Some(&light), Vec3::ONE, [800.0, 600.0]);
        assert_eq!(uniform.light_position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(uniform.light_color, [10.0, 9.0, 8.0, 0.0]);
        assert_eq!(uniform.view_position, [1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn ambient_pass_disables_direct_term() {
        let light = sample_light();
        let uniform = DrawUniform::new(&Mat4::IDENTITY, RenderPass::AMBIENT_LIGHT, Some(&light), Vec3::ONE, [800.0, 600.0]);
        assert_eq!(uniform.light_position[3], 0.0);
        assert_eq!(uniform.light_color[3], 0.25);
    }

    #[test]
    fn shadow_volume_pass_only_needs_position() {
        let light = sample_light();
        let uniform = DrawUniform::new(&Mat4::IDENTITY, RenderPass::SHADOW_VOLUME, Some(&light), Vec3::ONE, [800.0, 600.0]);
        assert_eq!(&uniform.light_position[..3], &[1.0, 2.0, 3.0]);
        assert_eq!(uniform.view_position, [0.0; 4]);
    }

    #[test]
    fn spot_cone_only_reaches_light_passes() {
        let spot = LightParams::spot(&SpotLight::new(Vec3::new(0.0, 5.0, 0.0), Vec4::ONE, Vec4::ZERO));
        let lit = DrawUniform::new(&Mat4::IDENTITY, RenderPass::DIRECT_LIGHT, Some(&spot), Vec3::ZERO, [1.0, 1.0]);
        assert_eq!(lit.spot_params[3], 1.0);
        assert_relative_eq!(lit.spot_direction[1], -1.0);

        let depth = DrawUniform::new(&Mat4::IDENTITY, RenderPass::SHADOW_MAP, Some(&spot), Vec3::ZERO, [1.0, 1.0]);
        assert_eq!(depth.spot_params[3], 0.0);
    }
}
