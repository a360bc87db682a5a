use glam::{Mat4, Vec3};
use log::{error, info};

use crate::texture::TextureHelper;

pub const SHADOW_NEAR: f32 = 0.1;
pub const SHADOW_FAR: f32 = 1000.1;
pub const SPOT_SHADOW_FOV: f32 = 45.0f32.to_radians();

/// Look direction and up vector of each cube face, in layer order +X, -X, +Y, -Y, +Z, -Z.
const CUBE_FACES: [(Vec3, Vec3); 6] = [
    (Vec3::X, Vec3::NEG_Y),
    (Vec3::NEG_X, Vec3::NEG_Y),
    (Vec3::Y, Vec3::Z),
    (Vec3::NEG_Y, Vec3::NEG_Z),
    (Vec3::Z, Vec3::NEG_Y),
    (Vec3::NEG_Z, Vec3::NEG_Y),
];

/// View and projection for rendering cube face `face` around `position`.
///
/// Cube lookups address texels with a top-left origin, so the projection flips
/// Y to keep the rendered face aligned with the sampling direction. The flip
/// also flips winding; light-depth passes draw without culling.
pub fn cube_face_matrices(position: Vec3, face: usize, far: f32) -> (Mat4, Mat4) {
    let (dir, up) = CUBE_FACES[face % 6];
    let view = Mat4::look_to_rh(position, dir, up);
    let projection = Mat4::from_scale(Vec3::new(1.0, -1.0, 1.0))
        * Mat4::perspective_rh(std::f32::consts::FRAC_PI_2, 1.0, SHADOW_NEAR, far);
    (view, projection)
}

/// View and projection of a spot light looking along `direction`.
pub fn spot_matrices(position: Vec3, direction: Vec3) -> (Mat4, Mat4) {
    // Y up fails when looking straight up or down
    let up = if direction.y.abs() > 0.99 { Vec3::Z } else { Vec3::Y };
    let view = Mat4::look_to_rh(position, direction, up);
    let projection = Mat4::perspective_rh(SPOT_SHADOW_FOV, 1.0, SHADOW_NEAR, SHADOW_FAR);
    (view, projection)
}

/// Depth targets the shadow-mapped path renders lights into.
pub struct ShadowMapTargets {
    size: u32,
    spot_texture: wgpu::Texture,
    pub spot_view: wgpu::TextureView,
    cube_texture: wgpu::Texture,
    pub cube_view: wgpu::TextureView,
    pub cube_face_views: Vec<wgpu::TextureView>,
    pub sampler: wgpu::Sampler,
    pub bind_group: wgpu::BindGroup,
}

impl ShadowMapTargets {
    pub fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, size: u32) -> Self {
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let spot_texture = Self::depth_texture(device, "Spot Shadow Map", size, 1);
        let spot_view = spot_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Spot Shadow Map View"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            aspect: wgpu::TextureAspect::DepthOnly,
            ..Default::default()
        });

        let cube_texture = Self::depth_texture(device, "Point Shadow Cube Map", size, 6);
        let cube_view = cube_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Point Shadow Cube View"),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            aspect: wgpu::TextureAspect::DepthOnly,
            array_layer_count: Some(6),
            ..Default::default()
        });
        let cube_face_views = (0..6)
            .map(|face| {
                cube_texture.create_view(&wgpu::TextureViewDescriptor {
                    label: Some("Point Shadow Face View"),
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    aspect: wgpu::TextureAspect::DepthOnly,
                    base_array_layer: face,
                    array_layer_count: Some(1),
                    ..Default::default()
                })
            })
            .collect();

        let border = device.features().contains(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);
        let (address_mode, border_color) = if border {
            (wgpu::AddressMode::ClampToBorder, Some(wgpu::SamplerBorderColor::OpaqueWhite))
        } else {
            (wgpu::AddressMode::ClampToEdge, None)
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Shadow Map Comparison Sampler"),
            address_mode_u: address_mode,
            address_mode_v: address_mode,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            border_color,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Shadow Map Bind Group"),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&spot_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            error!("Shadow map targets are incomplete: {err}");
        } else {
            info!("Shadow map targets ready ({size}x{size}, border clamp: {border})");
        }

        Self {
            size,
            spot_texture,
            spot_view,
            cube_texture,
            cube_view,
            cube_face_views,
            sampler,
            bind_group,
        }
    }

    fn depth_texture(device: &wgpu::Device, label: &str, size: u32, layers: u32) -> wgpu::Texture {
        device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TextureHelper::SHADOW_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        })
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Drops the current targets before allocating new ones.
    pub fn rebuild(&mut self, device: &wgpu::Device, layout: &wgpu::BindGroupLayout, size: u32) {
        if size == self.size {
            return;
        }
        self.spot_texture.destroy();
        self.cube_texture.destroy();
        *self = Self::new(device, layout, size);
    }

    pub fn face_view(&self, face: u32) -> Option<&wgpu::TextureView> {
        self.cube_face_views.get(face as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    fn project(view: Mat4, projection: Mat4, p: Vec3) -> Vec3 {
        let clip = projection * view * p.extend(1.0);
        clip.truncate() / clip.w
    }

    /// Texel coordinates a cube lookup along `dir` resolves to, per the
    /// major-axis table every API shares.
    fn cube_lookup(dir: Vec3) -> (usize, f32, f32) {
        let a = dir.abs();
        let (face, sc, tc, ma) = if a.x >= a.y && a.x >= a.z {
            if dir.x > 0.0 { (0, -dir.z, -dir.y, a.x) } else { (1, dir.z, -dir.y, a.x) }
        } else if a.y >= a.z {
            if dir.y > 0.0 { (2, dir.x, dir.z, a.y) } else { (3, dir.x, -dir.z, a.y) }
        } else if dir.z > 0.0 {
            (4, dir.x, -dir.y, a.z)
        } else {
            (5, -dir.x, -dir.y, a.z)
        };
        (face, (sc / ma + 1.0) * 0.5, (tc / ma + 1.0) * 0.5)
    }

    #[test]
    fn cube_faces_match_cube_sampling() {
        let light = Vec3::new(1.0, 2.0, 3.0);
        let directions = [
            Vec3::new(1.0, 0.3, -0.2),
            Vec3::new(-1.0, -0.4, 0.1),
            Vec3::new(0.2, 1.0, 0.35),
            Vec3::new(-0.3, -1.0, 0.25),
            Vec3::new(0.45, -0.1, 1.0),
            Vec3::new(0.15, 0.2, -1.0),
        ];
        for dir in directions {
            let (face, s, t) = cube_lookup(dir);
            let (view, projection) = cube_face_matrices(light, face, SHADOW_FAR);
            let ndc = project(view, projection, light + dir * 4.0);
            // render target texel addressing: x right, y down
            assert_relative_eq!((ndc.x + 1.0) * 0.5, s, epsilon = 1e-4);
            assert_relative_eq!((1.0 - ndc.y) * 0.5, t, epsilon = 1e-4);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn spot_axis_projects_to_center() {
        let position = Vec3::new(3.0, 5.0, -2.0);
        let direction = (-position).normalize();
        let (view, projection) = spot_matrices(position, direction);
        let ndc = project(view, projection, position + direction * 10.0);
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
    }

    #[test]
    fn spot_straight_down_has_valid_view() {
        let (view, _) = spot_matrices(Vec3::new(0.0, 5.0, 0.0), Vec3::NEG_Y);
        assert!(!view.is_nan());
        let p = view * Vec4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(p.z, -5.0, epsilon = 1e-5);
    }
}
