use std::path::Path;

use image::{RgbaImage, imageops::FilterType};
use wgpu::{Device, Extent3d, Queue, TextureDescriptor, TextureDimension, TextureFormat, TextureUsages};

pub struct TextureHelper;

impl TextureHelper {
    pub const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;
    pub const DEPTH_STENCIL_FORMAT: TextureFormat = TextureFormat::Depth24PlusStencil8;
    pub const SHADOW_FORMAT: TextureFormat = TextureFormat::Depth32Float;

    fn render_target(
        device: &Device,
        width: u32,
        height: u32,
        sample_count: u32,
        format: TextureFormat,
        usage: TextureUsages,
        label: &str,
    ) -> wgpu::TextureView {
        let desc = TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count,
            dimension: TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        };

        let texture = device.create_texture(&desc);
        texture.create_view(&wgpu::TextureViewDescriptor::default())
    }

    pub fn create_depth_stencil_texture(
        device: &Device,
        width: u32,
        height: u32,
        sample_count: u32,
        label: &str,
    ) -> wgpu::TextureView {
        Self::render_target(
            device,
            width,
            height,
            sample_count,
            Self::DEPTH_STENCIL_FORMAT,
            TextureUsages::RENDER_ATTACHMENT,
            label,
        )
    }

    /// Multisampled targets are only rendered to; the single-sample one is also read by tonemapping.
    pub fn create_hdr_texture(device: &Device, width: u32, height: u32, sample_count: u32, label: &str) -> wgpu::TextureView {
        let usage = if sample_count > 1 {
            TextureUsages::RENDER_ATTACHMENT
        } else {
            TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING
        };
        Self::render_target(device, width, height, sample_count, Self::HDR_FORMAT, usage, label)
    }
}

pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl GpuTexture {
    /// Uploads `image` with a full CPU-generated mip chain.
    pub fn from_image(device: &Device, queue: &Queue, image: &RgbaImage, srgb: bool, label: &str) -> Self {
        let mips = generate_mips(image);
        let format = if srgb {
            TextureFormat::Rgba8UnormSrgb
        } else {
            TextureFormat::Rgba8Unorm
        };

        let texture = device.create_texture(&TextureDescriptor {
            label: Some(label),
            size: Extent3d {
                width: image.width(),
                height: image.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: mips.len() as u32,
            sample_count: 1,
            dimension: TextureDimension::D2,
            format,
            usage: TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (level, mip) in mips.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &texture,
                    mip_level: level as u32,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                mip.as_raw(),
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * mip.width()),
                    rows_per_image: Some(mip.height()),
                },
                Extent3d {
                    width: mip.width(),
                    height: mip.height(),
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

/// Halves the image until 1x1. Level 0 is a copy of `image`.
pub fn generate_mips(image: &RgbaImage) -> Vec<RgbaImage> {
    let mut mips = vec![image.clone()];
    while let Some(last) = mips.last() {
        if last.width() == 1 && last.height() == 1 {
            break;
        }
        let (w, h) = ((last.width() / 2).max(1), (last.height() / 2).max(1));
        let next = image::imageops::resize(last, w, h, FilterType::Triangle);
        mips.push(next);
    }
    mips
}

pub fn load_texture(device: &Device, queue: &Queue, path: impl AsRef<Path>, srgb: bool) -> Result<GpuTexture, image::ImageError> {
    let path = path.as_ref();
    let image = image::open(path)?.to_rgba8();
    log::info!("Loaded {} ({}x{})", path.display(), image.width(), image.height());
    Ok(GpuTexture::from_image(device, queue, &image, srgb, &path.display().to_string()))
}

pub fn create_single_color_texture(device: &Device, queue: &Queue, r: u8, g: u8, b: u8) -> GpuTexture {
    let image = RgbaImage::from_pixel(1, 1, image::Rgba([r, g, b, 255]));
    GpuTexture::from_image(device, queue, &image, false, &format!("Color ({r}, {g}, {b})"))
}

pub fn checkerboard_image(size: u32, tile: u32) -> RgbaImage {
    let tile = tile.max(1);
    RgbaImage::from_fn(size, size, |x, y| {
        let value = if (x / tile + y / tile) % 2 == 0 { 255 } else { 64 };
        image::Rgba([value, value, value, 255])
    })
}

pub fn create_checkerboard_texture(device: &Device, queue: &Queue, size: u32, tile: u32) -> GpuTexture {
    GpuTexture::from_image(device, queue, &checkerboard_image(size, tile), true, "Checkerboard")
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SamplerKind {
    Nearest,
    Bilinear,
    Trilinear,
    Anisotropic,
}

impl SamplerKind {
    pub const ALL: [SamplerKind; 4] = [
        SamplerKind::Nearest,
        SamplerKind::Bilinear,
        SamplerKind::Trilinear,
        SamplerKind::Anisotropic,
    ];

    fn descriptor(self) -> wgpu::SamplerDescriptor<'static> {
        let (filter, mipmap, anisotropy_clamp) = match self {
            SamplerKind::Nearest => (wgpu::FilterMode::Nearest, wgpu::FilterMode::Nearest, 1),
            SamplerKind::Bilinear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Nearest, 1),
            SamplerKind::Trilinear => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear, 1),
            SamplerKind::Anisotropic => (wgpu::FilterMode::Linear, wgpu::FilterMode::Linear, 16),
        };
        wgpu::SamplerDescriptor {
            label: Some("Material Sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: mipmap,
            anisotropy_clamp,
            ..Default::default()
        }
    }
}

pub struct Samplers {
    samplers: Vec<wgpu::Sampler>,
}

impl Samplers {
    pub fn sampler(&self, kind: SamplerKind) -> &wgpu::Sampler {
        // ALL and the stored order line up
        &self.samplers[kind as usize]
    }
}

pub fn create_samplers(device: &Device) -> Samplers {
    Samplers {
        samplers: SamplerKind::ALL
            .iter()
            .map(|kind| device.create_sampler(&kind.descriptor()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_chain_reaches_one_texel() {
        let image = RgbaImage::from_pixel(256, 64, image::Rgba([10, 20, 30, 255]));
        let mips = generate_mips(&image);
        assert_eq!(mips.len(), 9);
        assert_eq!(mips[1].dimensions(), (128, 32));
        assert_eq!(mips[6].dimensions(), (4, 1));
        assert_eq!(mips.last().map(|m| m.dimensions()), Some((1, 1)));
        // a flat color stays flat
        assert_eq!(mips.last().map(|m| m.get_pixel(0, 0).0), Some([10, 20, 30, 255]));
    }

    #[test]
    fn single_texel_has_one_level() {
        let image = RgbaImage::from_pixel(1, 1, image::Rgba([255; 4]));
        assert_eq!(generate_mips(&image).len(), 1);
    }

    #[test]
    fn checkerboard_alternates_per_tile() {
        let board = checkerboard_image(256, 16);
        assert_eq!(board.dimensions(), (256, 256));
        assert_eq!(board.get_pixel(0, 0).0[0], 255);
        assert_eq!(board.get_pixel(15, 15).0[0], 255);
        assert_eq!(board.get_pixel(16, 0).0[0], 64);
        assert_eq!(board.get_pixel(16, 16).0[0], 255);
    }

    #[test]
    fn sampler_kinds_index_in_order() {
        for (i, kind) in SamplerKind::ALL.iter().enumerate() {
            assert_eq!(*kind as usize, i);
        }
        assert_eq!(SamplerKind::Anisotropic.descriptor().anisotropy_clamp, 16);
    }
}
