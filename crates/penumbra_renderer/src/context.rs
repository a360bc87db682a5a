use std::sync::Arc;

use log::{info, warn};
use winit::window::Window;

use crate::{error::RenderError, texture::TextureHelper};

/// Features used when the adapter has them; each has a fallback.
const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::DEPTH_CLIP_CONTROL
    .union(wgpu::Features::POLYGON_MODE_LINE)
    .union(wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER);

pub fn present_mode(vsync: bool) -> wgpu::PresentMode {
    if vsync {
        wgpu::PresentMode::Fifo // VSync On
    } else {
        wgpu::PresentMode::AutoNoVsync
    }
}

pub struct GpuContext {
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    adapter: wgpu::Adapter,
}

impl GpuContext {
    pub fn new(window: Arc<Window>, vsync: bool) -> Result<Self, RenderError> {
        let size = window.inner_size();

        // 1. Instance and surface; the Arc keeps the window alive as long as the surface
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance.create_surface(window)?;

        // 2. Physical GPU
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))?;
        let info = adapter.get_info();
        info!("Using {} ({:?})", info.name, info.backend);

        // 3. Logical device
        let features = adapter.features().intersection(OPTIONAL_FEATURES);
        let missing = OPTIONAL_FEATURES.difference(features);
        if !missing.is_empty() {
            warn!("Adapter lacks {missing:?}; falling back");
        }
        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Penumbra Device"),
            required_features: features,
            ..Default::default()
        }))?;

        // 4. Surface configuration, sRGB so tonemapped output is encoded on store
        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|format| format.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or(RenderError::UnsupportedSurface)?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: present_mode(vsync),
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            adapter,
        })
    }

    /// Zero-sized surfaces are not configured; the frame loop skips them.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
    }

    pub fn set_vsync(&mut self, vsync: bool) {
        let mode = present_mode(vsync);
        if self.config.present_mode != mode {
            info!("Present mode: {mode:?}");
            self.config.present_mode = mode;
            self.reconfigure();
        }
    }

    pub fn reconfigure(&self) {
        self.surface.configure(&self.device, &self.config);
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn supports_msaa(&self, samples: u32) -> bool {
        [TextureHelper::HDR_FORMAT, TextureHelper::DEPTH_STENCIL_FORMAT]
            .into_iter()
            .all(|format| {
                self.adapter
                    .get_texture_format_features(format)
                    .flags
                    .sample_count_supported(samples)
            })
    }
}
