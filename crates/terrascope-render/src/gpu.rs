//! Instance, adapter, device and optional surface.

use std::sync::Arc;

use crate::error::{RenderError, RenderResult};

/// HDR format of the scene target.
pub const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Depth format shared by the scene, picking and depth targets.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Format of the picking target and the cascade-code channel.
pub const PICKING_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Format of the linear-distance channel.
pub const DISTANCE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Format of offscreen presentation when there is no surface.
pub const HEADLESS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// The wgpu objects every other GPU type borrows.
pub struct GpuContext {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    /// The render surface (None for headless).
    pub surface: Option<wgpu::Surface<'static>>,
    pub surface_config: wgpu::SurfaceConfiguration,
}

impl GpuContext {
    /// Creates a context that presents into a window.
    pub async fn new_windowed(window: Arc<winit::window::Window>) -> RenderResult<Self> {
        let instance = create_instance();
        let surface = instance.create_surface(window.clone())?;
        let adapter = request_adapter(&instance, Some(&surface)).await?;
        let (device, queue) = request_device(&adapter, "terrascope device").await?;

        let size = window.inner_size();
        let surface_caps = surface.get_capabilities(&adapter);
        // Tone mapping applies gamma itself, so an sRGB surface would encode twice.
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| RenderError::TargetCreationFailed {
                target: "surface",
                reason: "adapter reports no surface formats".to_string(),
            })?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        if size.width > 0 && size.height > 0 {
            surface.configure(&device, &surface_config);
        }

        log::info!(
            "using adapter '{}' ({:?}), surface format {:?}",
            adapter.get_info().name,
            adapter.get_info().backend,
            surface_format
        );

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface: Some(surface),
            surface_config,
        })
    }

    /// Creates a context without a surface.
    pub async fn new_headless(width: u32, height: u32) -> RenderResult<Self> {
        let instance = create_instance();
        let adapter = request_adapter(&instance, None).await?;
        let (device, queue) = request_device(&adapter, "terrascope device (headless)").await?;

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            format: HEADLESS_FORMAT,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: wgpu::CompositeAlphaMode::Auto,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };

        log::info!("using headless adapter '{}'", adapter.get_info().name);

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            surface: None,
            surface_config,
        })
    }

    /// Format of whatever `present` draws into.
    pub fn output_format(&self) -> wgpu::TextureFormat {
        self.surface_config.format
    }

    /// Reconfigures the surface for a new size. Zero sizes are ignored.
    pub fn configure_surface(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.surface_config.width = width;
        self.surface_config.height = height;
        if let Some(surface) = &self.surface {
            surface.configure(&self.device, &self.surface_config);
        }
    }

    /// Largest MSAA count not above `requested` that the adapter supports for
    /// the scene and depth formats.
    pub fn supported_msaa_samples(&self, requested: u32) -> u32 {
        let scene = self.adapter.get_texture_format_features(SCENE_FORMAT).flags;
        let depth = self.adapter.get_texture_format_features(DEPTH_FORMAT).flags;
        [16, 8, 4, 2]
            .into_iter()
            .filter(|&n| n <= requested)
            .find(|&n| scene.sample_count_supported(n) && depth.sample_count_supported(n))
            .unwrap_or(1)
    }

    /// Largest texture side the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }
}

fn create_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..wgpu::InstanceDescriptor::default()
    })
}

/// Prefers a discrete GPU; headless runs accept any adapter, including a
/// software fallback.
async fn request_adapter(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> RenderResult<wgpu::Adapter> {
    let options = wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: surface,
        force_fallback_adapter: false,
    };
    if let Ok(adapter) = instance.request_adapter(&options).await {
        return Ok(adapter);
    }
    if surface.is_some() {
        return Err(RenderError::AdapterCreationFailed);
    }
    log::warn!("no hardware adapter, trying the fallback adapter");
    instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            force_fallback_adapter: true,
            ..options
        })
        .await
        .map_err(|_| RenderError::AdapterCreationFailed)
}

async fn request_device(
    adapter: &wgpu::Adapter,
    label: &str,
) -> RenderResult<(wgpu::Device, wgpu::Queue)> {
    let device_and_queue = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::default(),
            trace: wgpu::Trace::default(),
            experimental_features: wgpu::ExperimentalFeatures::default(),
        })
        .await?;
    Ok(device_and_queue)
}
