//! Blit of an offscreen target onto the presentation surface.

use crate::fullscreen::{sampler_entry, texture_entry, FullscreenPipeline};

/// Draws one of the display-format targets over the whole surface.
pub struct ScreenPass {
    pipeline: FullscreenPipeline,
    sampler: wgpu::Sampler,
}

impl ScreenPass {
    pub fn new(device: &wgpu::Device, surface_format: wgpu::TextureFormat) -> Self {
        let pipeline = FullscreenPipeline::new(
            device,
            "screen blit",
            include_str!("shaders/screen.wgsl"),
            &[texture_entry(0, true), sampler_entry(1)],
            surface_format,
        );
        // Nearest, so the picking output shows exact colors even when the
        // picking target is smaller than the surface.
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("screen blit"),
            ..Default::default()
        });
        Self { pipeline, sampler }
    }

    pub fn render(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        source: &wgpu::TextureView,
        surface: &wgpu::TextureView,
    ) {
        let bind_group = self.pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(source),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
            ],
        );
        self.pipeline.draw(encoder, surface, &bind_group);
    }
}
