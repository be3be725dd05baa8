//! HDR scene to display colors.

use terrascope_core::ToneMappingConfig;
use wgpu::util::DeviceExt;

use crate::fullscreen::{sampler_entry, texture_entry, uniform_entry, FullscreenPipeline};

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ToneMapUniforms {
    pub exposure: f32,
    pub white_level: f32,
    pub gamma: f32,
    pub padding: f32,
}

impl From<&ToneMappingConfig> for ToneMapUniforms {
    fn from(config: &ToneMappingConfig) -> Self {
        Self {
            exposure: config.exposure,
            white_level: config.white_level,
            gamma: config.gamma,
            padding: 0.0,
        }
    }
}

/// Tone maps the resolved scene into the display-format target.
///
/// The bind group points at the resolved scene view, so it is rebuilt with
/// [`set_input`](Self::set_input) whenever the frame targets are recreated.
pub struct ToneMapPass {
    pipeline: FullscreenPipeline,
    uniform_buffer: wgpu::Buffer,
    uploaded: ToneMapUniforms,
    sampler: wgpu::Sampler,
    bind_group: Option<wgpu::BindGroup>,
}

impl ToneMapPass {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        let pipeline = FullscreenPipeline::new(
            device,
            "tone map",
            include_str!("shaders/tone_map.wgsl"),
            &[texture_entry(0, true), sampler_entry(1), uniform_entry(2)],
            output_format,
        );
        let uploaded = ToneMapUniforms::from(&ToneMappingConfig::default());
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("tone map uniforms"),
            contents: bytemuck::bytes_of(&uploaded),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("tone map"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        Self {
            pipeline,
            uniform_buffer,
            uploaded,
            sampler,
            bind_group: None,
        }
    }

    pub fn set_input(&mut self, device: &wgpu::Device, scene: &wgpu::TextureView) {
        self.bind_group = Some(self.pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(scene),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        ));
    }

    /// Writes the uniforms if `config` differs from what the GPU has.
    pub fn update(&mut self, queue: &wgpu::Queue, config: &ToneMappingConfig) -> bool {
        let uniforms = ToneMapUniforms::from(config);
        if uniforms == self.uploaded {
            return false;
        }
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.uploaded = uniforms;
        true
    }

    /// Does nothing before the first [`set_input`](Self::set_input).
    pub fn render(&self, encoder: &mut wgpu::CommandEncoder, output: &wgpu::TextureView) {
        if let Some(bind_group) = &self.bind_group {
            self.pipeline.draw(encoder, output, bind_group);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_layout_matches_shader() {
        assert_eq!(std::mem::size_of::<ToneMapUniforms>(), 16);
        let uniforms = ToneMapUniforms::from(&ToneMappingConfig::new(2.0, 1.0, 1.8));
        assert_eq!(bytemuck::cast::<_, [f32; 4]>(uniforms), [2.0, 1.0, 1.8, 0.0]);
    }
}
