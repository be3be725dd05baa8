//! Debug visualization of the depth target.

use bytemuck::Zeroable;
use terrascope_core::OutputKind;
use wgpu::util::DeviceExt;

use crate::fullscreen::{texture_entry, uniform_entry, FullscreenPipeline};

/// GPU representation of the visualization parameters.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DepthVisUniforms {
    /// 0 = log-scaled distance, 1 = cascade colors.
    pub mode: u32,
    pub cascade_count: u32,
    /// Distance mapped to black.
    pub max_distance: f32,
    pub padding: f32,
}

impl DepthVisUniforms {
    /// Parameters for an output, `None` if the output does not visualize depth.
    #[allow(clippy::cast_possible_truncation)]
    pub fn for_output(output: OutputKind, cascade_count: usize, max_distance: f64) -> Option<Self> {
        let mode = match output {
            OutputKind::Depth => 0,
            OutputKind::Cascade => 1,
            OutputKind::Scene | OutputKind::Picking => return None,
        };
        Some(Self {
            mode,
            cascade_count: cascade_count as u32,
            max_distance: (max_distance as f32).max(2.0),
            padding: 0.0,
        })
    }
}

/// Renders the depth target's channels as colors.
pub struct DepthVisPass {
    pipeline: FullscreenPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: Option<wgpu::BindGroup>,
}

impl DepthVisPass {
    pub fn new(device: &wgpu::Device, output_format: wgpu::TextureFormat) -> Self {
        // Both channels are read with textureLoad; R32Float is not filterable.
        let pipeline = FullscreenPipeline::new(
            device,
            "depth visualization",
            include_str!("shaders/depth_vis.wgsl"),
            &[texture_entry(0, false), texture_entry(1, false), uniform_entry(2)],
            output_format,
        );
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("depth visualization uniforms"),
            contents: bytemuck::bytes_of(&DepthVisUniforms::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        Self {
            pipeline,
            uniform_buffer,
            bind_group: None,
        }
    }

    /// Points the pass at the depth target's code and distance attachments.
    pub fn set_inputs(
        &mut self,
        device: &wgpu::Device,
        codes: &wgpu::TextureView,
        distances: &wgpu::TextureView,
    ) {
        self.bind_group = Some(self.pipeline.bind_group(
            device,
            &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(codes),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(distances),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: self.uniform_buffer.as_entire_binding(),
                },
            ],
        ));
    }

    pub fn render(
        &self,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        output: &wgpu::TextureView,
        uniforms: &DepthVisUniforms,
    ) {
        let Some(bind_group) = &self.bind_group else {
            return;
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
        self.pipeline.draw(encoder, output, bind_group);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modes() {
        let depth = DepthVisUniforms::for_output(OutputKind::Depth, 4, 1.0e9).unwrap();
        assert_eq!(depth.mode, 0);
        let cascade = DepthVisUniforms::for_output(OutputKind::Cascade, 4, 1.0e9).unwrap();
        assert_eq!((cascade.mode, cascade.cascade_count), (1, 4));
        assert!(DepthVisUniforms::for_output(OutputKind::Scene, 4, 1.0e9).is_none());
        assert!(DepthVisUniforms::for_output(OutputKind::Picking, 4, 1.0e9).is_none());
    }
}
