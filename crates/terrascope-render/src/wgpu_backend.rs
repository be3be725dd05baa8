//! [`FrameBackend`] over wgpu.

use std::num::NonZeroU64;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use terrascope_core::{
    fence, Fence, FenceSignal, OutputKind, PixelBuffer, TargetId, TargetSizes, ToneMappingConfig,
};

use crate::backend::{ColorLoad, DepthLoad, FrameBackend, PassLoad};
use crate::depth_vis::{DepthVisPass, DepthVisUniforms};
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::scene::FrameInfo;
use crate::screen::ScreenPass;
use crate::targets::{target_name, FrameTarget, FrameTargets, DISPLAY_FORMAT};
use crate::tone_mapping::ToneMapPass;
use crate::uniforms::{FrameUniforms, FRAME_UNIFORM_STRIDE};

/// An open render pass on one of the frame targets.
pub struct WgpuPass<'a> {
    pass: wgpu::RenderPass<'a>,
    frame_bind_group: &'a wgpu::BindGroup,
    target: TargetId,
}

impl<'a> WgpuPass<'a> {
    pub fn target(&self) -> TargetId {
        self.target
    }

    pub fn render_pass(&mut self) -> &mut wgpu::RenderPass<'a> {
        &mut self.pass
    }

    /// Binds the frame uniforms of the pass's cascade at `index`.
    pub fn bind_frame(&mut self, index: u32, frame: &FrameInfo) {
        self.pass
            .set_bind_group(index, self.frame_bind_group, &[frame.uniform_offset]);
    }
}

/// Per-cascade uniform buffer bound with a dynamic offset.
struct FrameUniformBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl FrameUniformBuffer {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, capacity: usize) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame uniforms"),
            size: capacity.max(1) as u64 * FRAME_UNIFORM_STRIDE,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Uniform Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<FrameUniforms>() as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity: capacity.max(1),
        }
    }
}

/// Signals one fence once every buffer mapping of a target has finished.
struct JoinedSignal {
    remaining: AtomicUsize,
    ok: AtomicBool,
    signal: Mutex<Option<FenceSignal>>,
}

impl JoinedSignal {
    fn complete(&self, ok: bool) {
        if !ok {
            self.ok.store(false, Ordering::Release);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let signal = self.signal.lock().ok().and_then(|mut s| s.take());
            if let Some(signal) = signal {
                signal.signal(self.ok.load(Ordering::Acquire));
            }
        }
    }
}

/// The wgpu implementation of [`FrameBackend`].
pub struct WgpuBackend {
    gpu: GpuContext,
    msaa_samples: u32,
    targets: Option<FrameTargets>,
    frame_layout: wgpu::BindGroupLayout,
    frame_uniforms: FrameUniformBuffer,
    tone_map: ToneMapPass,
    screen: ScreenPass,
    depth_vis: DepthVisPass,
    encoder: Option<wgpu::CommandEncoder>,
    surface_texture: Option<wgpu::SurfaceTexture>,
    cascade_count: usize,
    max_distance: f64,
}

impl WgpuBackend {
    /// Creates the backend. `requested_msaa` is clamped to what the adapter
    /// supports for the scene formats.
    pub fn new(gpu: GpuContext, requested_msaa: u32) -> Self {
        let msaa_samples = gpu.supported_msaa_samples(requested_msaa);
        if msaa_samples != requested_msaa {
            log::info!("{requested_msaa}x MSAA unsupported, using {msaa_samples}x");
        }

        let frame_layout = gpu
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Uniform Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<FrameUniforms>() as u64
                        ),
                    },
                    count: None,
                }],
            });
        let frame_uniforms = FrameUniformBuffer::new(&gpu.device, &frame_layout, 4);
        let tone_map = ToneMapPass::new(&gpu.device, DISPLAY_FORMAT);
        let screen = ScreenPass::new(&gpu.device, gpu.output_format());
        let depth_vis = DepthVisPass::new(&gpu.device, DISPLAY_FORMAT);

        Self {
            gpu,
            msaa_samples,
            targets: None,
            frame_layout,
            frame_uniforms,
            tone_map,
            screen,
            depth_vis,
            encoder: None,
            surface_texture: None,
            cascade_count: 0,
            max_distance: 1.0e9,
        }
    }

    pub fn gpu(&self) -> &GpuContext {
        &self.gpu
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.gpu.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.gpu.queue
    }

    /// Layout of bind group 0 of every cascade-aware pipeline.
    pub fn frame_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.frame_layout
    }

    pub fn targets(&self) -> Option<&FrameTargets> {
        self.targets.as_ref()
    }

    fn target(&self, target: TargetId) -> RenderResult<&FrameTarget> {
        self.targets
            .as_ref()
            .and_then(|t| t.get(target))
            .ok_or(RenderError::TargetUnavailable(target_name(target)))
    }
}

fn color_ops<V>(load: ColorLoad, clear: impl FnOnce([f64; 4]) -> V) -> wgpu::Operations<V> {
    wgpu::Operations {
        load: match load {
            ColorLoad::Clear(c) => wgpu::LoadOp::Clear(clear(c)),
            ColorLoad::Load => wgpu::LoadOp::Load,
        },
        store: wgpu::StoreOp::Store,
    }
}

impl FrameBackend for WgpuBackend {
    type Pass<'a> = WgpuPass<'a>;

    fn msaa_samples(&self) -> u32 {
        self.msaa_samples
    }

    fn resize_targets(&mut self, sizes: &TargetSizes) -> RenderResult<()> {
        // Old transfer buffers may still be mapping; dropping them fails the
        // pending callbacks, which the readback slots already expect.
        self.targets = None;
        self.surface_texture = None;
        self.gpu
            .configure_surface(sizes.surface.width, sizes.surface.height);
        let targets = FrameTargets::new(&self.gpu, sizes, self.msaa_samples)?;
        self.tone_map
            .set_input(&self.gpu.device, targets.resolved_scene_view());
        if let (Some(codes), Some(distances)) =
            (targets.depth.color_view(0), targets.depth.color_view(1))
        {
            self.depth_vis.set_inputs(&self.gpu.device, codes, distances);
        }
        self.targets = Some(targets);
        Ok(())
    }

    fn begin_frame(&mut self) -> RenderResult<()> {
        if self.targets.is_none() {
            return Err(RenderError::TargetUnavailable("frame"));
        }
        self.encoder = Some(
            self.gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("frame encoder"),
                }),
        );
        Ok(())
    }

    fn upload_frame_uniforms(&mut self, uniforms: &[FrameUniforms]) {
        if uniforms.len() > self.frame_uniforms.capacity {
            self.frame_uniforms =
                FrameUniformBuffer::new(&self.gpu.device, &self.frame_layout, uniforms.len());
        }
        for (i, u) in uniforms.iter().enumerate() {
            self.gpu.queue.write_buffer(
                &self.frame_uniforms.buffer,
                i as u64 * FRAME_UNIFORM_STRIDE,
                bytemuck::bytes_of(u),
            );
        }
        self.cascade_count = uniforms.len();
        if let Some(last) = uniforms.last() {
            self.max_distance = f64::from(last.cascade.far);
        }
    }

    fn begin_pass(&mut self, target: TargetId, load: PassLoad) -> RenderResult<WgpuPass<'_>> {
        let frame_target = self
            .targets
            .as_ref()
            .and_then(|t| t.get(target))
            .ok_or(RenderError::TargetUnavailable(target_name(target)))?;
        let encoder = self.encoder.as_mut().ok_or(RenderError::FrameNotStarted)?;

        let color_attachments: Vec<_> = frame_target
            .colors
            .iter()
            .map(|color| {
                Some(wgpu::RenderPassColorAttachment {
                    view: &color.view,
                    resolve_target: None,
                    ops: color_ops(load.color, |c| wgpu::Color {
                        r: c[0],
                        g: c[1],
                        b: c[2],
                        a: c[3],
                    }),
                    depth_slice: None,
                })
            })
            .collect();
        let depth_stencil_attachment =
            frame_target
                .depth_view()
                .map(|view| wgpu::RenderPassDepthStencilAttachment {
                    view,
                    depth_ops: Some(wgpu::Operations {
                        load: match load.depth {
                            DepthLoad::Clear => wgpu::LoadOp::Clear(1.0),
                            DepthLoad::Load => wgpu::LoadOp::Load,
                        },
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                });

        let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(target_name(target)),
            color_attachments: &color_attachments,
            depth_stencil_attachment,
            ..Default::default()
        });
        Ok(WgpuPass {
            pass,
            frame_bind_group: &self.frame_uniforms.bind_group,
            target,
        })
    }

    fn resolve_scene(&mut self) {
        let (Some(targets), Some(encoder)) = (self.targets.as_ref(), self.encoder.as_mut()) else {
            return;
        };
        let (Some(resolve), Some(scene)) = (targets.resolve.as_ref(), targets.scene.colors.first())
        else {
            return;
        };
        let Some(resolve_view) = resolve.color_view(0) else {
            return;
        };
        // An empty pass that loads the multisampled scene and resolves it.
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("scene resolve"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: &scene.view,
                resolve_target: Some(resolve_view),
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            ..Default::default()
        });
    }

    fn tone_map(&mut self, config: &ToneMappingConfig) {
        let (Some(targets), Some(encoder)) = (self.targets.as_ref(), self.encoder.as_mut()) else {
            return;
        };
        let Some(output) = targets.tone_mapped.color_view(0) else {
            return;
        };
        if self.tone_map.update(&self.gpu.queue, config) {
            log::debug!("tone mapping changed: {config:?}");
        }
        self.tone_map.render(encoder, output);
    }

    fn visualize_depth(&mut self, output: OutputKind) {
        let Some(uniforms) =
            DepthVisUniforms::for_output(output, self.cascade_count, self.max_distance)
        else {
            return;
        };
        let (Some(targets), Some(encoder)) = (self.targets.as_ref(), self.encoder.as_mut()) else {
            return;
        };
        let Some(debug) = targets.debug.color_view(0) else {
            return;
        };
        self.depth_vis
            .render(&self.gpu.queue, encoder, debug, &uniforms);
    }

    fn present(&mut self, output: OutputKind) -> RenderResult<()> {
        let Some(surface) = self.gpu.surface.as_ref() else {
            return Ok(());
        };
        let frame = match surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                log::debug!("surface lost or outdated, reconfiguring");
                surface.configure(&self.gpu.device, &self.gpu.surface_config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::warn!("surface timeout, skipping present");
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => return Err(RenderError::OutOfMemory),
            Err(e) => {
                log::warn!("surface error: {e}");
                return Ok(());
            }
        };

        let source = match output {
            OutputKind::Scene => TargetId::ToneMapped,
            OutputKind::Picking => TargetId::Picking,
            OutputKind::Depth | OutputKind::Cascade => TargetId::Debug,
        };
        let (Some(targets), Some(encoder)) = (self.targets.as_ref(), self.encoder.as_mut()) else {
            return Err(RenderError::FrameNotStarted);
        };
        let source_view = targets
            .get(source)
            .and_then(|t| t.color_view(0))
            .ok_or(RenderError::TargetUnavailable(target_name(source)))?;
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.screen
            .render(&self.gpu.device, encoder, source_view, &view);
        self.surface_texture = Some(frame);
        Ok(())
    }

    fn copy_to_transfer(&mut self, target: TargetId) -> RenderResult<()> {
        let frame_target = self
            .targets
            .as_ref()
            .and_then(|t| t.get(target))
            .ok_or(RenderError::TargetUnavailable(target_name(target)))?;
        if !frame_target.is_readable() {
            return Err(RenderError::ReadbackFailed {
                target: target_name(target),
                reason: "target has no transfer buffer".to_string(),
            });
        }
        let encoder = self.encoder.as_mut().ok_or(RenderError::FrameNotStarted)?;
        frame_target.record_copy(encoder);
        Ok(())
    }

    fn submit(&mut self) -> RenderResult<()> {
        let encoder = self.encoder.take().ok_or(RenderError::FrameNotStarted)?;
        self.gpu.queue.submit(Some(encoder.finish()));
        if let Some(frame) = self.surface_texture.take() {
            frame.present();
        }
        Ok(())
    }

    fn map_transfer(&mut self, target: TargetId) -> RenderResult<Fence> {
        let frame_target = self.target(target)?;
        let (signal, pending) = fence();
        let joined = Arc::new(JoinedSignal {
            remaining: AtomicUsize::new(frame_target.transfer.len()),
            ok: AtomicBool::new(true),
            signal: Mutex::new(Some(signal)),
        });
        for transfer in &frame_target.transfer {
            let joined = Arc::clone(&joined);
            transfer.map_read(move |ok| joined.complete(ok));
        }
        Ok(pending)
    }

    fn poll_device(&mut self) {
        if let Err(e) = self.gpu.device.poll(wgpu::PollType::Poll) {
            log::warn!("device poll failed: {e}");
        }
    }

    fn read_transfer(&mut self, target: TargetId, images: &mut [PixelBuffer]) -> RenderResult<()> {
        let frame_target = self.target(target)?;
        let mut result = Ok(());
        for (transfer, image) in frame_target.transfer.iter().zip(images.iter_mut()) {
            if result.is_ok() {
                let data = transfer.buffer.slice(..).get_mapped_range();
                result = image
                    .copy_from_padded(&data, transfer.padded_bytes_per_row)
                    .map_err(|e| RenderError::ReadbackFailed {
                        target: target_name(target),
                        reason: e.to_string(),
                    });
            }
            transfer.release();
        }
        result
    }
}
