//! GPU framebuffers and their transfer buffers.

use std::sync::atomic::{AtomicBool, Ordering};

use terrascope_core::{Extent, PixelFormat, TargetId, TargetSizes};

use crate::error::{RenderError, RenderResult};
use crate::gpu::{GpuContext, DEPTH_FORMAT, DISTANCE_FORMAT, PICKING_FORMAT, SCENE_FORMAT};

/// Format of the tone-mapped and debug targets.
pub const DISPLAY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Human-readable target name for logs and errors.
pub fn target_name(target: TargetId) -> &'static str {
    match target {
        TargetId::Scene => "scene",
        TargetId::Resolve => "resolve",
        TargetId::ToneMapped => "tone-mapped",
        TargetId::Picking => "picking",
        TargetId::Depth => "depth",
        TargetId::Debug => "debug",
    }
}

/// One color attachment.
pub struct ColorAttachment {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

/// CPU-visible copy destination for one readable attachment.
pub struct TransferBuffer {
    pub buffer: wgpu::Buffer,
    /// Row stride in the buffer, a multiple of `COPY_BYTES_PER_ROW_ALIGNMENT`.
    pub padded_bytes_per_row: u32,
    pub format: PixelFormat,
    /// Set from `map_async` until the next `unmap`.
    mapped: AtomicBool,
}

impl TransferBuffer {
    /// Requests a read mapping of the whole buffer.
    pub fn map_read(&self, callback: impl FnOnce(bool) + Send + 'static) {
        self.mapped.store(true, Ordering::Release);
        self.buffer
            .slice(..)
            .map_async(wgpu::MapMode::Read, move |result| callback(result.is_ok()));
    }

    /// Unmaps the buffer if a mapping was requested, cancelling one still
    /// pending. Returns whether anything was unmapped.
    pub fn release(&self) -> bool {
        let was_mapped = self.mapped.swap(false, Ordering::AcqRel);
        if was_mapped {
            self.buffer.unmap();
        }
        was_mapped
    }
}

/// A framebuffer: color attachments, an optional depth attachment, and a
/// transfer buffer per color attachment when it is readable.
pub struct FrameTarget {
    pub extent: Extent,
    pub sample_count: u32,
    pub colors: Vec<ColorAttachment>,
    pub depth: Option<(wgpu::Texture, wgpu::TextureView)>,
    pub transfer: Vec<TransferBuffer>,
}

impl FrameTarget {
    pub fn color_view(&self, index: usize) -> Option<&wgpu::TextureView> {
        self.colors.get(index).map(|c| &c.view)
    }

    pub fn depth_view(&self) -> Option<&wgpu::TextureView> {
        self.depth.as_ref().map(|(_, view)| view)
    }

    pub fn is_readable(&self) -> bool {
        !self.transfer.is_empty()
    }

    /// Records copies of every readable attachment into its transfer buffer.
    pub fn record_copy(&self, encoder: &mut wgpu::CommandEncoder) {
        for (color, transfer) in self.colors.iter().zip(&self.transfer) {
            // A buffer left mapped by a failed request cannot be copied into.
            if transfer.release() {
                log::debug!("transfer buffer was still mapped, unmapped before copy");
            }
            encoder.copy_texture_to_buffer(
                wgpu::TexelCopyTextureInfo {
                    texture: &color.texture,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                wgpu::TexelCopyBufferInfo {
                    buffer: &transfer.buffer,
                    layout: wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(transfer.padded_bytes_per_row),
                        rows_per_image: Some(self.extent.height),
                    },
                },
                extent_3d(self.extent),
            );
        }
    }
}

/// Every offscreen target of one surface size.
pub struct FrameTargets {
    pub sizes: TargetSizes,
    pub msaa_samples: u32,
    pub scene: FrameTarget,
    /// Present only when the scene is multisampled.
    pub resolve: Option<FrameTarget>,
    pub tone_mapped: FrameTarget,
    pub picking: FrameTarget,
    pub depth: FrameTarget,
    pub debug: FrameTarget,
}

impl FrameTargets {
    /// Creates every target. Device errors raised while creating them are
    /// caught and returned instead of reaching the uncaptured error handler.
    pub fn new(gpu: &GpuContext, sizes: &TargetSizes, msaa_samples: u32) -> RenderResult<Self> {
        let max = gpu.max_texture_dimension();
        for extent in [sizes.scene, sizes.picking, sizes.depth] {
            if extent.is_empty() || extent.width > max || extent.height > max {
                return Err(RenderError::TargetCreationFailed {
                    target: "frame",
                    reason: format!(
                        "{}x{} is outside the supported range 1..={max}",
                        extent.width, extent.height
                    ),
                });
            }
        }

        let device = &gpu.device;
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        device.push_error_scope(wgpu::ErrorFilter::Validation);

        let targets = Self {
            sizes: *sizes,
            msaa_samples,
            scene: create_target(
                device,
                "scene",
                sizes.scene,
                msaa_samples,
                &[SCENE_FORMAT],
                true,
                false,
            ),
            resolve: (msaa_samples > 1).then(|| {
                create_target(device, "resolve", sizes.scene, 1, &[SCENE_FORMAT], false, false)
            }),
            tone_mapped: create_target(
                device,
                "tone-mapped",
                sizes.scene,
                1,
                &[DISPLAY_FORMAT],
                false,
                false,
            ),
            picking: create_target(
                device,
                "picking",
                sizes.picking,
                1,
                &[PICKING_FORMAT],
                true,
                true,
            ),
            depth: create_target(
                device,
                "depth",
                sizes.depth,
                1,
                &[PICKING_FORMAT, DISTANCE_FORMAT],
                true,
                true,
            ),
            debug: create_target(device, "debug", sizes.scene, 1, &[DISPLAY_FORMAT], false, false),
        };

        let validation = pollster::block_on(device.pop_error_scope());
        let out_of_memory = pollster::block_on(device.pop_error_scope());
        if out_of_memory.is_some() {
            return Err(RenderError::OutOfMemory);
        }
        if let Some(error) = validation {
            return Err(RenderError::TargetCreationFailed {
                target: "frame",
                reason: error.to_string(),
            });
        }

        log::debug!(
            "frame targets created: scene {}x{} ({}x MSAA), picking {}x{}, depth {}x{}",
            sizes.scene.width,
            sizes.scene.height,
            msaa_samples,
            sizes.picking.width,
            sizes.picking.height,
            sizes.depth.width,
            sizes.depth.height
        );
        Ok(targets)
    }

    pub fn get(&self, target: TargetId) -> Option<&FrameTarget> {
        match target {
            TargetId::Scene => Some(&self.scene),
            TargetId::Resolve => self.resolve.as_ref(),
            TargetId::ToneMapped => Some(&self.tone_mapped),
            TargetId::Picking => Some(&self.picking),
            TargetId::Depth => Some(&self.depth),
            TargetId::Debug => Some(&self.debug),
        }
    }

    /// Single-sample HDR scene color.
    pub fn resolved_scene_view(&self) -> &wgpu::TextureView {
        let target = self.resolve.as_ref().unwrap_or(&self.scene);
        &target.colors[0].view
    }
}

/// Row stride of a copy, padded to the copy alignment.
pub fn padded_bytes_per_row(width: u32, format: PixelFormat) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * format.bytes_per_pixel()).div_ceil(align) * align
}

fn pixel_format(format: wgpu::TextureFormat) -> PixelFormat {
    if format == DISTANCE_FORMAT {
        PixelFormat::R32Float
    } else {
        PixelFormat::Rgba8
    }
}

fn extent_3d(extent: Extent) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: extent.width,
        height: extent.height,
        depth_or_array_layers: 1,
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &str,
    extent: Extent,
    sample_count: u32,
    formats: &[wgpu::TextureFormat],
    with_depth: bool,
    readable: bool,
) -> FrameTarget {
    let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
    if sample_count == 1 {
        usage |= wgpu::TextureUsages::TEXTURE_BINDING;
    }
    if readable {
        usage |= wgpu::TextureUsages::COPY_SRC;
    }

    let colors = formats
        .iter()
        .enumerate()
        .map(|(i, &format)| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(&format!("{label} color {i}")),
                size: extent_3d(extent),
                mip_level_count: 1,
                sample_count,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            ColorAttachment {
                texture,
                view,
                format,
            }
        })
        .collect();

    let depth = with_depth.then(|| {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} depth")),
            size: extent_3d(extent),
            mip_level_count: 1,
            sample_count,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        (texture, view)
    });

    let transfer = if readable {
        formats
            .iter()
            .enumerate()
            .map(|(i, &format)| {
                let format = pixel_format(format);
                let padded = padded_bytes_per_row(extent.width, format);
                TransferBuffer {
                    buffer: device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some(&format!("{label} transfer {i}")),
                        size: u64::from(padded) * u64::from(extent.height),
                        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
                        mapped_at_creation: false,
                    }),
                    padded_bytes_per_row: padded,
                    format,
                    mapped: AtomicBool::new(false),
                }
            })
            .collect()
    } else {
        Vec::new()
    };

    FrameTarget {
        extent,
        sample_count,
        colors,
        depth,
        transfer,
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_padded_rows() {
        assert_eq!(padded_bytes_per_row(1, PixelFormat::Rgba8), 256);
        assert_eq!(padded_bytes_per_row(64, PixelFormat::Rgba8), 256);
        assert_eq!(padded_bytes_per_row(65, PixelFormat::R32Float), 512);
    }

    #[test]
    fn test_pixel_format_mapping() {
        assert_eq!(pixel_format(DISTANCE_FORMAT), PixelFormat::R32Float);
        assert_eq!(pixel_format(PICKING_FORMAT), PixelFormat::Rgba8);
    }

    proptest! {
        #[test]
        fn prop_padded_row_is_aligned_and_tight(width in 1u32..16_384, distance in any::<bool>()) {
            let format = if distance { PixelFormat::R32Float } else { PixelFormat::Rgba8 };
            let tight = width * format.bytes_per_pixel();
            let padded = padded_bytes_per_row(width, format);
            prop_assert_eq!(padded % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);
            prop_assert!(padded >= tight);
            prop_assert!(padded - tight < wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        }
    }
}
