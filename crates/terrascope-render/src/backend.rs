//! The GPU boundary of the frame orchestrator.
//!
//! [`FrameOrchestrator`](crate::FrameOrchestrator) drives a frame through this
//! trait and never touches GPU objects itself. [`WgpuBackend`](crate::WgpuBackend)
//! is the real implementation; tests drive the orchestrator with a software
//! backend.

use terrascope_core::{Fence, OutputKind, PixelBuffer, TargetId, TargetSizes, ToneMappingConfig};

use crate::error::RenderResult;
use crate::uniforms::FrameUniforms;

/// What happens to color attachments when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColorLoad {
    /// Clear every color attachment to this RGBA value.
    Clear([f64; 4]),
    /// Keep the previous contents.
    Load,
}

/// What happens to the depth attachment when a pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthLoad {
    /// Clear to the far plane.
    Clear,
    /// Keep the previous contents.
    Load,
}

/// Load operations for one pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PassLoad {
    pub color: ColorLoad,
    pub depth: DepthLoad,
}

impl PassLoad {
    pub const BLACK: [f64; 4] = [0.0, 0.0, 0.0, 0.0];

    /// Clears color and depth.
    pub fn clear(color: [f64; 4]) -> Self {
        Self {
            color: ColorLoad::Clear(color),
            depth: DepthLoad::Clear,
        }
    }

    /// Keeps color, clears depth.
    pub fn keep_color() -> Self {
        Self {
            color: ColorLoad::Load,
            depth: DepthLoad::Clear,
        }
    }
}

/// Operations the orchestrator needs from a GPU.
///
/// Calls arrive in frame order: `begin_frame`, passes, `resolve_scene`,
/// `tone_map`, `visualize_depth`, `present`, `copy_to_transfer`, `submit`,
/// then `map_transfer` for every copied target.
///
/// Backends are `'static` so entity batches over them can be downcast.
pub trait FrameBackend: 'static {
    /// An open render pass. Dropping it ends the pass.
    type Pass<'a>
    where
        Self: 'a;

    /// MSAA sample count actually used for the scene target.
    fn msaa_samples(&self) -> u32;

    /// Recreates every target and transfer buffer for new sizes.
    fn resize_targets(&mut self, sizes: &TargetSizes) -> RenderResult<()>;

    /// Starts recording a frame.
    fn begin_frame(&mut self) -> RenderResult<()>;

    /// Uploads per-cascade uniforms, indexed by cascade index.
    fn upload_frame_uniforms(&mut self, uniforms: &[FrameUniforms]);

    /// Opens a pass on a target.
    fn begin_pass(&mut self, target: TargetId, load: PassLoad) -> RenderResult<Self::Pass<'_>>;

    /// Resolves the multisampled scene into the single-sample resolve target.
    fn resolve_scene(&mut self);

    /// Tone maps the scene into the tone-mapped target.
    fn tone_map(&mut self, config: &ToneMappingConfig);

    /// Renders the depth target as a visualization for `output`.
    fn visualize_depth(&mut self, output: OutputKind);

    /// Draws the selected output onto the presentation surface.
    fn present(&mut self, output: OutputKind) -> RenderResult<()>;

    /// Records a copy of every readable attachment into its transfer buffer.
    fn copy_to_transfer(&mut self, target: TargetId) -> RenderResult<()>;

    /// Submits the recorded frame.
    fn submit(&mut self) -> RenderResult<()>;

    /// Starts mapping the transfer buffers of a copied target. The returned
    /// fence is signaled once every buffer is readable.
    fn map_transfer(&mut self, target: TargetId) -> RenderResult<Fence>;

    /// Lets the device make progress on pending mappings without blocking.
    fn poll_device(&mut self);

    /// Copies mapped transfer buffers into `images` and unmaps them.
    fn read_transfer(&mut self, target: TargetId, images: &mut [PixelBuffer]) -> RenderResult<()>;
}
