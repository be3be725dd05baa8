//! Per-cascade frame uniforms.

use terrascope_core::{Cascade, CascadeUniforms, Extent, RteUniforms, SplitVec3};

/// Distance between two cascades' uniforms in the shared buffer. Dynamic
/// offsets must be multiples of 256 on every adapter.
pub const FRAME_UNIFORM_STRIDE: u64 = 512;

/// Everything a shader needs to place geometry in one cascade.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct FrameUniforms {
    pub cascade: CascadeUniforms,
    pub rte: RteUniforms,
    /// Width, height, 1/width, 1/height of the scene target.
    pub viewport: [f32; 4],
}

impl Default for FrameUniforms {
    fn default() -> Self {
        Self {
            cascade: CascadeUniforms::default(),
            rte: SplitVec3::default().into(),
            viewport: [1.0; 4],
        }
    }
}

impl FrameUniforms {
    #[allow(clippy::cast_precision_loss)]
    pub fn new(cascade: &Cascade, eye: SplitVec3, viewport: Extent) -> Self {
        let width = viewport.width.max(1) as f32;
        let height = viewport.height.max(1) as f32;
        Self {
            cascade: cascade.uniforms(),
            rte: eye.into(),
            viewport: [width, height, 1.0 / width, 1.0 / height],
        }
    }

    /// Dynamic offset of a cascade's uniforms.
    pub fn offset(cascade_index: usize) -> u32 {
        (cascade_index as u64 * FRAME_UNIFORM_STRIDE) as u32
    }
}
