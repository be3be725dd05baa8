//! Frame orchestration for terrascope.
//!
//! This crate turns the GPU-free types of `terrascope-core` into frames:
//! - [`FrameOrchestrator`]: the per-frame cascade loop, picking and depth
//!   refreshes, and asynchronous readback queries
//! - [`FrameBackend`]: the GPU boundary, implemented over wgpu by
//!   [`WgpuBackend`]
//! - [`FrameTargets`]: the scene, picking, depth and post-processing targets
//! - [`MeshInstanceBatch`]: an instanced mesh entity batch with dirty uploads

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
// Pixel sizes and buffer offsets cross between u32/u64/usize constantly
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]

pub mod backend;
pub mod depth_vis;
pub mod error;
mod fullscreen;
pub mod gpu;
pub mod instance_buffers;
pub mod mesh_batch;
pub mod orchestrator;
pub mod scene;
pub mod screen;
pub mod targets;
pub mod tone_mapping;
pub mod uniforms;
pub mod wgpu_backend;

pub use backend::{ColorLoad, DepthLoad, FrameBackend, PassLoad};
pub use depth_vis::{DepthVisPass, DepthVisUniforms};
pub use error::{RenderError, RenderResult};
pub use gpu::GpuContext;
pub use instance_buffers::InstanceBuffers;
pub use mesh_batch::{MeshData, MeshInstanceBatch, MeshVertex};
pub use orchestrator::{FrameOrchestrator, FrameOutcome};
pub use scene::{CallbackId, EntityBatch, FrameInfo, PassHook, RenderNode, SceneContext};
pub use screen::ScreenPass;
pub use targets::{FrameTarget, FrameTargets};
pub use tone_mapping::{ToneMapPass, ToneMapUniforms};
pub use uniforms::{FrameUniforms, FRAME_UNIFORM_STRIDE};
pub use wgpu_backend::{WgpuBackend, WgpuPass};
