//! Core types for terrascope.
//!
//! This crate holds everything about frame orchestration that does not touch
//! the GPU:
//! - [`coords`]: relative-to-eye splitting of double-precision positions
//! - [`pick`]: the picking color registry
//! - [`camera`] and [`cascade`]: the planet camera and its frustum cascades
//! - [`readback`] and [`depth`]: async readback state and depth decoding
//! - [`instances`]: dense instance arrays with dirty tracking
//! - [`options`]: renderer configuration

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
// Builder patterns return Self which doesn't need must_use
#![allow(clippy::must_use_candidate)]
// Pixel and cascade indices cross between u32/usize/f64 constantly
#![allow(clippy::cast_possible_truncation)]

pub mod camera;
pub mod cascade;
pub mod coords;
pub mod depth;
pub mod entity;
pub mod error;
pub mod input;
pub mod instances;
pub mod options;
pub mod pick;
pub mod pixels;
pub mod readback;
pub mod targets;
pub mod tone_mapping;

pub use camera::{PlanetCamera, ProjectionMode};
pub use cascade::{Cascade, CascadePass, CascadeRange, CascadeUniforms, DEFAULT_CASCADES};
pub use coords::{split, split_absolute, RteEncoder, RteUniforms, SplitVec3};
pub use depth::{DepthImage, DepthSample, NO_GEOMETRY};
pub use entity::{BatchId, BatchQueue, EntityCategory, PassKind};
pub use error::{Result, TerrascopeError};
pub use input::{InputState, PointerButton, RefreshRequest};
pub use instances::{Instance, InstanceAttribute, InstanceBatch, InstanceHandle, RtePosition};
pub use options::Options;
pub use pick::{ObjectId, PickColor, PickingRegistry};
pub use pixels::{PixelBuffer, PixelFormat};
pub use readback::{fence, Fence, FenceSignal, ReadbackPoll, ReadbackSlot, ReadbackStats};
pub use targets::{Extent, OutputKind, ResizeDebounce, ResizePhase, TargetId, TargetSizes};
pub use tone_mapping::ToneMappingConfig;

// Re-export glam types for convenience
pub use glam::{DVec2, DVec3, Mat4, Vec3};
