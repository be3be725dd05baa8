//! terrascope: a planet-scale 3D frame orchestrator.
//!
//! A [`Globe`] owns a wgpu-backed [`FrameOrchestrator`] and feeds it the
//! window events it cares about. Each frame renders the scene once per
//! depth cascade, refreshes the picking and depth targets when the pointer
//! hovers, and answers pixel queries from the last completed readback.
//!
//! # Quick Start
//!
//! ```no_run
//! use terrascope::{DVec3, Instance, MeshData, Options};
//!
//! terrascope::init_logging();
//! terrascope::run(Options::default(), |globe| {
//!     let site = Instance {
//!         position: DVec3::new(6_378_137.0, 0.0, 0.0),
//!         ..Instance::default()
//!     };
//!     globe.add_mesh_batch(&MeshData::cube(50.0), [site]);
//!     globe.orchestrator_mut().camera_mut().look_at(
//!         DVec3::new(6_378_637.0, 0.0, 0.0),
//!         DVec3::new(6_378_137.0, 0.0, 0.0),
//!         DVec3::Z,
//!     );
//!     Ok(())
//! })
//! .unwrap();
//! ```

// Documentation lints - internal functions don't need exhaustive panic/error docs
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]

mod app;
mod globe;

pub use app::run;
pub use globe::Globe;

pub use terrascope_core::{
    split, split_absolute, BatchId, Cascade, CascadeRange, DepthSample, EntityCategory, Extent,
    Instance, InstanceAttribute, InstanceBatch, InstanceHandle, ObjectId, Options, OutputKind,
    PassKind, PickColor, PickingRegistry, PlanetCamera, PointerButton, ProjectionMode,
    ReadbackStats, ResizeDebounce, ResizePhase, RteEncoder, RtePosition, SplitVec3, TargetId,
    TerrascopeError, ToneMappingConfig, DEFAULT_CASCADES,
};
pub use terrascope_render::{
    CallbackId, EntityBatch, FrameBackend, FrameInfo, FrameOrchestrator, FrameOutcome, GpuContext,
    MeshData, MeshInstanceBatch, PassHook, RenderError, RenderNode, SceneContext, WgpuBackend,
    WgpuPass,
};

pub use glam::{DVec2, DVec3, Mat4, Vec3};
pub use wgpu;
pub use winit;

use thiserror::Error;

/// Errors surfaced by the windowed front end.
#[derive(Error, Debug)]
pub enum Error {
    /// Rendering failed.
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Scene or configuration error.
    #[error(transparent)]
    Scene(#[from] TerrascopeError),

    /// The windowing event loop could not start or failed.
    #[error("event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    /// The window could not be created.
    #[error("failed to create window: {0}")]
    Window(#[from] winit::error::OsError),
}

/// A specialized Result type for the front end.
pub type Result<T> = std::result::Result<T, Error>;

/// Installs an `env_logger` logger honoring `RUST_LOG`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    if env_logger::try_init().is_ok() {
        log::info!("terrascope {} initialized", env!("CARGO_PKG_VERSION"));
    }
}
