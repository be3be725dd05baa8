//! Rendering error types.

use thiserror::Error;

use terrascope_core::TerrascopeError;

/// Errors that can occur during rendering operations.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),

    /// Failed to create surface.
    #[error("failed to create surface: {0}")]
    SurfaceCreationFailed(#[from] wgpu::CreateSurfaceError),

    /// A frame target could not be created.
    #[error("failed to create {target} target: {reason}")]
    TargetCreationFailed { target: &'static str, reason: String },

    /// A pass was requested for a target that does not exist.
    #[error("{0} target is not available")]
    TargetUnavailable(&'static str),

    /// A pass was requested outside of `begin_frame`/`submit`.
    #[error("no frame is being recorded")]
    FrameNotStarted,

    /// Reading a mapped transfer buffer failed.
    #[error("readback of {target} failed: {reason}")]
    ReadbackFailed { target: &'static str, reason: String },

    /// Surface lost.
    #[error("surface lost")]
    SurfaceLost,

    /// Out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// Scene or configuration error.
    #[error(transparent)]
    Scene(#[from] TerrascopeError),
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
