//! Error types for terrascope.

use thiserror::Error;

/// The main error type for terrascope operations.
#[derive(Error, Debug)]
pub enum TerrascopeError {
    /// A render node with the given name is already registered.
    #[error("render node '{0}' already exists")]
    NodeExists(String),

    /// A render node with the given name was not found.
    #[error("render node '{0}' not found")]
    NodeNotFound(String),

    /// The cascade list is empty or contains an inverted range.
    #[error("invalid cascade range {index}: near {near}, far {far}")]
    InvalidCascade { index: usize, near: f64, far: f64 },

    /// The options failed validation.
    #[error("invalid options: {0}")]
    InvalidOptions(String),

    /// An output name did not match any presentable target.
    #[error("unknown output '{0}'")]
    UnknownOutput(String),

    /// Data size mismatch.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for terrascope operations.
pub type Result<T> = std::result::Result<T, TerrascopeError>;
