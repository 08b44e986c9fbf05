//! Error types for fbcompositor

use thiserror::Error;

/// Result type alias for fbcompositor operations
pub type Result<T> = std::result::Result<T, Error>;

/// fbcompositor error type
#[derive(Error, Debug)]
pub enum Error {
    // Surface errors
    #[error("Failed to open display surface: {0}")]
    SurfaceOpen(String),

    #[error("Failed to query surface geometry: {0}")]
    SurfaceGeometry(String),

    #[error("Failed to map surface memory: {0}")]
    SurfaceMap(String),

    #[error("Surface backend not available: {0}")]
    BackendUnavailable(String),

    // Format errors
    #[error("Degenerate source format {width}x{height}")]
    DegenerateFormat { width: u32, height: u32 },

    // Pipeline errors
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Pipeline not running")]
    PipelineNotRunning,

    // General errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::DegenerateFormat { .. } | Error::Pipeline(_))
    }

    /// Check if this is a display device issue
    pub fn is_device_issue(&self) -> bool {
        matches!(
            self,
            Error::SurfaceOpen(_)
                | Error::SurfaceGeometry(_)
                | Error::SurfaceMap(_)
                | Error::BackendUnavailable(_)
        )
    }
}
