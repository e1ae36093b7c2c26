//! Error types for the slicing pipeline.

use thiserror::Error;

/// Failures that abort a slice. Per-layer and per-line anomalies
/// (empty layers, unreadable G-code lines, missing metrics) are recovered
/// where they happen and never show up here.
#[derive(Debug, Error)]
pub enum SliceError {
    /// The input held no usable triangles.
    #[error("No valid mesh to slice")]
    EmptyGeometry,

    /// A flat vertex buffer whose length is not a whole number of triangles.
    #[error("Vertex buffer length {0} is not a multiple of 9")]
    MalformedBuffer(usize),

    /// Settings failed validation.
    #[error("Invalid slicer settings: {0}")]
    InvalidSettings(String),

    /// Settings JSON could not be decoded.
    #[error("Invalid settings JSON: {0}")]
    Config(#[from] serde_json::Error),

    /// STL input could not be decoded.
    #[error("Invalid STL: {0}")]
    Stl(String),

    /// The progress observer asked to stop between layers.
    #[error("Slicing cancelled")]
    Cancelled,

    /// Export was requested before anything was sliced.
    #[error("Nothing has been sliced yet")]
    NotSliced,

    /// The background slicing session is gone.
    #[error("Slicing session closed")]
    SessionClosed,

    /// The background slicing thread could not be started.
    #[error("Failed to start slicing session: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result type for slicing operations.
pub type Result<T> = std::result::Result<T, SliceError>;
