// Unified Error Handling Module
//
// Centralized error types for the optimization engine. Most failures are
// non-fatal by design: the frame loop prefers drawing too much over not
// drawing at all, so only configuration mistakes surface as hard errors.

use std::io;
use thiserror::Error;

/// Main engine error type
#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Compositor error: {0}")]
    Compositor(#[from] CompositorError),

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Layer compositor errors
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("Layer '{0}' already exists")]
    DuplicateLayer(String),

    #[error("Layer limit of {0} reached")]
    LayerLimitReached(usize),

    #[error("Unknown layer '{0}'")]
    UnknownLayer(String),

    #[error("Surface allocation failed ({width}x{height})")]
    SurfaceAllocation { width: u32, height: u32 },
}
