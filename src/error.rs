use thiserror::Error;

/// Every failure the crate can report. The matching algorithm itself is total;
/// these come from configuration, buffers handed in from outside, the image
/// adapter, or the background execution layer.
#[derive(Debug, Error)]
pub enum MorphError {
    #[error("bucket resolution must be at least 1 (got {0})")]
    InvalidResolution(usize),
    #[error("sampling grid size must be at least 1 (got {0})")]
    InvalidGridSize(u32),
    #[error("max search radius {radius} is outside 0..{resolution}")]
    InvalidSearchRadius { radius: usize, resolution: usize },
    #[error("expected {expected} RGBA bytes, got {actual}")]
    BufferLength { expected: usize, actual: usize },
    #[error("expected {expected} {what}, got {actual}")]
    CountMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error(transparent)]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
    #[error("matching run was cancelled after {processed} targets")]
    Cancelled { processed: usize },
    #[error("background worker failed: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, MorphError>;
