//! Error taxonomy for grouping and compositing

use std::path::PathBuf;

/// Result type for core operations
pub type Result<T> = std::result::Result<T, StitchError>;

#[derive(thiserror::Error, Debug)]
pub enum StitchError {
    #[error("invalid group size: {0} (expected 2-6)")]
    InvalidGroupSize(usize),
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("failed to encode composite {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("image {0} has zero width or height")]
    EmptyImage(PathBuf),
    #[error("composite canvas too large ({width}x{height})")]
    CanvasTooLarge { width: u64, height: u64 },
    #[error("there was an i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StitchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
