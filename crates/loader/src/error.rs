//! Error taxonomy for image load requests.
//!
//! Only the loader produces errors; the cache and the memory budget are
//! infallible by design. Each identifier-level request yields at most one
//! error and is never retried automatically.

use lightbox_cache::DecodedImage;
use std::path::PathBuf;

/// Failure of a single load request.
///
/// `Clone` because one decode fans out to every subscriber attached to the
/// same pending request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("corrupted image: {0}")]
    CorruptedImage(PathBuf),
    #[error("insufficient memory to load image ({requested} bytes requested)")]
    InsufficientMemory { requested: u64 },
    #[error("load cancelled")]
    Cancelled,
}

/// Outcome of a load request.
pub type LoadResult = Result<DecodedImage, LoadError>;
