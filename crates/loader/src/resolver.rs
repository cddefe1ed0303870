//! Resource resolution seam.
//!
//! The loader never touches the filesystem directly; it asks a
//! [`ResourceResolver`] for the raw bytes behind a key. Production code uses
//! [`FsResolver`]; tests substitute in-memory resolvers.

use crate::error::LoadError;
use lightbox_cache::ImageKey;
use std::io;

/// Supplies the raw bytes behind a resource identifier.
///
/// The contract has exactly two failure outcomes: the resource does not
/// exist, or it exists but may not be read.
pub trait ResourceResolver: Send + Sync {
    fn resolve(&self, key: &ImageKey) -> Result<Vec<u8>, LoadError>;
}

/// Default resolver reading straight from the filesystem.
#[derive(Debug, Default)]
pub struct FsResolver;

impl ResourceResolver for FsResolver {
    fn resolve(&self, key: &ImageKey) -> Result<Vec<u8>, LoadError> {
        std::fs::read(key.path()).map_err(|err| match err.kind() {
            io::ErrorKind::PermissionDenied => {
                LoadError::PermissionDenied(key.path().to_path_buf())
            }
            // Anything else (NotFound, stale handles, odd platform errors)
            // folds into the not-found outcome.
            _ => LoadError::FileNotFound(key.path().to_path_buf()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_file_not_found() {
        let key = ImageKey::for_path("/definitely/not/here.png");
        let err = FsResolver.resolve(&key).unwrap_err();
        assert!(matches!(err, LoadError::FileNotFound(_)));
    }

    #[test]
    fn test_reads_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.bin");
        std::fs::write(&path, b"pixel soup").unwrap();

        let key = ImageKey::for_path(&path);
        let bytes = FsResolver.resolve(&key).unwrap();
        assert_eq!(bytes, b"pixel soup");
    }
}
