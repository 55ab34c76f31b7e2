//! Image resolution.
//!
//! Pulling images from registries and materializing layers on disk is the
//! job of an external service; the runtime only needs the contract below:
//! turn an image reference into a prepared rootfs path. The bundled
//! [`DirImageStore`] satisfies the contract with plain per-image
//! directories under the runtime home.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::{NanoboxError, NanoboxResult};

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Interface to the service that resolves image references to rootfs paths.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Resolve an image reference (e.g. `alpine:3.19`) to a prepared
    /// rootfs directory on the host.
    async fn resolve(&self, image: &str) -> NanoboxResult<PathBuf>;
}

/// Directory-backed image store.
///
/// Maps every image reference to its own directory under `images_dir`,
/// creating the directory on first use. What ends up inside the directory
/// (unpacked layers, a pre-seeded rootfs) is the image service's concern.
#[derive(Debug, Clone)]
pub struct DirImageStore {
    images_dir: PathBuf,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl DirImageStore {
    /// Create a store rooted at the given directory.
    pub fn new(images_dir: impl Into<PathBuf>) -> Self {
        Self {
            images_dir: images_dir.into(),
        }
    }

    /// Turn an image reference into a filesystem-safe directory name.
    fn dir_name(image: &str) -> NanoboxResult<String> {
        let trimmed = image.trim();
        if trimmed.is_empty() {
            return Err(NanoboxError::Image(
                "image reference must not be empty".to_string(),
            ));
        }
        Ok(trimmed
            .chars()
            .map(|c| match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_' => c,
                _ => '_',
            })
            .collect())
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

#[async_trait]
impl ImageStore for DirImageStore {
    async fn resolve(&self, image: &str) -> NanoboxResult<PathBuf> {
        let dir = self.images_dir.join(Self::dir_name(image)?);
        tokio::fs::create_dir_all(&dir).await.map_err(|e| {
            NanoboxError::Storage(format!(
                "failed to prepare rootfs at {}: {}",
                dir.display(),
                e
            ))
        })?;
        Ok(dir)
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_resolve_creates_rootfs_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(tmp.path());

        let rootfs = store.resolve("alpine:3.19").await.unwrap();
        assert!(rootfs.is_dir());
        assert!(rootfs.starts_with(tmp.path()));
    }

    #[tokio::test]
    async fn test_resolve_is_stable_per_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(tmp.path());

        let first = store.resolve("alpine:3.19").await.unwrap();
        let again = store.resolve("alpine:3.19").await.unwrap();
        let other = store.resolve("debian:12").await.unwrap();
        assert_eq!(first, again);
        assert_ne!(first, other);
    }

    #[tokio::test]
    async fn test_resolve_rejects_empty_reference() {
        let tmp = tempfile::tempdir().unwrap();
        let store = DirImageStore::new(tmp.path());

        assert!(matches!(
            store.resolve("  ").await,
            Err(NanoboxError::Image(_))
        ));
    }

    #[test]
    fn test_dir_name_sanitizes_separators() {
        let name = DirImageStore::dir_name("ghcr.io/acme/tool:1.0").unwrap();
        assert!(!name.contains('/'));
        assert!(!name.contains(':'));
    }
}
