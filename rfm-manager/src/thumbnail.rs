// SPDX-License-Identifier: AGPL-3.0-or-later
//! Thumbnail shadow tree
//!
//! Thumbnails live under a configured folder of the thumbnail provider, at
//! the same relative path as their source. Mirroring runs after the content
//! mutation has succeeded and never fails it: problems are logged and the
//! stale thumbnail is dropped where possible.

use bytes::Bytes;
use rfm_core::{RfmResult, StorageProvider, VirtualPath};
use std::sync::Arc;

/// Produces a thumbnail image from source image bytes
pub trait ThumbnailRenderer: Send + Sync {
    fn render(&self, source: &[u8], extension: &str) -> RfmResult<Bytes>;
}

impl<F> ThumbnailRenderer for F
where
    F: Fn(&[u8], &str) -> RfmResult<Bytes> + Send + Sync,
{
    fn render(&self, source: &[u8], extension: &str) -> RfmResult<Bytes> {
        self(source, extension)
    }
}

pub struct ShadowTree {
    provider: Arc<dyn StorageProvider>,
    dir: VirtualPath,
    enabled: bool,
}

impl ShadowTree {
    pub fn new(provider: Arc<dyn StorageProvider>, dir: &str, enabled: bool) -> Self {
        Self {
            provider,
            dir: VirtualPath::new(dir).into_folder(),
            enabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    /// Thumbnail root folder
    pub fn dir(&self) -> &VirtualPath {
        &self.dir
    }

    /// Where the thumbnail of `source` belongs, whether or not it exists.
    pub fn thumbnail_of(&self, source: &VirtualPath) -> VirtualPath {
        let mut segments = self.dir.segments.clone();
        segments.extend(source.segments.iter().cloned());
        VirtualPath {
            segments,
            folder: source.is_folder(),
        }
    }

    pub async fn exists(&self, source: &VirtualPath) -> bool {
        if !self.enabled {
            return false;
        }
        let thumb = self.thumbnail_of(source);
        match self.provider.exists(&thumb).await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(thumbnail = %thumb, error = %e, "thumbnail stat failed");
                false
            }
        }
    }

    pub async fn read(&self, source: &VirtualPath) -> RfmResult<Bytes> {
        self.provider.read_file(&self.thumbnail_of(source), None).await
    }

    /// Store a freshly rendered thumbnail. Providers create missing parents on write.
    pub async fn store(&self, source: &VirtualPath, data: Bytes) {
        let thumb = self.thumbnail_of(source);
        if let Err(e) = self.provider.write_file(&thumb, data).await {
            tracing::warn!(thumbnail = %thumb, error = %e, "could not store thumbnail");
        }
    }

    /// Mirror a rename or move of `from` to `to`.
    pub async fn relocate(&self, from: &VirtualPath, to: &VirtualPath) {
        if !self.exists(from).await {
            return;
        }
        let old = self.thumbnail_of(from);
        let new = self.thumbnail_of(to);

        if self.parent_exists(&new).await {
            match self.provider.rename(&old, &new).await {
                Ok(()) => {
                    tracing::debug!(from = %old, to = %new, "moved thumbnail");
                    return;
                }
                Err(e) => {
                    tracing::warn!(from = %old, to = %new, error = %e, "could not move thumbnail");
                }
            }
        }
        self.discard(&old).await;
    }

    /// Mirror a copy of `from` to `to`. The source thumbnail is left alone.
    pub async fn duplicate(&self, from: &VirtualPath, to: &VirtualPath) {
        if !self.exists(from).await {
            return;
        }
        let old = self.thumbnail_of(from);
        let new = self.thumbnail_of(to);
        if !self.parent_exists(&new).await {
            return;
        }
        match self.provider.copy_tree(&old, &new).await {
            Ok(()) => tracing::debug!(from = %old, to = %new, "copied thumbnail"),
            Err(e) => {
                tracing::warn!(from = %old, to = %new, error = %e, "could not copy thumbnail")
            }
        }
    }

    /// Drop the thumbnail of a deleted or overwritten source.
    pub async fn remove(&self, source: &VirtualPath) {
        if self.exists(source).await {
            self.discard(&self.thumbnail_of(source)).await;
        }
    }

    async fn discard(&self, thumb: &VirtualPath) {
        let result = if thumb.is_folder() {
            self.provider.remove_tree(thumb).await
        } else {
            self.provider.remove_file(thumb).await
        };
        match result {
            Ok(()) => tracing::debug!(thumbnail = %thumb, "deleted thumbnail"),
            Err(e) => tracing::warn!(thumbnail = %thumb, error = %e, "could not delete thumbnail"),
        }
    }

    async fn parent_exists(&self, thumb: &VirtualPath) -> bool {
        match thumb.parent() {
            Some(parent) => self.provider.exists(&parent).await.unwrap_or(false),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfm_providers::{LocalBackend, MemoryObjectClient, ObjectStoreBackend};
    use tempfile::TempDir;

    fn local() -> (TempDir, Arc<dyn StorageProvider>) {
        let dir = TempDir::new().unwrap();
        let provider: Arc<dyn StorageProvider> = Arc::new(LocalBackend::new("local", dir.path()));
        (dir, provider)
    }

    #[test]
    fn test_thumbnail_path_mirrors_source() {
        let (_dir, provider) = local();
        let tree = ShadowTree::new(provider, "_thumbs", true);
        assert_eq!(
            tree.thumbnail_of(&VirtualPath::new("/docs/a.png")).to_path_string(),
            "/_thumbs/docs/a.png"
        );
        assert_eq!(
            tree.thumbnail_of(&VirtualPath::new("/docs/")).to_path_string(),
            "/_thumbs/docs/"
        );
    }

    #[tokio::test]
    async fn test_relocate_without_destination_parent_discards() {
        let (_dir, provider) = local();
        let tree = ShadowTree::new(provider.clone(), "_thumbs", true);
        tree.store(&VirtualPath::new("/a/pic.png"), Bytes::from_static(b"t")).await;
        assert!(tree.exists(&VirtualPath::new("/a/pic.png")).await);

        tree.relocate(&VirtualPath::new("/a/pic.png"), &VirtualPath::new("/b/pic.png"))
            .await;
        assert!(!tree.exists(&VirtualPath::new("/a/pic.png")).await);
        assert!(!tree.exists(&VirtualPath::new("/b/pic.png")).await);
    }

    #[tokio::test]
    async fn test_relocate_with_destination_parent_moves() {
        let (_dir, provider) = local();
        let tree = ShadowTree::new(provider.clone(), "_thumbs", true);
        tree.store(&VirtualPath::new("/a/pic.png"), Bytes::from_static(b"t")).await;
        tree.store(&VirtualPath::new("/b/other.png"), Bytes::from_static(b"o")).await;

        tree.relocate(&VirtualPath::new("/a/pic.png"), &VirtualPath::new("/b/pic.png"))
            .await;
        assert!(!tree.exists(&VirtualPath::new("/a/pic.png")).await);
        assert_eq!(&tree.read(&VirtualPath::new("/b/pic.png")).await.unwrap()[..], b"t");
    }

    #[tokio::test]
    async fn test_duplicate_is_existence_gated() {
        let client = Arc::new(MemoryObjectClient::new("b"));
        let provider: Arc<dyn StorageProvider> =
            Arc::new(ObjectStoreBackend::new("object", client.clone(), "", false));
        let tree = ShadowTree::new(provider, "_thumbs", true);
        tree.store(&VirtualPath::new("/a/pic.png"), Bytes::from_static(b"t")).await;

        tree.duplicate(&VirtualPath::new("/a/pic.png"), &VirtualPath::new("/c/pic.png"))
            .await;
        assert_eq!(client.keys(), vec!["_thumbs/a/pic.png"]);

        tree.duplicate(&VirtualPath::new("/a/pic.png"), &VirtualPath::new("/a/copy.png"))
            .await;
        assert_eq!(client.keys(), vec!["_thumbs/a/copy.png", "_thumbs/a/pic.png"]);
    }

    #[tokio::test]
    async fn test_disabled_tree_does_nothing() {
        let (_dir, provider) = local();
        let tree = ShadowTree::new(provider.clone(), "_thumbs", false);
        provider
            .write_file(&VirtualPath::new("/_thumbs/a.png"), Bytes::from_static(b"t"))
            .await
            .unwrap();
        tree.remove(&VirtualPath::new("/a.png")).await;
        assert!(provider.exists(&VirtualPath::new("/_thumbs/a.png")).await.unwrap());
    }
}
