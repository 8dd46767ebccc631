// SPDX-License-Identifier: AGPL-3.0-or-later
//! Object-store backend
//!
//! Emulates folders over a flat key space. A folder is either a marker key
//! ending in `/` or implied by deeper keys sharing its prefix. Folder-wide
//! operations enumerate the prefix and apply one call per key, in key order,
//! stopping at the first failure.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rfm_core::{
    backend::{ProviderKind, StorageCapabilities, StorageProvider},
    entry::Entry,
    error::{RfmError, RfmResult},
    metadata::Metadata,
    VirtualPath,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One stored object as reported by the store
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
}

/// Minimal client surface of an S3-compatible store.
///
/// Errors name the failing key in their `path` field.
#[async_trait]
pub trait ObjectClient: Send + Sync {
    fn bucket(&self) -> &str;
    /// Every object whose key starts with `prefix`, in lexicographic key order
    async fn list(&self, prefix: &str) -> RfmResult<Vec<ObjectInfo>>;
    async fn head(&self, key: &str) -> RfmResult<Option<ObjectInfo>>;
    /// `range` is inclusive
    async fn get(&self, key: &str, range: Option<(u64, u64)>) -> RfmResult<Bytes>;
    async fn put(&self, key: &str, data: Bytes) -> RfmResult<()>;
    async fn copy(&self, src: &str, dst: &str) -> RfmResult<()>;
    async fn delete(&self, key: &str) -> RfmResult<()>;
}

/// Object-store storage provider
pub struct ObjectStoreBackend {
    id: String,
    client: Arc<dyn ObjectClient>,
    /// Root prefix, empty or ending in `/`
    prefix: String,
    capabilities: StorageCapabilities,
}

impl ObjectStoreBackend {
    pub fn new(
        id: impl Into<String>,
        client: Arc<dyn ObjectClient>,
        prefix: &str,
        allow_bulk: bool,
    ) -> Self {
        let trimmed = prefix.trim_matches('/');
        let prefix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        };
        Self {
            id: id.into(),
            client,
            prefix,
            capabilities: StorageCapabilities::object_store(allow_bulk),
        }
    }

    pub fn client(&self) -> &Arc<dyn ObjectClient> {
        &self.client
    }

    fn to_key(&self, path: &VirtualPath) -> String {
        format!("{}{}", self.prefix, path.to_key_suffix())
    }

    fn to_relative(&self, key: &str) -> String {
        format!("/{}", key.strip_prefix(&self.prefix).unwrap_or(key))
    }

    /// Rewrite key-based error paths into relative paths.
    fn localize(&self, err: RfmError) -> RfmError {
        match err {
            RfmError::PathNotFound { path } => RfmError::PathNotFound {
                path: self.to_relative(&path),
            },
            RfmError::BackendOperationFailed { operation, path, message } => {
                RfmError::BackendOperationFailed {
                    operation,
                    path: self.to_relative(&path),
                    message,
                }
            }
            other => other,
        }
    }

    fn require_bulk(&self, path: &VirtualPath) -> RfmResult<()> {
        if self.capabilities.bulk_operations {
            Ok(())
        } else {
            Err(RfmError::ForbiddenBulkOperation { path: path.to_string() })
        }
    }

    fn metadata_of(info: &ObjectInfo) -> Metadata {
        Metadata {
            size: Some(info.size),
            created: None,
            modified: info.last_modified,
            etag: info.etag.clone(),
            access: None,
        }
    }

    async fn list_keys(&self, prefix: &str) -> RfmResult<Vec<ObjectInfo>> {
        self.client.list(prefix).await.map_err(|e| self.localize(e))
    }

    async fn ensure_absent(&self, path: &VirtualPath) -> RfmResult<()> {
        let taken = if path.is_folder() {
            !self.list_keys(&self.to_key(path)).await?.is_empty()
        } else {
            self.client
                .head(&self.to_key(path))
                .await
                .map_err(|e| self.localize(e))?
                .is_some()
        };
        if taken {
            return Err(RfmError::already_exists(path, path.name().unwrap_or_default()));
        }
        Ok(())
    }
}

#[async_trait]
impl StorageProvider for ObjectStoreBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Object
    }

    fn capabilities(&self) -> &StorageCapabilities {
        &self.capabilities
    }

    fn absolute_path(&self, path: &VirtualPath) -> String {
        format!("{}/{}", self.client.bucket(), self.to_key(path))
    }

    async fn stat(&self, path: &VirtualPath) -> RfmResult<Option<Entry>> {
        if path.is_root() {
            return Ok(Some(Entry::folder(path.clone(), Metadata::new())));
        }

        let key = self.to_key(path);
        if !path.is_folder() {
            let head = self.client.head(&key).await.map_err(|e| self.localize(e))?;
            return Ok(head.map(|info| Entry::file(path.clone(), Self::metadata_of(&info))));
        }

        if let Some(marker) = self.client.head(&key).await.map_err(|e| self.localize(e))? {
            let mut metadata = Self::metadata_of(&marker);
            metadata.size = None;
            return Ok(Some(Entry::folder(path.clone(), metadata)));
        }
        // No marker: the folder exists only if something lives below it.
        let implied = !self.list_keys(&key).await?.is_empty();
        Ok(implied.then(|| Entry::folder(path.clone(), Metadata::new())))
    }

    async fn list(&self, folder: &VirtualPath) -> RfmResult<Vec<Entry>> {
        let prefix = self.to_key(folder);
        let objects = self.list_keys(&prefix).await?;
        if objects.is_empty() && !folder.is_root() {
            return Err(RfmError::not_found(folder));
        }

        let mut children: BTreeMap<String, Entry> = BTreeMap::new();
        for object in &objects {
            let Some(rest) = object.key.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                None => {
                    let entry = Entry::file(folder.child_file(rest), Self::metadata_of(object));
                    children.insert(rest.to_string(), entry);
                }
                Some((name, "")) => {
                    let mut metadata = Self::metadata_of(object);
                    metadata.size = None;
                    children.insert(
                        format!("{}/", name),
                        Entry::folder(folder.child_folder(name), metadata),
                    );
                }
                Some((name, _)) => {
                    children
                        .entry(format!("{}/", name))
                        .or_insert_with(|| Entry::folder(folder.child_folder(name), Metadata::new()));
                }
            }
        }

        Ok(children.into_values().collect())
    }

    async fn make_dir(&self, path: &VirtualPath) -> RfmResult<()> {
        let key = self.to_key(&path.clone().into_folder());
        self.client
            .put(&key, Bytes::new())
            .await
            .map_err(|e| self.localize(e))?;
        tracing::info!(key = %key, "created folder marker");
        Ok(())
    }

    async fn read_file(&self, path: &VirtualPath, range: Option<(u64, u64)>) -> RfmResult<Bytes> {
        self.client
            .get(&self.to_key(path), range)
            .await
            .map_err(|e| self.localize(e))
    }

    async fn write_file(&self, path: &VirtualPath, data: Bytes) -> RfmResult<()> {
        let key = self.to_key(path);
        let size = data.len();
        self.client.put(&key, data).await.map_err(|e| self.localize(e))?;
        tracing::info!(key = %key, size, "stored object");
        Ok(())
    }

    async fn remove_file(&self, path: &VirtualPath) -> RfmResult<()> {
        let key = self.to_key(path);
        self.client.delete(&key).await.map_err(|e| self.localize(e))?;
        tracing::info!(key = %key, "deleted object");
        Ok(())
    }

    async fn remove_tree(&self, path: &VirtualPath) -> RfmResult<()> {
        self.require_bulk(path)?;
        let prefix = self.to_key(path);
        let objects = self.list_keys(&prefix).await?;
        for object in &objects {
            tracing::debug!(key = %object.key, "deleting");
            self.client
                .delete(&object.key)
                .await
                .map_err(|e| self.localize(e))?;
        }
        tracing::info!(prefix = %prefix, count = objects.len(), "deleted folder");
        Ok(())
    }

    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()> {
        self.ensure_absent(to).await?;
        let src = self.to_key(from);
        let dst = self.to_key(to);

        if !from.is_folder() {
            self.client.copy(&src, &dst).await.map_err(|e| self.localize(e))?;
            self.client.delete(&src).await.map_err(|e| self.localize(e))?;
            tracing::info!(from = %src, to = %dst, "renamed object");
            return Ok(());
        }

        self.require_bulk(from)?;
        let objects = self.list_keys(&src).await?;
        if objects.is_empty() {
            return Err(RfmError::not_found(from));
        }
        for object in &objects {
            let target = format!("{}{}", dst, &object.key[src.len()..]);
            tracing::debug!(from = %object.key, to = %target, "moving key");
            self.client
                .copy(&object.key, &target)
                .await
                .map_err(|e| self.localize(e))?;
            self.client
                .delete(&object.key)
                .await
                .map_err(|e| self.localize(e))?;
        }
        tracing::info!(from = %src, to = %dst, count = objects.len(), "renamed folder");
        Ok(())
    }

    async fn copy_tree(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()> {
        self.ensure_absent(to).await?;
        let src = self.to_key(from);
        let dst = self.to_key(to);

        if !from.is_folder() {
            self.client.copy(&src, &dst).await.map_err(|e| self.localize(e))?;
            tracing::info!(from = %src, to = %dst, "copied object");
            return Ok(());
        }

        self.require_bulk(from)?;
        let objects = self.list_keys(&src).await?;
        if objects.is_empty() {
            return Err(RfmError::not_found(from));
        }
        for object in &objects {
            let target = format!("{}{}", dst, &object.key[src.len()..]);
            tracing::debug!(from = %object.key, to = %target, "copying key");
            self.client
                .copy(&object.key, &target)
                .await
                .map_err(|e| self.localize(e))?;
        }
        tracing::info!(from = %src, to = %dst, count = objects.len(), "copied folder");
        Ok(())
    }

    async fn size_of(&self, path: &VirtualPath) -> RfmResult<u64> {
        let key = self.to_key(path);
        if path.is_folder() {
            return Ok(self.list_keys(&key).await?.iter().map(|o| o.size).sum());
        }
        match self.client.head(&key).await.map_err(|e| self.localize(e))? {
            Some(info) => Ok(info.size),
            None => Err(RfmError::not_found(path)),
        }
    }
}
