// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage provider trait

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    entry::Entry,
    error::RfmResult,
    operations::ByteRange,
    VirtualPath,
};

/// Which family a provider belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Local,
    Object,
}

/// Storage provider capabilities
#[derive(Debug, Clone, Default)]
pub struct StorageCapabilities {
    /// `rename` of a folder is a single atomic call
    pub atomic_rename: bool,
    /// Folder-wide rename/copy/delete are permitted
    pub bulk_operations: bool,
    /// Creation time is reported by `stat`
    pub created_time: bool,
}

impl StorageCapabilities {
    pub fn local_filesystem() -> Self {
        Self {
            atomic_rename: true,
            bulk_operations: true,
            created_time: true,
        }
    }

    pub fn object_store(allow_bulk: bool) -> Self {
        Self {
            atomic_rename: false,
            bulk_operations: allow_bulk,
            created_time: false,
        }
    }
}

/// The operation set every backend implements.
///
/// Paths are always normalized `VirtualPath`s relative to the provider root;
/// the folder flag of a path tells the provider which form to address.
/// Every call either succeeds or returns a typed `RfmError`.
#[async_trait]
pub trait StorageProvider: Send + Sync {
    fn id(&self) -> &str;
    fn kind(&self) -> ProviderKind;
    fn capabilities(&self) -> &StorageCapabilities;

    /// Backend-rooted location of `path` (filesystem path or bucket key)
    fn absolute_path(&self, path: &VirtualPath) -> String;

    /// `Ok(None)` when nothing exists at `path`
    async fn stat(&self, path: &VirtualPath) -> RfmResult<Option<Entry>>;
    /// Immediate children of a folder
    async fn list(&self, folder: &VirtualPath) -> RfmResult<Vec<Entry>>;
    async fn make_dir(&self, path: &VirtualPath) -> RfmResult<()>;
    async fn read_file(&self, path: &VirtualPath, range: Option<(u64, u64)>) -> RfmResult<Bytes>;
    async fn write_file(&self, path: &VirtualPath, data: Bytes) -> RfmResult<()>;
    async fn remove_file(&self, path: &VirtualPath) -> RfmResult<()>;
    async fn remove_tree(&self, path: &VirtualPath) -> RfmResult<()>;
    async fn rename(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()>;
    async fn copy_tree(&self, from: &VirtualPath, to: &VirtualPath) -> RfmResult<()>;
    /// Size of a file, or total size of every file below a folder
    async fn size_of(&self, path: &VirtualPath) -> RfmResult<u64>;

    async fn exists(&self, path: &VirtualPath) -> RfmResult<bool> {
        Ok(self.stat(path).await?.is_some())
    }

    /// Read a file honouring an optional client range.
    /// Returns the bytes, the served inclusive range and the total size.
    async fn read_range(
        &self,
        path: &VirtualPath,
        range: Option<ByteRange>,
    ) -> RfmResult<(Bytes, Option<(u64, u64)>, u64)> {
        let total = self.size_of(path).await?;
        match range {
            None => Ok((self.read_file(path, None).await?, None, total)),
            Some(range) => {
                let (start, end) = range.resolve(total).ok_or_else(|| {
                    crate::RfmError::RangeNotSatisfiable {
                        path: path.to_string(),
                        size: total,
                    }
                })?;
                let data = self.read_file(path, Some((start, end))).await?;
                Ok((data, Some((start, end)), total))
            }
        }
    }
}
