// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recursive operation engine
//!
//! Runs one user-level rename/move/copy/delete/extract/download against the
//! content provider and pairs it with the matching shadow-tree mirroring.
//! Folder-wide work is delegated to the provider, which recurses natively on
//! local disk and enumerates keys on the object store.

use bytes::Bytes;
use rfm_core::{
    Access, Item, Resolver, RfmError, RfmResult, SecurityPolicy, StorageProvider,
    VirtualPath,
};
use std::collections::HashSet;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;

use crate::thumbnail::ShadowTree;

pub struct Engine {
    provider: Arc<dyn StorageProvider>,
    shadow: Arc<ShadowTree>,
    resolver: Resolver,
}

/// One archive member, path relative to the extraction target
struct ArchiveEntry {
    path: VirtualPath,
    data: Option<Vec<u8>>,
}

impl Engine {
    pub fn new(provider: Arc<dyn StorageProvider>, shadow: Arc<ShadowTree>) -> Self {
        let resolver = Resolver::new(provider.clone());
        Self { provider, shadow, resolver }
    }

    /// The storage root is never renamed, moved or deleted.
    pub fn guard_root(&self, item: &Item) -> RfmResult<()> {
        if item.is_root() {
            return Err(RfmError::RootFolderProtected);
        }
        Ok(())
    }

    /// Folder-wide operations need the provider's bulk permission.
    pub fn guard_bulk(&self, item: &Item) -> RfmResult<()> {
        if item.is_folder() && !self.provider.capabilities().bulk_operations {
            return Err(RfmError::ForbiddenBulkOperation { path: item.relative_path() });
        }
        Ok(())
    }

    /// A folder cannot land inside itself.
    pub fn guard_destination(&self, source: &Item, destination: &VirtualPath) -> RfmResult<()> {
        if source.is_folder() && destination.starts_with(&source.path) {
            return Err(RfmError::InvalidDestination {
                path: source.relative_path(),
                target: destination.to_path_string(),
            });
        }
        Ok(())
    }

    /// Rename or move `source` to `destination`.
    pub async fn relocate(&self, source: &Item, destination: &VirtualPath) -> RfmResult<()> {
        self.guard_root(source)?;
        self.guard_bulk(source)?;
        self.guard_destination(source, destination)?;

        self.provider.rename(&source.path, destination).await?;
        tracing::info!(
            from = %source.absolute_path,
            to = %self.provider.absolute_path(destination),
            "moved"
        );
        self.shadow.relocate(&source.path, destination).await;
        Ok(())
    }

    pub async fn duplicate(&self, source: &Item, destination: &VirtualPath) -> RfmResult<()> {
        self.guard_bulk(source)?;
        self.guard_destination(source, destination)?;

        self.provider.copy_tree(&source.path, destination).await?;
        tracing::info!(
            from = %source.absolute_path,
            to = %self.provider.absolute_path(destination),
            "copied"
        );
        self.shadow.duplicate(&source.path, destination).await;
        Ok(())
    }

    pub async fn remove(&self, item: &Item) -> RfmResult<()> {
        self.guard_root(item)?;
        self.guard_bulk(item)?;

        if item.is_folder() {
            self.provider.remove_tree(&item.path).await?;
        } else {
            self.provider.remove_file(&item.path).await?;
        }
        tracing::info!(path = %item.absolute_path, "deleted");
        self.shadow.remove(&item.path).await;
        Ok(())
    }

    /// Unpack a ZIP archive into `target`.
    ///
    /// Entries the policy refuses, or that fail to write, are skipped. Returns
    /// the top-level items that were created or updated.
    pub async fn extract(
        &self,
        archive: &Item,
        target: &Item,
        policy: &SecurityPolicy,
    ) -> RfmResult<Vec<Item>> {
        let data = self.provider.read_file(&archive.path, None).await?;
        let entries = read_archive(&archive.relative_path(), data)?;

        let mut top_level: Vec<VirtualPath> = Vec::new();
        let mut seen = HashSet::new();
        let mut record = |relative: &VirtualPath| {
            let top = if relative.segments.len() == 1 {
                target.path.join(relative.to_key_suffix())
            } else {
                target.path.child_folder(&relative.segments[0])
            };
            if seen.insert(top.clone()) {
                top_level.push(top);
            }
        };

        // folders first, so empty ones survive and files find their parents
        for entry in entries.iter().filter(|e| e.data.is_none()) {
            let path = target.path.join(entry.path.to_key_suffix());
            let item = self.resolver.resolve_path(&path).await?;
            if let Err(e) = policy.authorize(&item, Access::Write) {
                tracing::warn!(entry = %entry.path, error = %e, "skipping archive folder");
                continue;
            }
            match self.ensure_folder(&path).await {
                Ok(()) => record(&entry.path),
                Err(e) => tracing::warn!(entry = %entry.path, error = %e, "could not create folder"),
            }
        }

        for entry in &entries {
            let Some(data) = &entry.data else {
                continue;
            };
            let path = target.path.join(entry.path.to_key_suffix());
            let item = self.resolver.resolve_path(&path).await?;
            if item.is_folder() {
                tracing::warn!(entry = %entry.path, "archive file collides with a folder");
                continue;
            }
            if let Err(e) = policy.authorize(&item, Access::Write) {
                tracing::warn!(entry = %entry.path, error = %e, "skipping archive file");
                continue;
            }
            let written = match path.parent() {
                Some(parent) => self.ensure_folder(&parent).await,
                None => Ok(()),
            };
            let written = match written {
                Ok(()) => self.provider.write_file(&path, Bytes::from(data.clone())).await,
                Err(e) => Err(e),
            };
            match written {
                Ok(()) => {
                    if item.exists {
                        self.shadow.remove(&path).await;
                    }
                    record(&entry.path);
                }
                Err(e) => tracing::warn!(entry = %entry.path, error = %e, "could not extract file"),
            }
        }

        tracing::info!(
            archive = %archive.absolute_path,
            target = %target.absolute_path,
            count = top_level.len(),
            "extracted archive"
        );

        let mut items = Vec::with_capacity(top_level.len());
        for path in &top_level {
            let item = self.resolver.resolve_path(path).await?;
            if item.exists {
                items.push(item);
            }
        }
        Ok(items)
    }

    /// Pack a folder into an in-memory ZIP archive named after the folder.
    ///
    /// Entries the policy hides from reading are left out.
    pub async fn zip_folder(&self, folder: &Item, policy: &SecurityPolicy) -> RfmResult<Bytes> {
        self.guard_bulk(folder)?;
        let base = folder.path.parent().unwrap_or_else(VirtualPath::root);

        let mut members: Vec<(String, Option<Bytes>)> = Vec::new();
        members.push((archive_name(&folder.path, &base), None));

        let mut pending = vec![folder.path.clone()];
        while let Some(current) = pending.pop() {
            for entry in self.provider.list(&current).await? {
                let item = self.resolver.item_from_entry(entry);
                if policy.authorize(&item, Access::Read).is_err() {
                    tracing::debug!(path = %item.path, "left out of archive");
                    continue;
                }
                let name = archive_name(&item.path, &base);
                if item.is_folder() {
                    members.push((name, None));
                    pending.push(item.path);
                } else {
                    let data = self.provider.read_file(&item.path, None).await?;
                    members.push((name, Some(data)));
                }
            }
        }

        let archive = write_archive(&folder.relative_path(), members)?;
        tracing::info!(path = %folder.absolute_path, size = archive.len(), "packed folder");
        Ok(archive)
    }

    /// Create `folder` and any missing ancestors.
    async fn ensure_folder(&self, folder: &VirtualPath) -> RfmResult<()> {
        let mut missing = Vec::new();
        let mut current = Some(folder.clone());
        while let Some(path) = current {
            if path.is_root() || self.provider.exists(&path).await? {
                break;
            }
            current = path.parent();
            missing.push(path);
        }
        for path in missing.into_iter().rev() {
            self.provider.make_dir(&path).await?;
        }
        Ok(())
    }
}

fn archive_name(path: &VirtualPath, base: &VirtualPath) -> String {
    path.rebase(base, &VirtualPath::root())
        .map(|p| p.to_key_suffix())
        .unwrap_or_else(|| path.to_key_suffix())
}

fn archive_error(path: &str, err: impl ToString) -> RfmError {
    RfmError::Archive {
        path: path.to_string(),
        message: err.to_string(),
    }
}

/// Decode every member up front; entry names are normalized like client paths.
fn read_archive(path: &str, data: Bytes) -> RfmResult<Vec<ArchiveEntry>> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data)).map_err(|e| archive_error(path, e))?;
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut member = archive.by_index(index).map_err(|e| archive_error(path, e))?;
        let relative = VirtualPath::new(member.name());
        if relative.is_root() {
            continue;
        }
        if member.is_dir() {
            entries.push(ArchiveEntry { path: relative.into_folder(), data: None });
        } else {
            let mut buffer = Vec::new();
            member
                .read_to_end(&mut buffer)
                .map_err(|e| archive_error(path, e))?;
            entries.push(ArchiveEntry { path: relative.into_file(), data: Some(buffer) });
        }
    }
    Ok(entries)
}

fn write_archive(path: &str, members: Vec<(String, Option<Bytes>)>) -> RfmResult<Bytes> {
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));

    for (name, data) in members {
        match data {
            None => writer
                .add_directory(name, options)
                .map_err(|e| archive_error(path, e))?,
            Some(data) => {
                writer
                    .start_file(name, options)
                    .map_err(|e| archive_error(path, e))?;
                writer.write_all(&data).map_err(|e| archive_error(path, e))?;
            }
        }
    }

    let cursor = writer.finish().map_err(|e| archive_error(path, e))?;
    Ok(Bytes::from(cursor.into_inner()))
}
