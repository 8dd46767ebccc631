// SPDX-License-Identifier: AGPL-3.0-or-later
//! File manager facade
//!
//! One entry point per client verb. Each resolves its path arguments, runs
//! the security checks, performs the storage work (through the engine for
//! anything recursive) and returns wire items or a typed error.

use bytes::Bytes;
use rfm_core::{
    normalize_name, Access, AuthorizationHook, ByteRange, Config, Item, ItemInfo, PolicySummary,
    Resolver, RfmError, RfmResult, SecurityPolicy, StorageProvider, VirtualPath, WireOptions,
};
use rfm_providers::ProviderSet;
use serde::Serialize;
use std::sync::Arc;

use crate::engine::Engine;
use crate::thumbnail::{ShadowTree, ThumbnailRenderer};

/// `{ id, type, attributes }` envelope for non-item responses
#[derive(Debug, Clone, Serialize)]
pub struct Envelope<T> {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub attributes: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct InitiateAttributes {
    pub config: SharedConfig,
}

/// Configuration the client mirrors
#[derive(Debug, Clone, Serialize)]
pub struct SharedConfig {
    pub security: PolicySummary,
    pub upload: UploadSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadSummary {
    #[serde(rename = "fileSizeLimit")]
    pub file_size_limit: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub size: u64,
    pub files: u64,
    pub folders: u64,
    #[serde(rename = "sizeLimit")]
    pub size_limit: u64,
}

/// A file ready to be sent to the client
#[derive(Debug, Clone)]
pub struct Download {
    pub name: String,
    pub data: Bytes,
}

/// Result of a ranged read
#[derive(Debug, Clone)]
pub struct FileRead {
    pub data: Bytes,
    /// Inclusive range served, `None` for the whole file
    pub range: Option<(u64, u64)>,
    pub total: u64,
}

impl FileRead {
    /// `Content-Range` header value for a partial read
    pub fn content_range(&self) -> Option<String> {
        self.range
            .map(|(start, end)| format!("bytes {}-{}/{}", start, end, self.total))
    }
}

pub struct FileManagerBuilder {
    config: Config,
    providers: ProviderSet,
    hook: Option<Arc<dyn AuthorizationHook>>,
    renderer: Option<Arc<dyn ThumbnailRenderer>>,
}

impl FileManagerBuilder {
    /// Consult `hook` for every read and write permission check.
    pub fn authorization(mut self, hook: Arc<dyn AuthorizationHook>) -> Self {
        self.hook = Some(hook);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ThumbnailRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn build(self) -> RfmResult<FileManager> {
        self.config.validate()?;
        let thumbnails = &self.config.thumbnails;
        let shadow = Arc::new(ShadowTree::new(
            self.providers.thumbnails.clone(),
            &thumbnails.dir,
            thumbnails.enabled,
        ));

        let mut policy = SecurityPolicy::from_config(&self.config.security)?;
        if self.providers.thumbnails_shared {
            policy = policy.with_hidden(shadow.dir().clone());
        }
        if let Some(hook) = self.hook {
            policy = policy.with_hook(hook);
        }

        let content = self.providers.content.clone();
        let wire = WireOptions {
            public_prefix: self.config.storage.public_prefix.clone(),
            date_format: self.config.options.date_format.clone(),
        };

        Ok(FileManager {
            resolver: Resolver::new(content.clone()),
            engine: Engine::new(content.clone(), shadow.clone()),
            content,
            shadow,
            policy,
            renderer: self.renderer,
            wire,
            config: self.config,
        })
    }
}

/// Storage core entry points
pub struct FileManager {
    config: Config,
    content: Arc<dyn StorageProvider>,
    resolver: Resolver,
    policy: SecurityPolicy,
    engine: Engine,
    shadow: Arc<ShadowTree>,
    renderer: Option<Arc<dyn ThumbnailRenderer>>,
    wire: WireOptions,
}

impl FileManager {
    pub fn builder(config: Config, providers: ProviderSet) -> FileManagerBuilder {
        FileManagerBuilder {
            config,
            providers,
            hook: None,
            renderer: None,
        }
    }

    pub fn new(config: Config, providers: ProviderSet) -> RfmResult<Self> {
        Self::builder(config, providers).build()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &SecurityPolicy {
        &self.policy
    }

    /// Resolve a client path against the content provider.
    pub async fn resolve(&self, path: &str) -> RfmResult<Item> {
        self.resolver.resolve(path).await
    }

    /// Wire representation with permissions evaluated for the item.
    pub fn info(&self, item: &Item) -> ItemInfo {
        ItemInfo::new(
            item,
            self.policy.is_readable(item),
            self.policy.is_writable(item),
            &self.wire,
        )
    }

    pub fn initiate(&self) -> Envelope<InitiateAttributes> {
        Envelope {
            id: "/".to_string(),
            kind: "initiate",
            attributes: InitiateAttributes {
                config: SharedConfig {
                    security: self.policy.summary().clone(),
                    upload: UploadSummary {
                        file_size_limit: self.config.upload.file_size_limit,
                    },
                },
            },
        }
    }

    pub async fn get_folder(&self, path: &str) -> RfmResult<Vec<ItemInfo>> {
        let folder = self.resolve(path).await?;
        tracing::info!(path = %folder.absolute_path, "opening folder");
        require_exists(&folder)?;
        self.policy.check_read(&folder)?;
        self.policy.check_restrictions(&folder)?;
        require_folder(&folder)?;

        let entries = self.content.list(&folder.path).await?;
        Ok(entries
            .into_iter()
            .map(|entry| self.resolver.item_from_entry(entry))
            .filter(|item| self.policy.is_unrestricted(item))
            .map(|item| self.info(&item))
            .collect())
    }

    pub async fn get_file(&self, path: &str) -> RfmResult<ItemInfo> {
        let item = self.readable_file(path).await?;
        tracing::info!(path = %item.absolute_path, "opening file");
        Ok(self.info(&item))
    }

    /// File info with its text content attached.
    pub async fn edit_file(&self, path: &str) -> RfmResult<ItemInfo> {
        let item = self.readable_file(path).await?;
        tracing::info!(path = %item.absolute_path, "opening file for editing");
        let data = self.content.read_file(&item.path, None).await?;
        let content = String::from_utf8_lossy(&data).into_owned();
        Ok(self.info(&item).with_content(content))
    }

    pub async fn save_file(&self, path: &str, content: &str) -> RfmResult<ItemInfo> {
        let item = self.resolve(path).await?;
        tracing::info!(path = %item.absolute_path, "saving file");
        require_exists(&item)?;
        self.policy.check_write(&item)?;
        self.policy.check_restrictions(&item)?;
        require_file(&item)?;

        self.content
            .write_file(&item.path, Bytes::copy_from_slice(content.as_bytes()))
            .await?;
        self.shadow.remove(&item.path).await;
        let saved = self.resolver.resolve_path(&item.path).await?;
        Ok(self.info(&saved))
    }

    pub async fn add_folder(&self, path: &str, name: &str) -> RfmResult<ItemInfo> {
        let parent = self.resolve(path).await?;
        require_exists(&parent)?;
        require_folder(&parent)?;
        self.policy.check_write(&parent)?;

        let name = self.clean_name(name.trim_matches('/'))?;
        let item = self.resolver.resolve_path(&parent.path.child_folder(&name)).await?;
        tracing::info!(path = %item.absolute_path, "adding folder");
        self.policy.authorize(&item, Access::Write)?;
        if item.exists {
            return Err(RfmError::already_exists(item.relative_path(), name));
        }

        self.content.make_dir(&item.path).await?;
        let created = self.resolver.resolve_path(&item.path).await?;
        Ok(self.info(&created))
    }

    /// Rename in place; `new_name` is a bare name.
    pub async fn rename(&self, old: &str, new_name: &str) -> RfmResult<ItemInfo> {
        if new_name.contains('/') || new_name.contains('\\') {
            return Err(RfmError::InvalidName { name: new_name.to_string() });
        }
        let source = self.resolve(old).await?;
        self.engine.guard_root(&source)?;
        self.engine.guard_bulk(&source)?;
        require_exists(&source)?;

        let name = self.clean_name(new_name)?;
        let parent = source.path.parent().unwrap_or_else(VirtualPath::root);
        let target = self.resolver.resolve_path(&child_like(&source, &parent, &name)).await?;
        tracing::info!(from = %source.absolute_path, to = %target.absolute_path, "renaming");

        self.policy.check_write(&source)?;
        self.policy.check_restrictions(&source)?;
        self.policy.authorize(&target, Access::Write)?;
        if target.exists {
            return Err(RfmError::already_exists(target.relative_path(), name));
        }

        self.engine.relocate(&source, &target.path).await?;
        let renamed = self.resolver.resolve_path(&target.path).await?;
        Ok(self.info(&renamed))
    }

    /// Move into another folder, keeping the name.
    pub async fn move_item(&self, old: &str, target_folder: &str) -> RfmResult<ItemInfo> {
        let source = self.resolve(old).await?;
        self.engine.guard_root(&source)?;
        self.engine.guard_bulk(&source)?;
        let (folder, target) = self.placement(&source, target_folder).await?;
        tracing::info!(from = %source.absolute_path, to = %target.absolute_path, "moving");

        self.policy.check_write(&source)?;
        self.policy.check_restrictions(&source)?;
        self.policy.check_write(&folder)?;
        self.policy.authorize(&target, Access::Write)?;
        if target.exists {
            return Err(RfmError::already_exists(target.relative_path(), source.name()));
        }

        self.engine.relocate(&source, &target.path).await?;
        let moved = self.resolver.resolve_path(&target.path).await?;
        Ok(self.info(&moved))
    }

    /// Copy into another folder, keeping the name.
    pub async fn copy(&self, source: &str, target_folder: &str) -> RfmResult<ItemInfo> {
        let source = self.resolve(source).await?;
        self.engine.guard_bulk(&source)?;
        let (folder, target) = self.placement(&source, target_folder).await?;
        tracing::info!(from = %source.absolute_path, to = %target.absolute_path, "copying");

        self.policy.check_read(&source)?;
        self.policy.check_restrictions(&source)?;
        self.policy.check_write(&folder)?;
        self.policy.authorize(&target, Access::Write)?;
        if target.exists {
            return Err(RfmError::already_exists(target.relative_path(), source.name()));
        }

        self.engine.duplicate(&source, &target.path).await?;
        let copied = self.resolver.resolve_path(&target.path).await?;
        Ok(self.info(&copied))
    }

    /// Delete a file or folder; returns the item as it was.
    pub async fn delete(&self, path: &str) -> RfmResult<ItemInfo> {
        let item = self.resolve(path).await?;
        tracing::info!(path = %item.absolute_path, "deleting");
        self.engine.guard_root(&item)?;
        self.engine.guard_bulk(&item)?;
        require_exists(&item)?;
        self.policy.check_write(&item)?;
        self.policy.check_restrictions(&item)?;

        let info = self.info(&item);
        self.engine.remove(&item).await?;
        Ok(info)
    }

    /// Store uploaded bytes as `name` inside `folder`.
    ///
    /// Without overwrite, a taken name gets a ` (n)` suffix.
    pub async fn upload(&self, folder: &str, name: &str, data: Bytes) -> RfmResult<Vec<ItemInfo>> {
        let folder = self.resolve(folder).await?;
        tracing::info!(path = %folder.absolute_path, name, size = data.len(), "uploading");
        require_exists(&folder)?;
        require_folder(&folder)?;
        self.policy.check_write(&folder)?;
        self.policy.check_restrictions(&folder)?;

        let name = self.clean_name(name)?;
        let mut item = self.resolver.resolve_path(&folder.path.child_file(&name)).await?;
        if item.is_folder() {
            return Err(RfmError::already_exists(item.relative_path(), name));
        }
        self.policy.authorize(&item, Access::Write)?;
        self.check_size(&item, data.len() as u64).await?;

        if item.exists {
            if self.config.upload.overwrite {
                self.shadow.remove(&item.path).await;
            } else {
                item = self.free_name(&folder.path, &name).await?;
                self.policy.authorize(&item, Access::Write)?;
            }
        }

        self.content.write_file(&item.path, data).await?;
        let stored = self.resolver.resolve_path(&item.path).await?;
        Ok(vec![self.info(&stored)])
    }

    /// Overwrite an existing file with new content.
    pub async fn replace(&self, path: &str, data: Bytes) -> RfmResult<Vec<ItemInfo>> {
        let item = self.resolve(path).await?;
        tracing::info!(path = %item.absolute_path, size = data.len(), "replacing file");
        require_exists(&item)?;
        require_file(&item)?;
        self.policy.check_write(&item)?;
        if let Some(parent) = self.resolver.parent(&item).await? {
            self.policy.check_write(&parent)?;
        }
        self.policy.check_restrictions(&item)?;
        self.check_size(&item, data.len() as u64).await?;

        self.content.write_file(&item.path, data).await?;
        self.shadow.remove(&item.path).await;
        let replaced = self.resolver.resolve_path(&item.path).await?;
        Ok(vec![self.info(&replaced)])
    }

    /// File bytes, or a ZIP archive for folders.
    pub async fn download(&self, path: &str) -> RfmResult<Download> {
        let item = self.resolve(path).await?;
        tracing::info!(path = %item.absolute_path, "downloading");
        require_exists(&item)?;
        self.policy.check_read(&item)?;
        self.policy.check_restrictions(&item)?;
        self.engine.guard_root(&item)?;

        if item.is_folder() {
            let data = self.engine.zip_folder(&item, &self.policy).await?;
            return Ok(Download {
                name: format!("{}.zip", item.name()),
                data,
            });
        }
        let data = self.content.read_file(&item.path, None).await?;
        Ok(Download {
            name: item.name().to_string(),
            data,
        })
    }

    /// Image bytes; with `thumbnail`, the cached or freshly rendered thumbnail.
    pub async fn get_image(&self, path: &str, thumbnail: bool) -> RfmResult<Bytes> {
        let item = self.readable_file(path).await?;
        tracing::info!(path = %item.absolute_path, thumbnail, "loading image");

        if !thumbnail || !self.shadow.is_enabled() {
            return self.content.read_file(&item.path, None).await;
        }
        if self.config.thumbnails.cache && self.shadow.exists(&item.path).await {
            return self.shadow.read(&item.path).await;
        }

        let source = self.content.read_file(&item.path, None).await?;
        let Some(renderer) = &self.renderer else {
            return Ok(source);
        };
        let rendered = renderer.render(&source, item.extension())?;
        if !self.policy.is_read_only() {
            self.shadow.store(&item.path, rendered.clone()).await;
        }
        Ok(rendered)
    }

    /// Read a file, optionally a byte range of it.
    pub async fn read_file(&self, path: &str, range: Option<ByteRange>) -> RfmResult<FileRead> {
        let item = self.readable_file(path).await?;
        tracing::info!(path = %item.absolute_path, ?range, "reading file");
        let (data, range, total) = self.content.read_range(&item.path, range).await?;
        Ok(FileRead { data, range, total })
    }

    /// Total size and counts of visible files and folders below the root.
    pub async fn summarize(&self) -> RfmResult<Envelope<Summary>> {
        let mut summary = Summary {
            size_limit: self.config.options.root_size_limit,
            ..Summary::default()
        };

        let mut pending = vec![VirtualPath::root()];
        while let Some(folder) = pending.pop() {
            for entry in self.content.list(&folder).await? {
                let item = self.resolver.item_from_entry(entry);
                if !self.policy.is_unrestricted(&item) {
                    continue;
                }
                if item.is_folder() {
                    summary.folders += 1;
                    pending.push(item.path);
                } else {
                    summary.files += 1;
                    summary.size += item.size().unwrap_or(0);
                }
            }
        }

        Ok(Envelope {
            id: "/".to_string(),
            kind: "summary",
            attributes: summary,
        })
    }

    /// Unpack a ZIP archive into `target_folder`.
    pub async fn extract(&self, source: &str, target_folder: &str) -> RfmResult<Vec<ItemInfo>> {
        let archive = self.resolve(source).await?;
        let target = self.resolve(target_folder).await?;
        tracing::info!(from = %archive.absolute_path, to = %target.absolute_path, "extracting");

        require_exists(&archive)?;
        require_exists(&target)?;
        self.policy.check_read(&archive)?;
        self.policy.check_write(&target)?;
        self.policy.check_restrictions(&archive)?;
        self.policy.check_restrictions(&target)?;
        require_file(&archive)?;
        require_folder(&target)?;

        let items = self.engine.extract(&archive, &target, &self.policy).await?;
        Ok(items.iter().map(|item| self.info(item)).collect())
    }

    async fn readable_file(&self, path: &str) -> RfmResult<Item> {
        let item = self.resolve(path).await?;
        require_exists(&item)?;
        self.policy.check_read(&item)?;
        self.policy.check_restrictions(&item)?;
        require_file(&item)?;
        Ok(item)
    }

    /// Target folder and the would-be item for moving or copying `source` into it.
    async fn placement(&self, source: &Item, target_folder: &str) -> RfmResult<(Item, Item)> {
        require_exists(source)?;
        let folder = self.resolve(target_folder).await?;
        require_exists(&folder)?;
        require_folder(&folder)?;

        let target = self
            .resolver
            .resolve_path(&child_like(source, &folder.path, source.name()))
            .await?;
        self.engine.guard_destination(source, &target.path)?;
        Ok((folder, target))
    }

    fn clean_name(&self, name: &str) -> RfmResult<String> {
        let cleaned = if self.config.security.normalize_filename {
            normalize_name(name)
        } else {
            name.trim().to_string()
        };
        if cleaned.is_empty()
            || cleaned == "."
            || cleaned == ".."
            || cleaned.contains(['/', '\\'])
        {
            return Err(RfmError::InvalidName { name: name.to_string() });
        }
        Ok(cleaned)
    }

    async fn check_size(&self, item: &Item, incoming: u64) -> RfmResult<()> {
        if let Some(limit) = self.config.upload.file_size_limit {
            if incoming > limit {
                return Err(RfmError::SizeLimitExceeded {
                    path: item.relative_path(),
                    limit,
                });
            }
        }
        let root_limit = self.config.options.root_size_limit;
        if root_limit > 0 {
            let used = self.content.size_of(&VirtualPath::root()).await?;
            let replaced = if item.exists { item.size().unwrap_or(0) } else { 0 };
            if used - replaced.min(used) + incoming > root_limit {
                return Err(RfmError::SizeLimitExceeded {
                    path: item.relative_path(),
                    limit: root_limit,
                });
            }
        }
        Ok(())
    }

    /// First `stem (n).ext` in `folder` that is not taken by a file or folder.
    async fn free_name(&self, folder: &VirtualPath, name: &str) -> RfmResult<Item> {
        let (stem, extension) = match name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
            _ => (name, String::new()),
        };
        let mut counter = 1;
        loop {
            let candidate = format!("{} ({}){}", stem, counter, extension);
            let item = self.resolver.resolve_path(&folder.child_file(&candidate)).await?;
            if !item.exists {
                return Ok(item);
            }
            counter += 1;
        }
    }
}

fn child_like(source: &Item, folder: &VirtualPath, name: &str) -> VirtualPath {
    if source.is_folder() {
        folder.child_folder(name)
    } else {
        folder.child_file(name)
    }
}

fn require_exists(item: &Item) -> RfmResult<()> {
    if item.exists {
        Ok(())
    } else {
        Err(RfmError::not_found(item.relative_path()))
    }
}

fn require_folder(item: &Item) -> RfmResult<()> {
    if item.is_folder() {
        Ok(())
    } else {
        Err(RfmError::NotAFolder { path: item.relative_path() })
    }
}

fn require_file(item: &Item) -> RfmResult<()> {
    if item.is_file() {
        Ok(())
    } else {
        Err(RfmError::FolderNotAllowed { path: item.relative_path() })
    }
}
