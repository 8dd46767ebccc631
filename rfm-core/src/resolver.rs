// SPDX-License-Identifier: AGPL-3.0-or-later
//! Path resolution
//!
//! Turns raw client paths into `Item`s by asking the provider once.

use std::sync::Arc;

use crate::backend::StorageProvider;
use crate::error::RfmResult;
use crate::{Entry, Item, VirtualPath};

/// Builds items against one provider
#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn StorageProvider>,
    root_absolute: String,
}

impl Resolver {
    pub fn new(provider: Arc<dyn StorageProvider>) -> Self {
        let root_absolute = provider.absolute_path(&VirtualPath::root());
        Self { provider, root_absolute }
    }

    pub fn provider(&self) -> &Arc<dyn StorageProvider> {
        &self.provider
    }

    pub async fn resolve(&self, raw: &str) -> RfmResult<Item> {
        self.resolve_path(&VirtualPath::new(raw)).await
    }

    /// Stat `path`; a file-form path naming an existing folder comes back in folder form.
    pub async fn resolve_path(&self, path: &VirtualPath) -> RfmResult<Item> {
        if let Some(entry) = self.provider.stat(path).await? {
            return Ok(self.item_from_entry(entry));
        }
        if !path.is_folder() {
            let folder = path.clone().into_folder();
            if let Some(entry) = self.provider.stat(&folder).await? {
                return Ok(self.item_from_entry(entry));
            }
        }
        Ok(self.missing(path.clone()))
    }

    /// The folder containing `item`, `None` at the root.
    pub async fn parent(&self, item: &Item) -> RfmResult<Option<Item>> {
        match item.path.parent() {
            Some(parent) => Ok(Some(self.resolve_path(&parent).await?)),
            None => Ok(None),
        }
    }

    pub fn item_from_entry(&self, entry: Entry) -> Item {
        let absolute = self.provider.absolute_path(&entry.path);
        let root = absolute == self.root_absolute;
        Item::from_entry(entry, absolute, root)
    }

    pub fn missing(&self, path: VirtualPath) -> Item {
        let absolute = self.provider.absolute_path(&path);
        let root = absolute == self.root_absolute;
        Item::missing(path, absolute, root)
    }
}
