// SPDX-License-Identifier: AGPL-3.0-or-later
//! Resolved items and their wire representation

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{Entry, EntryKind, Metadata, VirtualPath};

/// A resolved, typed handle to a virtual path.
///
/// Built once per request by the resolver and never mutated: existence and
/// metadata are facts cached from a single backend stat call.
#[derive(Debug, Clone)]
pub struct Item {
    pub path: VirtualPath,
    pub absolute_path: String,
    pub kind: EntryKind,
    pub exists: bool,
    pub metadata: Metadata,
    root: bool,
}

impl Item {
    /// An item backed by a stat or listing result.
    pub fn from_entry(entry: Entry, absolute_path: String, root: bool) -> Self {
        Self {
            path: entry.path,
            absolute_path,
            kind: entry.kind,
            exists: true,
            metadata: entry.metadata,
            root,
        }
    }

    /// An item nothing exists at yet; its kind follows the trailing slash.
    pub fn missing(path: VirtualPath, absolute_path: String, root: bool) -> Self {
        let kind = if path.is_folder() { EntryKind::Folder } else { EntryKind::File };
        Self {
            path,
            absolute_path,
            kind,
            exists: false,
            metadata: Metadata::default(),
            root,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Identity with the configured storage root
    pub fn is_root(&self) -> bool {
        self.root
    }

    pub fn name(&self) -> &str {
        self.path.name().unwrap_or("")
    }

    pub fn extension(&self) -> &str {
        if self.is_folder() {
            ""
        } else {
            self.path.extension()
        }
    }

    pub fn relative_path(&self) -> String {
        self.path.to_path_string()
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata.size
    }
}

/// Presentation settings for the wire model
#[derive(Debug, Clone)]
pub struct WireOptions {
    pub public_prefix: String,
    pub date_format: String,
}

impl Default for WireOptions {
    fn default() -> Self {
        Self {
            public_prefix: String::new(),
            date_format: "%d %b %Y %H:%M".to_string(),
        }
    }
}

/// `{ id, type, attributes }` as sent to the client
#[derive(Debug, Clone, Serialize)]
pub struct ItemInfo {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub attributes: ItemAttributes,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ItemAttributes {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
    pub path: String,
    pub readable: u8,
    pub writable: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    pub modified: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// File content, `editfile` only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ItemInfo {
    pub fn new(item: &Item, readable: bool, writable: bool, options: &WireOptions) -> Self {
        let format = |dt: &DateTime<Utc>| dt.format(&options.date_format).to_string();
        let is_file = item.is_file();

        let attributes = ItemAttributes {
            name: item.name().to_string(),
            extension: is_file.then(|| item.extension().to_string()),
            path: public_path(&options.public_prefix, &item.path),
            readable: readable as u8,
            writable: writable as u8,
            created: item.metadata.created.as_ref().map(format),
            modified: item.metadata.modified.as_ref().map(format).unwrap_or_default(),
            timestamp: item.metadata.modified.map(|dt| dt.timestamp()),
            size: if is_file && readable { item.metadata.size } else { None },
            width: None,
            height: None,
            content: None,
        };

        Self {
            id: item.relative_path(),
            kind: item.kind,
            attributes,
        }
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.attributes.content = Some(content);
        self
    }
}

fn public_path(prefix: &str, path: &VirtualPath) -> String {
    let prefix = prefix.trim_end_matches('/');
    format!("{}{}", prefix, path.to_path_string())
}
