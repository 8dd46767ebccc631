// SPDX-License-Identifier: AGPL-3.0-or-later
//! Backend entries

use crate::{Metadata, VirtualPath};
use serde::{Deserialize, Serialize};

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

/// What a backend knows about one path
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    pub path: VirtualPath,
    pub kind: EntryKind,
    pub metadata: Metadata,
}

impl Entry {
    pub fn file(path: VirtualPath, metadata: Metadata) -> Self {
        Self { path: path.into_file(), kind: EntryKind::File, metadata }
    }

    pub fn folder(path: VirtualPath, metadata: Metadata) -> Self {
        Self { path: path.into_folder(), kind: EntryKind::Folder, metadata }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }

    pub fn name(&self) -> Option<&str> {
        self.path.name()
    }

    pub fn size(&self) -> Option<u64> {
        self.metadata.size
    }
}
