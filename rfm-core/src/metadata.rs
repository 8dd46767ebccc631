// SPDX-License-Identifier: AGPL-3.0-or-later
//! File and folder metadata

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File/folder metadata as reported by a backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub size: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    /// System-level access facts; `None` when the backend cannot tell
    pub access: Option<SystemAccess>,
}

/// What the operating system (or store) lets the process do with an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemAccess {
    pub read: bool,
    pub write: bool,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_modified(mut self, modified: DateTime<Utc>) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_access(mut self, access: SystemAccess) -> Self {
        self.access = Some(access);
        self
    }
}
