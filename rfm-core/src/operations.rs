// SPDX-License-Identifier: AGPL-3.0-or-later
//! Operation options

use serde::{Deserialize, Serialize};

/// Operation class handed to permission checks and the authorization hook
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    Read,
    Write,
}

/// Inclusive byte range of a partial read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ByteRange {
    pub start: u64,
    /// Last byte, inclusive; `None` reads to the end
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Parse an HTTP `Range` header value such as `bytes=0-99` or `bytes=100-`.
    pub fn parse_header(value: &str) -> Option<Self> {
        let ranges = value.trim().strip_prefix("bytes=")?;
        let (start, end) = ranges.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = match end.trim() {
            "" => None,
            e => Some(e.parse().ok()?),
        };
        Some(Self { start, end })
    }

    /// Clamp against the object size. `None` when unsatisfiable.
    pub fn resolve(&self, size: u64) -> Option<(u64, u64)> {
        if size == 0 || self.start >= size {
            return None;
        }
        let end = self.end.unwrap_or(size - 1).min(size - 1);
        if end < self.start {
            return None;
        }
        Some((self.start, end))
    }
}
