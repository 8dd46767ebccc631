// SPDX-License-Identifier: AGPL-3.0-or-later
//! Virtual path abstraction
//!
//! A `VirtualPath` is the caller-facing, slash-separated path relative to the
//! storage root. Normalization happens once, at construction: separators are
//! collapsed, `.` segments dropped and `..` segments resolved lexically
//! without ever climbing above the root.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Normalized path relative to the storage root
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VirtualPath {
    /// Path segments, never empty strings, `.` or `..`
    pub segments: Vec<String>,
    /// Folder form (trailing slash)
    pub folder: bool,
}

impl VirtualPath {
    /// Parse and normalize a client path. A trailing slash selects folder form.
    pub fn new(path: impl AsRef<str>) -> Self {
        let path = path.as_ref().replace('\\', "/");
        let folder = path.ends_with('/');
        let mut segments = Vec::new();
        push_segments(&mut segments, &path);
        let folder = folder || segments.is_empty();
        Self { segments, folder }
    }

    pub fn root() -> Self {
        Self {
            segments: Vec::new(),
            folder: true,
        }
    }

    /// Append a relative path. The result's form follows the appended text.
    pub fn join(&self, name: impl AsRef<str>) -> Self {
        let name = name.as_ref().replace('\\', "/");
        let mut segments = self.segments.clone();
        push_segments(&mut segments, &name);
        let folder = name.ends_with('/') || segments.is_empty();
        Self { segments, folder }
    }

    pub fn child_file(&self, name: &str) -> Self {
        self.join(name.trim_end_matches('/')).into_file()
    }

    pub fn child_folder(&self, name: &str) -> Self {
        self.join(name).into_folder()
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            let mut segments = self.segments.clone();
            segments.pop();
            Some(Self {
                segments,
                folder: true,
            })
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.as_str())
    }

    /// Extension after the right-most dot of the name; empty when absent.
    pub fn extension(&self) -> &str {
        self.name()
            .and_then(|n| n.rsplit_once('.'))
            .map(|(_, ext)| ext)
            .unwrap_or("")
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn is_folder(&self) -> bool {
        self.folder
    }

    pub fn into_folder(mut self) -> Self {
        self.folder = true;
        self
    }

    pub fn into_file(mut self) -> Self {
        self.folder = self.segments.is_empty();
        self
    }

    /// Whether `self` equals `ancestor` or lies below it.
    pub fn starts_with(&self, ancestor: &VirtualPath) -> bool {
        self.segments.len() >= ancestor.segments.len()
            && self.segments[..ancestor.segments.len()] == ancestor.segments[..]
    }

    /// Move `self` from below `from` to the same place below `to`.
    pub fn rebase(&self, from: &VirtualPath, to: &VirtualPath) -> Option<Self> {
        if !self.starts_with(from) {
            return None;
        }
        let mut segments = to.segments.clone();
        segments.extend_from_slice(&self.segments[from.segments.len()..]);
        let folder = self.folder || segments.is_empty();
        Some(Self { segments, folder })
    }

    /// Relative path string: `/`, `/docs/`, `/docs/a.txt`
    pub fn to_path_string(&self) -> String {
        if self.segments.is_empty() {
            return "/".to_string();
        }
        let mut out = format!("/{}", self.segments.join("/"));
        if self.folder {
            out.push('/');
        }
        out
    }

    /// Relative path without the leading slash: ``, `docs/`, `docs/a.txt`
    pub fn to_key_suffix(&self) -> String {
        self.to_path_string().trim_start_matches('/').to_string()
    }
}

fn push_segments(segments: &mut Vec<String>, path: &str) {
    for part in path.split('/').filter(|s| !s.is_empty()) {
        match part {
            "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(part.to_string()),
        }
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_path_string())
    }
}

impl From<&str> for VirtualPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let path = VirtualPath::new("/docs/reports/q1.txt");
        assert_eq!(path.segments, vec!["docs", "reports", "q1.txt"]);
        assert!(!path.is_folder());
    }

    #[test]
    fn test_new_handles_empty_segments() {
        let path = VirtualPath::new("//docs//reports//");
        assert_eq!(path.segments, vec!["docs", "reports"]);
        assert!(path.is_folder());
    }

    #[test]
    fn test_backslashes_are_separators() {
        let path = VirtualPath::new("\\docs\\a.txt");
        assert_eq!(path.to_path_string(), "/docs/a.txt");
    }

    #[test]
    fn test_dotdot_never_climbs_above_root() {
        let path = VirtualPath::new("/../../etc/passwd");
        assert_eq!(path.to_path_string(), "/etc/passwd");

        let path = VirtualPath::new("/docs/../../..");
        assert!(path.is_root());
        assert!(path.is_folder());
    }

    #[test]
    fn test_root() {
        let path = VirtualPath::root();
        assert!(path.segments.is_empty());
        assert!(path.is_root());
        assert_eq!(path.to_path_string(), "/");
        assert_eq!(VirtualPath::new(""), path);
    }

    #[test]
    fn test_join() {
        let root = VirtualPath::root();
        let path = root.join("docs/").join("a.txt");
        assert_eq!(path.segments, vec!["docs", "a.txt"]);
        assert!(!path.is_folder());
    }

    #[test]
    fn test_join_with_dotdot() {
        let path = VirtualPath::new("/docs/reports/");
        let new_path = path.join("../pictures/");
        assert_eq!(new_path.to_path_string(), "/docs/pictures/");
    }

    #[test]
    fn test_child_forms() {
        let folder = VirtualPath::new("/docs/");
        assert_eq!(folder.child_folder("sub").to_path_string(), "/docs/sub/");
        assert_eq!(folder.child_file("a.txt").to_path_string(), "/docs/a.txt");
        assert_eq!(folder.child_file("b/").to_path_string(), "/docs/b");
    }

    #[test]
    fn test_parent() {
        let path = VirtualPath::new("/docs/reports/q1.txt");
        let parent = path.parent().unwrap();
        assert_eq!(parent.to_path_string(), "/docs/reports/");
    }

    #[test]
    fn test_parent_of_root() {
        assert!(VirtualPath::root().parent().is_none());
    }

    #[test]
    fn test_name_and_extension() {
        let path = VirtualPath::new("/docs/archive.tar.gz");
        assert_eq!(path.name(), Some("archive.tar.gz"));
        assert_eq!(path.extension(), "gz");

        assert_eq!(VirtualPath::new("/Makefile").extension(), "");
        assert!(VirtualPath::root().name().is_none());
    }

    #[test]
    fn test_starts_with_and_rebase() {
        let docs = VirtualPath::new("/docs/");
        let file = VirtualPath::new("/docs/sub/a.txt");
        let reports = VirtualPath::new("/reports/");

        assert!(file.starts_with(&docs));
        assert!(!VirtualPath::new("/docsx/a.txt").starts_with(&docs));

        let moved = file.rebase(&docs, &reports).unwrap();
        assert_eq!(moved.to_path_string(), "/reports/sub/a.txt");
        assert!(reports.rebase(&docs, &reports).is_none());
    }

    #[test]
    fn test_key_suffix() {
        assert_eq!(VirtualPath::root().to_key_suffix(), "");
        assert_eq!(VirtualPath::new("/docs/").to_key_suffix(), "docs/");
        assert_eq!(VirtualPath::new("docs/a.txt").to_key_suffix(), "docs/a.txt");
    }

    #[test]
    fn test_equality() {
        assert_eq!(VirtualPath::new("/docs/a.txt"), VirtualPath::new("docs/a.txt"));
        assert_ne!(VirtualPath::new("/docs/"), VirtualPath::new("/docs"));
    }
}
