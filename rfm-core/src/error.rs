// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for the storage core

use serde::Serialize;
use thiserror::Error;

/// Result type alias
pub type RfmResult<T> = Result<T, RfmError>;

/// Main error type
///
/// Every variant carries the relative path of the failing item so that
/// dispatchers can render `code` + `arguments` without leaking backend
/// messages or absolute paths.
#[derive(Error, Debug)]
pub enum RfmError {
    #[error("Path not found: {path}")]
    PathNotFound { path: String },

    #[error("Already exists: {path} ({name})")]
    AlreadyExists { path: String, name: String },

    #[error("Permission denied by the system: {path}")]
    PermissionDenied { path: String },

    #[error("Not authorized: {path}")]
    NotAuthorized { path: String },

    #[error("Storage is read-only: {path}")]
    ReadOnly { path: String },

    #[error("Forbidden extension: {path}")]
    ForbiddenExtension { path: String },

    #[error("Forbidden path: {path}")]
    ForbiddenPath { path: String },

    #[error("Bulk operations are disabled for this storage: {path}")]
    ForbiddenBulkOperation { path: String },

    #[error("The storage root folder cannot be modified")]
    RootFolderProtected,

    #[error("Invalid name: {name}")]
    InvalidName { name: String },

    #[error("Operation is not allowed on a folder: {path}")]
    FolderNotAllowed { path: String },

    #[error("Not a folder: {path}")]
    NotAFolder { path: String },

    #[error("Cannot place {path} inside itself ({target})")]
    InvalidDestination { path: String, target: String },

    #[error("Requested range not satisfiable for {path} (size {size})")]
    RangeNotSatisfiable { path: String, size: u64 },

    #[error("Size limit of {limit} bytes exceeded: {path}")]
    SizeLimitExceeded { path: String, limit: u64 },

    #[error("Archive error ({path}): {message}")]
    Archive { path: String, message: String },

    #[error("Backend operation {operation} failed on {path}: {message}")]
    BackendOperationFailed {
        operation: &'static str,
        path: String,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl RfmError {
    pub fn not_found(path: impl ToString) -> Self {
        RfmError::PathNotFound { path: path.to_string() }
    }

    pub fn already_exists(path: impl ToString, name: impl Into<String>) -> Self {
        RfmError::AlreadyExists {
            path: path.to_string(),
            name: name.into(),
        }
    }

    pub fn backend(operation: &'static str, path: impl ToString, message: impl ToString) -> Self {
        RfmError::BackendOperationFailed {
            operation,
            path: path.to_string(),
            message: message.to_string(),
        }
    }

    /// Map an I/O failure on `path` to the typed taxonomy.
    pub fn from_io(err: std::io::Error, operation: &'static str, path: impl ToString) -> Self {
        use std::io::ErrorKind;

        let path = path.to_string();
        match err.kind() {
            ErrorKind::NotFound => RfmError::PathNotFound { path },
            ErrorKind::AlreadyExists => {
                let name = path
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or_default()
                    .to_string();
                RfmError::AlreadyExists { path, name }
            }
            ErrorKind::PermissionDenied => RfmError::PermissionDenied { path },
            _ => RfmError::BackendOperationFailed {
                operation,
                path,
                message: err.to_string(),
            },
        }
    }

    /// Stable error kind name surfaced to clients.
    pub fn code(&self) -> &'static str {
        match self {
            RfmError::PathNotFound { .. } => "PathNotFound",
            RfmError::AlreadyExists { .. } => "AlreadyExists",
            RfmError::PermissionDenied { .. } => "PermissionDenied",
            RfmError::NotAuthorized { .. } => "NotAuthorized",
            RfmError::ReadOnly { .. } => "ReadOnly",
            RfmError::ForbiddenExtension { .. } => "ForbiddenExtension",
            RfmError::ForbiddenPath { .. } => "ForbiddenPath",
            RfmError::ForbiddenBulkOperation { .. } => "ForbiddenBulkOperation",
            RfmError::RootFolderProtected => "RootFolderProtected",
            RfmError::InvalidName { .. } => "InvalidName",
            RfmError::FolderNotAllowed { .. } => "FolderNotAllowed",
            RfmError::NotAFolder { .. } => "NotAFolder",
            RfmError::InvalidDestination { .. } => "InvalidDestination",
            RfmError::RangeNotSatisfiable { .. } => "RangeNotSatisfiable",
            RfmError::SizeLimitExceeded { .. } => "SizeLimitExceeded",
            RfmError::Archive { .. } => "Archive",
            RfmError::BackendOperationFailed { .. } => "BackendOperationFailed",
            RfmError::Config(_) => "Config",
        }
    }

    /// Structured arguments for the client. Never includes backend messages.
    pub fn arguments(&self) -> Vec<String> {
        match self {
            RfmError::PathNotFound { path }
            | RfmError::PermissionDenied { path }
            | RfmError::NotAuthorized { path }
            | RfmError::ReadOnly { path }
            | RfmError::ForbiddenExtension { path }
            | RfmError::ForbiddenPath { path }
            | RfmError::ForbiddenBulkOperation { path }
            | RfmError::FolderNotAllowed { path }
            | RfmError::NotAFolder { path }
            | RfmError::Archive { path, .. }
            | RfmError::BackendOperationFailed { path, .. } => vec![path.clone()],
            RfmError::AlreadyExists { path, name } => vec![path.clone(), name.clone()],
            RfmError::InvalidDestination { path, target } => vec![path.clone(), target.clone()],
            RfmError::RangeNotSatisfiable { path, size } => vec![path.clone(), size.to_string()],
            RfmError::SizeLimitExceeded { path, limit } => vec![path.clone(), limit.to_string()],
            RfmError::InvalidName { name } => vec![name.clone()],
            RfmError::RootFolderProtected | RfmError::Config(_) => Vec::new(),
        }
    }

    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            RfmError::PermissionDenied { .. }
                | RfmError::NotAuthorized { .. }
                | RfmError::ReadOnly { .. }
                | RfmError::ForbiddenExtension { .. }
                | RfmError::ForbiddenPath { .. }
        )
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            code: self.code(),
            arguments: self.arguments(),
        }
    }
}

/// Client-facing error representation
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub code: &'static str,
    pub arguments: Vec<String>,
}
