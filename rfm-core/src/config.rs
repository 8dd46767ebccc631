// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration
//!
//! Loaded once from TOML, validated, then shared read-only by every
//! component. Every section falls back to defaults when omitted.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RfmError, RfmResult};

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Root configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub local: LocalConfig,
    pub object: ObjectConfig,
    pub thumbnails: ThumbnailConfig,
    pub security: SecurityConfig,
    pub upload: UploadConfig,
    pub options: OptionsConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Object,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Public URL prefix prepended to relative paths in `attributes.path`
    pub public_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LocalConfig {
    pub root: PathBuf,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./userfiles"),
        }
    }
}

/// S3-compatible object store settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectConfig {
    pub bucket: String,
    /// Key prefix acting as the storage root inside the bucket
    pub prefix: String,
    pub region: String,
    pub endpoint: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    /// Path-style URLs (MinIO and most self-hosted stores)
    pub path_style: bool,
    /// Permit folder-wide rename/move/copy/delete
    pub allow_bulk: bool,
}

impl Default for ObjectConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            prefix: "userfiles".to_string(),
            region: "us-east-1".to_string(),
            endpoint: "https://s3.us-east-1.amazonaws.com".to_string(),
            access_key_id: String::new(),
            secret_access_key: String::new(),
            path_style: false,
            allow_bulk: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailLocation {
    /// Same backend as the content
    #[default]
    Same,
    /// Local disk, whatever the content backend
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub enabled: bool,
    /// Reuse generated thumbnails; when off they are rendered on every request
    pub cache: bool,
    /// Folder below the thumbnail backend root holding the shadow tree
    pub dir: String,
    pub location: ThumbnailLocation,
    pub local_root: PathBuf,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cache: true,
            dir: "_thumbs".to_string(),
            location: ThumbnailLocation::Same,
            local_root: PathBuf::from("./thumbnails"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListPolicy {
    /// Only listed entries are permitted
    AllowList,
    /// Everything except listed entries is permitted
    #[default]
    DisallowList,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RestrictionRules {
    pub policy: ListPolicy,
    pub ignore_case: bool,
    pub restrictions: Vec<String>,
}

impl Default for RestrictionRules {
    fn default() -> Self {
        Self {
            policy: ListPolicy::DisallowList,
            ignore_case: true,
            restrictions: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    pub read_only: bool,
    pub normalize_filename: bool,
    pub extensions: RestrictionRules,
    pub patterns: RestrictionRules,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            normalize_filename: true,
            extensions: RestrictionRules {
                restrictions: ["php", "phtml", "sh", "exe", "bat", "cgi"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
                ..RestrictionRules::default()
            },
            patterns: RestrictionRules {
                restrictions: vec!["*/.htaccess".to_string(), "*/web.config".to_string()],
                ..RestrictionRules::default()
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Maximum accepted file size in bytes
    pub file_size_limit: Option<u64>,
    /// Overwrite files of the same name instead of failing
    pub overwrite: bool,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            file_size_limit: Some(16_000_000),
            overwrite: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OptionsConfig {
    /// chrono format string for `created`/`modified`
    pub date_format: String,
    /// Maximum total size of the storage root in bytes, 0 = unlimited
    pub root_size_limit: u64,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            date_format: "%d %b %Y %H:%M".to_string(),
            root_size_limit: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> RfmResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| RfmError::Config(format!("reading {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&content)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn from_toml(content: &str) -> RfmResult<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| RfmError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RfmResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(RfmError::Config(format!(
                "logging.level must be one of: trace, debug, info, warn, error; got {}",
                self.logging.level
            )));
        }

        if self.storage.backend == BackendKind::Object && self.object.bucket.is_empty() {
            return Err(RfmError::Config("object.bucket is required for the object backend".into()));
        }

        if self.thumbnails.enabled {
            let dir = crate::VirtualPath::new(&self.thumbnails.dir);
            if dir.is_root() {
                return Err(RfmError::Config("thumbnails.dir must name a folder below the root".into()));
            }
        }

        for pattern in &self.security.patterns.restrictions {
            glob::Pattern::new(pattern)
                .map_err(|e| RfmError::Config(format!("invalid pattern {:?}: {}", pattern, e)))?;
        }

        if self.options.date_format.trim().is_empty() {
            return Err(RfmError::Config("options.date_format must not be empty".into()));
        }

        Ok(())
    }
}
