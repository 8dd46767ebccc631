// SPDX-License-Identifier: AGPL-3.0-or-later
//! Storage providers for RichFilemanager
//!
//! A hierarchical local filesystem backend and a flat object-store backend
//! that emulates folders over key prefixes.

mod local;
pub mod memory;
pub mod object;

#[cfg(feature = "s3")]
pub mod s3;

pub use local::LocalBackend;
pub use memory::MemoryObjectClient;
pub use object::{ObjectClient, ObjectInfo, ObjectStoreBackend};

#[cfg(feature = "s3")]
pub use s3::{S3Client, S3Config};

use rfm_core::config::{BackendKind, Config, ThumbnailLocation};
use rfm_core::{RfmResult, StorageProvider};
use std::sync::Arc;

/// The providers one file manager instance works against
#[derive(Clone)]
pub struct ProviderSet {
    pub content: Arc<dyn StorageProvider>,
    /// Where the thumbnail shadow tree lives
    pub thumbnails: Arc<dyn StorageProvider>,
    /// Thumbnails share the content provider, so their folder must stay hidden
    pub thumbnails_shared: bool,
}

impl ProviderSet {
    /// Build the configured providers.
    pub fn from_config(config: &Config) -> RfmResult<Self> {
        let content: Arc<dyn StorageProvider> = match config.storage.backend {
            BackendKind::Local => Arc::new(LocalBackend::new("local", &config.local.root)),
            BackendKind::Object => Arc::new(ObjectStoreBackend::new(
                "object",
                object_client(config)?,
                &config.object.prefix,
                config.object.allow_bulk,
            )),
        };
        Ok(Self::with_content(config, content))
    }

    /// Object-store providers over an explicit client.
    pub fn object(config: &Config, client: Arc<dyn ObjectClient>) -> Self {
        let content = Arc::new(ObjectStoreBackend::new(
            "object",
            client,
            &config.object.prefix,
            config.object.allow_bulk,
        ));
        Self::with_content(config, content)
    }

    /// Pair a content provider with the thumbnail provider the config asks for.
    pub fn with_content(config: &Config, content: Arc<dyn StorageProvider>) -> Self {
        match config.thumbnails.location {
            ThumbnailLocation::Same => Self {
                thumbnails: content.clone(),
                content,
                thumbnails_shared: true,
            },
            ThumbnailLocation::Local => Self {
                thumbnails: Arc::new(LocalBackend::new("thumbnails", &config.thumbnails.local_root)),
                content,
                thumbnails_shared: false,
            },
        }
    }
}

#[cfg(feature = "s3")]
fn object_client(config: &Config) -> RfmResult<Arc<dyn ObjectClient>> {
    Ok(Arc::new(S3Client::new(S3Config::from(&config.object))))
}

#[cfg(not(feature = "s3"))]
fn object_client(_config: &Config) -> RfmResult<Arc<dyn ObjectClient>> {
    Err(rfm_core::RfmError::Config(
        "object backend requires the `s3` feature".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rfm_core::ProviderKind;

    #[test]
    fn test_thumbnail_location() {
        let mut config = Config::default();
        let set = ProviderSet::object(&config, Arc::new(MemoryObjectClient::new("b")));
        assert!(set.thumbnails_shared);
        assert_eq!(set.thumbnails.kind(), ProviderKind::Object);

        config.thumbnails.location = ThumbnailLocation::Local;
        let set = ProviderSet::object(&config, Arc::new(MemoryObjectClient::new("b")));
        assert!(!set.thumbnails_shared);
        assert_eq!(set.thumbnails.kind(), ProviderKind::Local);
        assert_eq!(set.content.kind(), ProviderKind::Object);
    }

    #[test]
    fn test_local_from_config() {
        let set = ProviderSet::from_config(&Config::default()).unwrap();
        assert_eq!(set.content.kind(), ProviderKind::Local);
        assert!(set.content.capabilities().atomic_rename);
    }
}
