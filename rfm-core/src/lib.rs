// SPDX-License-Identifier: AGPL-3.0-or-later
//! RichFilemanager Core
//!
//! Core traits, types, and policy for the file manager storage engine.

pub mod backend;
pub mod config;
pub mod entry;
pub mod error;
pub mod item;
pub mod metadata;
pub mod operations;
pub mod path;
pub mod resolver;
pub mod security;

pub use backend::{ProviderKind, StorageCapabilities, StorageProvider};
pub use config::Config;
pub use entry::{Entry, EntryKind};
pub use error::{ErrorPayload, RfmError, RfmResult};
pub use item::{Item, ItemInfo, WireOptions};
pub use metadata::{Metadata, SystemAccess};
pub use operations::{Access, ByteRange};
pub use path::VirtualPath;
pub use resolver::Resolver;
pub use security::{normalize_name, AuthorizationHook, PolicySummary, SecurityPolicy};
