// SPDX-License-Identifier: AGPL-3.0-or-later
//! RichFilemanager storage engine
//!
//! Wires the resolver, security policy and providers into one entry point
//! per client verb, keeping the thumbnail shadow tree in step with every
//! mutation.

pub mod engine;
pub mod manager;
pub mod thumbnail;

pub use engine::Engine;
pub use manager::{
    Download, Envelope, FileManager, FileManagerBuilder, FileRead, InitiateAttributes, Summary,
};
pub use thumbnail::{ShadowTree, ThumbnailRenderer};
