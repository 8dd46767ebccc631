// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process object store
//!
//! A bucket held in memory. Backs tests and demos of the object-store
//! backend, and can be told to fail specific calls.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rfm_core::error::{RfmError, RfmResult};
use std::collections::{BTreeMap, HashSet};

use crate::object::{ObjectClient, ObjectInfo};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    modified: DateTime<Utc>,
}

/// In-memory `ObjectClient`
#[derive(Debug, Default)]
pub struct MemoryObjectClient {
    bucket: String,
    objects: RwLock<BTreeMap<String, StoredObject>>,
    failures: RwLock<HashSet<(String, String)>>,
}

impl MemoryObjectClient {
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Store an object directly, bypassing failure injection.
    pub fn insert(&self, key: &str, data: Bytes) {
        self.objects.write().insert(
            key.to_string(),
            StoredObject { data, modified: Utc::now() },
        );
    }

    /// All keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Make `operation` (`list`, `head`, `get`, `put`, `copy`, `delete`) fail for `key`.
    /// For `copy` the key is the source.
    pub fn fail_on(&self, operation: &str, key: &str) {
        self.failures
            .write()
            .insert((operation.to_string(), key.to_string()));
    }

    pub fn clear_failures(&self) {
        self.failures.write().clear();
    }

    fn check(&self, operation: &'static str, key: &str) -> RfmResult<()> {
        if self
            .failures
            .read()
            .contains(&(operation.to_string(), key.to_string()))
        {
            return Err(RfmError::backend(operation, key, "injected failure"));
        }
        Ok(())
    }

    fn info(key: &str, object: &StoredObject) -> ObjectInfo {
        ObjectInfo {
            key: key.to_string(),
            size: object.data.len() as u64,
            last_modified: Some(object.modified),
            etag: None,
        }
    }
}

#[async_trait]
impl ObjectClient for MemoryObjectClient {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn list(&self, prefix: &str) -> RfmResult<Vec<ObjectInfo>> {
        self.check("list", prefix)?;
        let objects = self.objects.read();
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, object)| Self::info(key, object))
            .collect())
    }

    async fn head(&self, key: &str) -> RfmResult<Option<ObjectInfo>> {
        self.check("head", key)?;
        Ok(self.objects.read().get(key).map(|object| Self::info(key, object)))
    }

    async fn get(&self, key: &str, range: Option<(u64, u64)>) -> RfmResult<Bytes> {
        self.check("get", key)?;
        let objects = self.objects.read();
        let object = objects.get(key).ok_or_else(|| RfmError::not_found(key))?;
        let data = &object.data;
        Ok(match range {
            None => data.clone(),
            Some((start, end)) => {
                let len = data.len();
                let start = (start as usize).min(len);
                let end = (end as usize).saturating_add(1).min(len).max(start);
                data.slice(start..end)
            }
        })
    }

    async fn put(&self, key: &str, data: Bytes) -> RfmResult<()> {
        self.check("put", key)?;
        self.insert(key, data);
        Ok(())
    }

    async fn copy(&self, src: &str, dst: &str) -> RfmResult<()> {
        self.check("copy", src)?;
        let mut objects = self.objects.write();
        let object = objects.get(src).cloned().ok_or_else(|| RfmError::not_found(src))?;
        objects.insert(
            dst.to_string(),
            StoredObject { data: object.data, modified: Utc::now() },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> RfmResult<()> {
        self.check("delete", key)?;
        // Deleting a missing key succeeds, as on S3.
        self.objects.write().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_is_prefix_scoped_and_sorted() {
        let client = MemoryObjectClient::new("b");
        for key in ["a/2", "a/1", "ab", "b/1"] {
            client.insert(key, Bytes::new());
        }
        let keys: Vec<String> = client.list("a/").await.unwrap().into_iter().map(|o| o.key).collect();
        assert_eq!(keys, vec!["a/1", "a/2"]);
    }

    #[tokio::test]
    async fn test_ranged_get() {
        let client = MemoryObjectClient::new("b");
        client.insert("f", Bytes::from_static(b"0123456789"));
        assert_eq!(&client.get("f", Some((2, 4))).await.unwrap()[..], b"234");
        assert_eq!(&client.get("f", Some((8, 20))).await.unwrap()[..], b"89");
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let client = MemoryObjectClient::new("b");
        client.insert("k", Bytes::new());
        client.fail_on("delete", "k");
        let err = client.delete("k").await.unwrap_err();
        assert_eq!(err.code(), "BackendOperationFailed");
        client.clear_failures();
        client.delete("k").await.unwrap();
        assert!(client.keys().is_empty());
    }
}
