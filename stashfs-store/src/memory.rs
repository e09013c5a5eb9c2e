//! In-process store, used for tests and throwaway deployments.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use tokio::io::AsyncReadExt;
use tracing::debug;

use stashfs_common::backend::{ByteReader, ObjectMeta, ObjectStore, StoreError};

struct StoredObject {
    data: Bytes,
    last_modified: DateTime<Utc>,
}

#[derive(Default)]
pub struct MemoryStore {
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, StoredObject>>, StoreError> {
        self.objects
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, StoredObject>>, StoreError> {
        self.objects
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }

    fn meta(key: &str, obj: &StoredObject) -> ObjectMeta {
        ObjectMeta {
            key: key.to_string(),
            size: obj.data.len() as u64,
            last_modified: obj.last_modified,
        }
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn put(&self, key: &str, mut body: ByteReader) -> Result<(), StoreError> {
        let mut data = Vec::new();
        body.read_to_end(&mut data).await?;

        self.write()?.insert(
            key.to_string(),
            StoredObject { data: Bytes::from(data), last_modified: Utc::now() },
        );
        debug!(key = %key, "Memory put complete");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ByteReader, StoreError> {
        let data = self
            .read()?
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Ok(Box::new(Cursor::new(data)))
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        Ok(self.read()?.get(key).map(|obj| Self::meta(key, obj)))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        Ok(self
            .read()?
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, obj)| Self::meta(k, obj))
            .collect())
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        let mut objects = self.write()?;
        let data = objects
            .get(src_key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StoreError::NotFound(src_key.to_string()))?;
        objects.insert(dst_key.to_string(), StoredObject { data, last_modified: Utc::now() });
        Ok(())
    }
}
