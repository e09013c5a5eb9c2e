pub mod config;
pub mod directory;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use anyhow::bail;
use stashfs_common::backend::ObjectStore;

use self::config::StoreConfig;
use self::directory::DirectoryStore;
use self::memory::MemoryStore;
use self::s3::{S3Config, S3Store};

/// Construct a store adapter from the `[store]` configuration table.
///
/// S3 credentials fall back to `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`
/// when they are not present in the file.
pub fn from_config(config: &StoreConfig) -> anyhow::Result<Arc<dyn ObjectStore>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Directory { path } => Ok(Arc::new(DirectoryStore::new(path))),
        StoreConfig::S3 {
            bucket,
            prefix,
            region,
            endpoint,
            storage_class,
            access_key_id,
            secret_access_key,
        } => {
            let access_key_id = access_key_id
                .clone()
                .unwrap_or_else(|| std::env::var("AWS_ACCESS_KEY_ID").unwrap_or_default());
            let secret_access_key = secret_access_key
                .clone()
                .unwrap_or_else(|| std::env::var("AWS_SECRET_ACCESS_KEY").unwrap_or_default());

            if access_key_id.is_empty() || secret_access_key.is_empty() {
                bail!("S3 credentials not found for bucket '{}'", bucket);
            }

            Ok(Arc::new(S3Store::new(S3Config {
                bucket: bucket.clone(),
                prefix: prefix.clone(),
                region: region.clone(),
                endpoint: endpoint.clone(),
                access_key_id,
                secret_access_key,
                storage_class: storage_class.clone(),
            })?))
        }
    }
}
