use std::path::PathBuf;

use serde::Deserialize;

/// The `[store]` table, tagged by `backend`.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StoreConfig {
    Memory,
    Directory {
        path: PathBuf,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        #[serde(default = "default_region")]
        region: String,
        /// Custom endpoint for S3-compatible services; must include the bucket (path-style).
        #[serde(default)]
        endpoint: Option<String>,
        #[serde(default)]
        storage_class: Option<String>,
        #[serde(default)]
        access_key_id: Option<String>,
        #[serde(default)]
        secret_access_key: Option<String>,
    },
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl StoreConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            StoreConfig::Memory => {}
            StoreConfig::Directory { path } => {
                if !path.is_absolute() {
                    anyhow::bail!("store path must be absolute: {}", path.display());
                }
            }
            StoreConfig::S3 { bucket, endpoint, .. } => {
                if bucket.is_empty() {
                    anyhow::bail!("store bucket must not be empty");
                }
                if let Some(ep) = endpoint {
                    if !ep.starts_with("http://") && !ep.starts_with("https://") {
                        anyhow::bail!("store endpoint must be an http(s) URL: {}", ep);
                    }
                }
            }
        }
        Ok(())
    }
}
