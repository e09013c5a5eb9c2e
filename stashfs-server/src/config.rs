use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stashfs_store::config::StoreConfig;
use stashfs_vfs::TreeOptions;

const DEFAULT_CONFIG_FILE: &str = "stashfs.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    pub store: StoreConfig,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_bulk_concurrency() -> usize {
    8
}

fn default_lock_stripes() -> usize {
    64
}

fn default_max_upload_bytes() -> usize {
    1024 * 1024 * 1024
}

impl ServerConfig {
    /// Config file location: first CLI argument, then `STASHFS_CONFIG`, then
    /// `stashfs.toml` in the working directory.
    pub fn resolve_path() -> PathBuf {
        std::env::args()
            .nth(1)
            .or_else(|| std::env::var("STASHFS_CONFIG").ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string())
            .into()
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let mut config: ServerConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        config.apply_env(std::env::var("STASHFS_LISTEN").ok().as_deref())?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self, listen: Option<&str>) -> anyhow::Result<()> {
        if let Some(addr) = listen {
            self.listen_addr = addr
                .parse()
                .map_err(|e| anyhow::anyhow!("STASHFS_LISTEN is not a socket address ({}): {}", addr, e))?;
        }
        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.bulk_concurrency == 0 {
            anyhow::bail!("bulk_concurrency must be at least 1");
        }
        if self.lock_stripes == 0 {
            anyhow::bail!("lock_stripes must be at least 1");
        }
        if self.max_upload_bytes == 0 {
            anyhow::bail!("max_upload_bytes must be greater than zero");
        }
        self.store.validate()
    }

    pub fn tree_options(&self) -> TreeOptions {
        TreeOptions {
            bulk_concurrency: self.bulk_concurrency,
            lock_stripes: self.lock_stripes,
        }
    }
}
