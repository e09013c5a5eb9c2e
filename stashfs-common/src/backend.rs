use chrono::{DateTime, Utc};
use tokio::io::AsyncRead;

/// Lazily-read object payload. Dropping the reader releases the underlying
/// connection or file handle.
pub type ByteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Metadata of a single stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("store unreachable: {0}")]
    Unavailable(String),
    #[error("store rejected request: HTTP {status} - {message}")]
    Rejected { status: u16, message: String },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Capability set of the backing object store.
///
/// Keys are opaque strings. Adapters know nothing about folders or users;
/// the tree engine builds both on top of prefix listing.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: ByteReader) -> Result<(), StoreError>;

    /// Open the object for reading.
    async fn get(&self, key: &str) -> Result<ByteReader, StoreError>;

    /// Size and modification time, or `None` if the key is absent.
    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError>;

    /// Remove the object. Deleting an absent key succeeds.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Every object whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError>;

    /// Server-side copy. Fails with `NotFound` if `src_key` is absent.
    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError>;
}

/// Body of a folder marker.
pub fn empty_body() -> ByteReader {
    Box::new(tokio::io::empty())
}

pub fn body_from_bytes(data: impl Into<Vec<u8>>) -> ByteReader {
    Box::new(std::io::Cursor::new(data.into()))
}
