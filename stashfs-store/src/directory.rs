//! Local directory store.
//!
//! Keys map onto a nested directory tree. Each key segment is percent-encoded;
//! intermediate segments become directories named `<segment>@`, the final
//! segment becomes a file, and a key ending in `/` is stored as a file named
//! `@` inside its directory. Encoded names never contain `@`, so a file and a
//! folder with the same name can coexist just like two flat keys can. Writes go
//! to a temp file that is then renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use stashfs_common::backend::{ByteReader, ObjectMeta, ObjectStore, StoreError};

const DIR_SUFFIX: char = '@';
const MARKER_FILE: &str = "@";
const TEMP_PREFIX: &str = "@tmp-";

pub struct DirectoryStore {
    base_path: PathBuf,
}

fn encode_segment(segment: &str) -> String {
    // `.` is escaped too so `.` and `..` can never reach the filesystem.
    urlencoding::encode(segment).replace('.', "%2E")
}

fn decode_segment(name: &str) -> Option<String> {
    urlencoding::decode(name).ok().map(|s| s.into_owned())
}

fn invalid_key(key: &str) -> StoreError {
    StoreError::Io(std::io::Error::new(ErrorKind::InvalidInput, format!("invalid key '{}'", key)))
}

impl DirectoryStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self { base_path: base_path.into() }
    }

    fn full_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        if key.is_empty() {
            return Err(invalid_key(key));
        }
        let mut segments: Vec<&str> = key.split('/').collect();
        let leaf = segments.pop().unwrap_or_default();

        let mut path = self.base_path.clone();
        for segment in segments {
            if segment.is_empty() {
                return Err(invalid_key(key));
            }
            path.push(format!("{}{}", encode_segment(segment), DIR_SUFFIX));
        }
        if leaf.is_empty() {
            path.push(MARKER_FILE);
        } else {
            path.push(encode_segment(leaf));
        }
        Ok(path)
    }

    fn temp_path(dest: &Path) -> PathBuf {
        let name = format!("{}{}", TEMP_PREFIX, Uuid::new_v4());
        match dest.parent() {
            Some(parent) => parent.join(name),
            None => PathBuf::from(name),
        }
    }

    /// Remove directories left empty by a delete, stopping at the base path.
    async fn prune_empty_dirs(&self, from: &Path) {
        let mut dir = from.parent();
        while let Some(d) = dir {
            if d == self.base_path.as_path() || !d.starts_with(&self.base_path) {
                break;
            }
            if tokio::fs::remove_dir(d).await.is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    /// Move a finished temp file into place, cleaning up on failure.
    async fn commit(&self, tmp_path: &Path, dest: &Path) -> Result<(), StoreError> {
        if let Err(e) = tokio::fs::rename(tmp_path, dest).await {
            let _ = tokio::fs::remove_file(tmp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

fn meta_from_fs(key: String, meta: &std::fs::Metadata) -> ObjectMeta {
    let last_modified = meta.modified().map(DateTime::<Utc>::from).unwrap_or_else(|_| Utc::now());
    ObjectMeta { key, size: meta.len(), last_modified }
}

#[async_trait]
impl ObjectStore for DirectoryStore {
    async fn put(&self, key: &str, mut body: ByteReader) -> Result<(), StoreError> {
        let dest = self.full_path(key)?;
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = Self::temp_path(&dest);
        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            tokio::io::copy(&mut body, &mut file).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        self.commit(&tmp_path, &dest).await?;
        debug!(key = %key, "Directory put complete");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<ByteReader, StoreError> {
        let src = self.full_path(key)?;
        match tokio::fs::File::open(&src).await {
            Ok(file) => Ok(Box::new(file)),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>, StoreError> {
        let path = self.full_path(key)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta_from_fs(key.to_string(), &meta))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let path = self.full_path(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => self.prune_empty_dirs(&path).await,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!(key = %key, "Directory delete complete");
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StoreError> {
        let mut entries = Vec::new();
        if !tokio::fs::try_exists(&self.base_path).await? {
            return Ok(entries);
        }

        // (directory on disk, key prefix it represents)
        let mut stack = vec![(self.base_path.clone(), String::new())];
        while let Some((dir, dir_key)) = stack.pop() {
            let mut read_dir = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = read_dir.next_entry().await? {
                let name = entry.file_name().to_string_lossy().into_owned();
                let meta = entry.metadata().await?;

                if meta.is_dir() {
                    let Some(segment) = name.strip_suffix(DIR_SUFFIX).and_then(decode_segment) else {
                        continue;
                    };
                    let child_key = format!("{}{}/", dir_key, segment);
                    // Only descend where the subtree can still match the prefix.
                    if child_key.starts_with(prefix) || prefix.starts_with(&child_key) {
                        stack.push((entry.path(), child_key));
                    }
                } else if meta.is_file() {
                    let key = if name == MARKER_FILE {
                        dir_key.clone()
                    } else if name.starts_with(TEMP_PREFIX) {
                        continue;
                    } else {
                        match decode_segment(&name) {
                            Some(segment) => format!("{}{}", dir_key, segment),
                            None => continue,
                        }
                    };
                    if !key.is_empty() && key.starts_with(prefix) {
                        entries.push(meta_from_fs(key, &meta));
                    }
                }
            }
        }

        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    async fn copy(&self, src_key: &str, dst_key: &str) -> Result<(), StoreError> {
        let src = self.full_path(src_key)?;
        let dest = self.full_path(dst_key)?;
        if !tokio::fs::try_exists(&src).await? {
            return Err(StoreError::NotFound(src_key.to_string()));
        }
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp_path = Self::temp_path(&dest);
        if let Err(e) = tokio::fs::copy(&src, &tmp_path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }
        self.commit(&tmp_path, &dest).await?;
        debug!(src = %src_key, dst = %dst_key, "Directory copy complete");
        Ok(())
    }
}
