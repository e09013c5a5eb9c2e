//! Path manager: list, create, rename, move, copy and delete over flat keys.
//!
//! Each call is a short pipeline of store calls. Validation and conflict
//! checks always run before the first mutating call. Mutating calls hold the
//! [`PathLocks`] stripes of every path they touch for their whole duration.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use stashfs_common::backend::{empty_body, ByteReader, ObjectMeta, ObjectStore, StoreError};
use stashfs_common::documents::ObjectInfo;
use stashfs_common::error::{TreeError, TreeResult};
use stashfs_common::paths::{to_key, to_virtual_path, UserId, VirtualPath};

use crate::bulk;
use crate::locks::PathLocks;

const DEFAULT_BULK_CONCURRENCY: usize = 8;
const DEFAULT_LOCK_STRIPES: usize = 64;

#[derive(Debug, Clone, Copy)]
pub struct TreeOptions {
    /// Maximum in-flight store calls during recursive copy/delete. `1` keeps
    /// strict listing order.
    pub bulk_concurrency: usize,
    pub lock_stripes: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        Self {
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
            lock_stripes: DEFAULT_LOCK_STRIPES,
        }
    }
}

/// Outcome of a rename, move or copy.
#[derive(Debug, Clone, Serialize)]
pub struct Relocation {
    /// Folder that contained the source; where the caller goes next.
    pub source_parent: VirtualPath,
    pub destination: VirtualPath,
    /// Number of keys written under the destination.
    pub copied: usize,
    /// Source paths whose delete failed after every copy succeeded. They now
    /// exist in both places.
    pub stale: Vec<String>,
}

impl Relocation {
    pub fn is_clean(&self) -> bool {
        self.stale.is_empty()
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Transfer {
    Move,
    Copy,
}

#[derive(Clone)]
pub struct TreeManager {
    pub(crate) store: Arc<dyn ObjectStore>,
    pub(crate) locks: Arc<PathLocks>,
    pub(crate) bulk_concurrency: usize,
}

impl TreeManager {
    pub fn new(store: Arc<dyn ObjectStore>, options: TreeOptions) -> Self {
        Self {
            store,
            locks: Arc::new(PathLocks::new(options.lock_stripes)),
            bulk_concurrency: options.bulk_concurrency.max(1),
        }
    }

    pub(crate) async fn exists(&self, key: &str) -> TreeResult<bool> {
        Ok(self.store.stat(key).await?.is_some())
    }

    /// A folder exists if it is the root, has a marker, or has any descendant.
    pub(crate) async fn folder_exists(
        &self,
        user: UserId,
        folder: &VirtualPath,
    ) -> TreeResult<bool> {
        if folder.is_root() {
            return Ok(true);
        }
        let key = to_key(user, folder);
        if self.exists(&key).await? {
            return Ok(true);
        }
        Ok(!self.store.list(&key).await?.is_empty())
    }

    /// Decode a listed key, skipping keys the codec cannot represent.
    pub(crate) fn decode(user: UserId, key: &str) -> Option<VirtualPath> {
        match to_virtual_path(user, key) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping undecodable key");
                None
            }
        }
    }

    fn require_folder(path: &VirtualPath) -> TreeResult<()> {
        if !path.is_folder() {
            return Err(TreeError::InvalidPath(format!("'{}' is not a folder", path)));
        }
        Ok(())
    }

    fn require_file(path: &VirtualPath) -> TreeResult<()> {
        if path.is_folder() {
            return Err(TreeError::InvalidPath(format!("'{}' is not a file", path)));
        }
        Ok(())
    }

    fn require_not_root(path: &VirtualPath) -> TreeResult<()> {
        if path.is_root() {
            return Err(TreeError::InvalidPath("the root folder cannot be changed".to_string()));
        }
        Ok(())
    }

    // ── Queries ──

    /// Immediate children of `folder`. Deeper keys collapse into one entry per
    /// first-level folder. An empty folder with a marker lists as empty; a
    /// folder with neither marker nor children does not exist.
    pub async fn list(&self, user: UserId, folder: &VirtualPath) -> TreeResult<Vec<ObjectInfo>> {
        Self::require_folder(folder)?;
        let prefix = to_key(user, folder);
        let entries = self.store.list(&prefix).await?;
        if entries.is_empty() && !folder.is_root() {
            return Err(TreeError::NotExists(folder.to_string()));
        }

        let mut items = Vec::new();
        let mut seen_folders = HashSet::new();
        for meta in &entries {
            let rest = &meta.key[prefix.len()..];
            if rest.is_empty() {
                continue; // the folder's own marker
            }
            match rest.find('/') {
                None => {
                    if let Some(path) = Self::decode(user, &meta.key) {
                        items.push(ObjectInfo::from_meta(path, meta));
                    }
                }
                Some(idx) => {
                    let name = &rest[..idx];
                    if !seen_folders.insert(name.to_string()) {
                        continue;
                    }
                    let Ok(child) = folder.child_folder(name) else {
                        warn!(key = %meta.key, "Skipping undecodable key");
                        continue;
                    };
                    // Markers sort before their children, so an explicit
                    // folder is always seen through its own marker first.
                    if idx + 1 == rest.len() {
                        items.push(ObjectInfo::from_meta(child, meta));
                    } else {
                        items.push(ObjectInfo::implied_folder(child));
                    }
                }
            }
        }

        items.sort_by(|a, b| b.is_folder.cmp(&a.is_folder).then_with(|| a.name.cmp(&b.name)));
        debug!(user = %user, folder = %folder, count = items.len(), "Listed folder");
        Ok(items)
    }

    pub async fn validate_file_exists(&self, user: UserId, path: &VirtualPath) -> TreeResult<()> {
        Self::require_file(path)?;
        if !self.exists(&to_key(user, path)).await? {
            return Err(TreeError::NotExists(path.to_string()));
        }
        Ok(())
    }

    pub async fn validate_folder_exists(&self, user: UserId, path: &VirtualPath) -> TreeResult<()> {
        Self::require_folder(path)?;
        if !self.folder_exists(user, path).await? {
            return Err(TreeError::NotExists(path.to_string()));
        }
        Ok(())
    }

    /// Metadata plus an open read stream. The stream is released when dropped.
    pub async fn get_file_content(
        &self,
        user: UserId,
        path: &VirtualPath,
    ) -> TreeResult<(ObjectInfo, ByteReader)> {
        Self::require_file(path)?;
        let key = to_key(user, path);
        let meta = self
            .store
            .stat(&key)
            .await?
            .ok_or_else(|| TreeError::NotExists(path.to_string()))?;
        let reader = self.store.get(&key).await.map_err(|e| match e {
            StoreError::NotFound(_) => TreeError::NotExists(path.to_string()),
            other => other.into(),
        })?;
        Ok((ObjectInfo::from_meta(path.clone(), &meta), reader))
    }

    /// Every folder a file or folder at `path` could be moved into. A folder's
    /// own subtree is excluded, and so is the current parent (a move there
    /// always conflicts).
    pub async fn get_move_candidates(
        &self,
        user: UserId,
        path: &VirtualPath,
    ) -> TreeResult<Vec<VirtualPath>> {
        Self::require_not_root(path)?;
        if path.is_folder() {
            self.validate_folder_exists(user, path).await?;
        } else {
            self.validate_file_exists(user, path).await?;
        }

        let entries = self.store.list(&user.root_prefix()).await?;
        let mut folders = BTreeSet::new();
        folders.insert(VirtualPath::root());
        for meta in &entries {
            let Some(entry) = Self::decode(user, &meta.key) else {
                continue;
            };
            folders.extend(entry.ancestors());
            if entry.is_folder() {
                folders.insert(entry);
            }
        }

        let current_parent = path.parent();
        Ok(folders
            .into_iter()
            .filter(|f| *f != current_parent)
            .filter(|f| !(path.is_folder() && f.is_within(path)))
            .collect())
    }

    // ── Mutations ──

    /// Create an explicit, empty folder. Repeating the call fails with
    /// `AlreadyExists`.
    pub async fn create_folder(
        &self,
        user: UserId,
        parent: &VirtualPath,
        name: &str,
    ) -> TreeResult<VirtualPath> {
        let target = parent.child_folder(name)?;
        let _guard = self.locks.lock(user, &[&target]).await;

        if !self.folder_exists(user, parent).await? {
            return Err(TreeError::NotExists(parent.to_string()));
        }
        let key = to_key(user, &target);
        if self.exists(&key).await? {
            return Err(TreeError::AlreadyExists(target.to_string()));
        }
        self.store.put(&key, empty_body()).await?;

        info!(user = %user, folder = %target, "Folder created");
        Ok(target)
    }

    pub async fn rename_file(
        &self,
        user: UserId,
        path: &VirtualPath,
        new_name: &str,
    ) -> TreeResult<Relocation> {
        Self::require_file(path)?;
        let target = path.with_name(new_name)?;
        self.relocate_file(user, path, &target, Transfer::Move).await
    }

    pub async fn rename_folder(
        &self,
        user: UserId,
        path: &VirtualPath,
        new_name: &str,
    ) -> TreeResult<Relocation> {
        Self::require_folder(path)?;
        Self::require_not_root(path)?;
        let target = path.with_name(new_name)?;
        self.relocate_folder(user, path, &target, Transfer::Move).await
    }

    pub async fn move_file(
        &self,
        user: UserId,
        path: &VirtualPath,
        dest_folder: &VirtualPath,
    ) -> TreeResult<Relocation> {
        Self::require_file(path)?;
        let target = Self::target_in(path, dest_folder, None)?;
        self.relocate_file(user, path, &target, Transfer::Move).await
    }

    pub async fn move_folder(
        &self,
        user: UserId,
        path: &VirtualPath,
        dest_folder: &VirtualPath,
    ) -> TreeResult<Relocation> {
        Self::require_folder(path)?;
        Self::require_not_root(path)?;
        let target = Self::target_in(path, dest_folder, None)?;
        self.relocate_folder(user, path, &target, Transfer::Move).await
    }

    /// Duplicate a file into `dest_folder`, optionally under a new name.
    pub async fn copy_file(
        &self,
        user: UserId,
        path: &VirtualPath,
        dest_folder: &VirtualPath,
        new_name: Option<&str>,
    ) -> TreeResult<Relocation> {
        Self::require_file(path)?;
        let target = Self::target_in(path, dest_folder, new_name)?;
        self.relocate_file(user, path, &target, Transfer::Copy).await
    }

    /// Duplicate a folder subtree into `dest_folder`, optionally under a new name.
    pub async fn copy_folder(
        &self,
        user: UserId,
        path: &VirtualPath,
        dest_folder: &VirtualPath,
        new_name: Option<&str>,
    ) -> TreeResult<Relocation> {
        Self::require_folder(path)?;
        Self::require_not_root(path)?;
        let target = Self::target_in(path, dest_folder, new_name)?;
        self.relocate_folder(user, path, &target, Transfer::Copy).await
    }

    /// Destination path for `path` placed inside `dest_folder`.
    /// A folder placed into itself or a descendant is `AlreadyExists`.
    fn target_in(
        path: &VirtualPath,
        dest_folder: &VirtualPath,
        new_name: Option<&str>,
    ) -> TreeResult<VirtualPath> {
        Self::require_folder(dest_folder)?;
        if path.is_folder() && dest_folder.is_within(path) {
            return Err(TreeError::AlreadyExists(format!(
                "'{}' cannot be placed inside itself ('{}')",
                path, dest_folder
            )));
        }
        let name = match new_name {
            Some(n) => n,
            None => path.name().ok_or_else(|| {
                TreeError::InvalidPath("the root folder cannot be moved".to_string())
            })?,
        };
        if path.is_folder() {
            dest_folder.child_folder(name)
        } else {
            dest_folder.child_file(name)
        }
    }

    async fn relocate_file(
        &self,
        user: UserId,
        source: &VirtualPath,
        target: &VirtualPath,
        transfer: Transfer,
    ) -> TreeResult<Relocation> {
        let _guard = self.locks.lock(user, &[source, target]).await;

        let src_key = to_key(user, source);
        let dst_key = to_key(user, target);
        if !self.exists(&src_key).await? {
            return Err(TreeError::NotExists(source.to_string()));
        }
        if !self.folder_exists(user, &target.parent()).await? {
            return Err(TreeError::NotExists(target.parent().to_string()));
        }
        if self.exists(&dst_key).await? {
            return Err(TreeError::AlreadyExists(target.to_string()));
        }

        self.store.copy(&src_key, &dst_key).await?;

        let mut stale = Vec::new();
        if transfer == Transfer::Move {
            if let Err(e) = self.store.delete(&src_key).await {
                warn!(user = %user, key = %src_key, error = %e, "Source left behind after copy");
                stale.push(source.to_string());
            }
        }

        info!(user = %user, from = %source, to = %target, "File relocated");
        Ok(Relocation {
            source_parent: source.parent(),
            destination: target.clone(),
            copied: 1,
            stale,
        })
    }

    /// Recursive copy-then-delete.
    ///
    /// 1. Snapshot every descendant key of `source` (marker included).
    /// 2. Map each onto the destination prefix, keeping the remainder.
    /// 3. Copy all of them; the first failure aborts before any delete.
    /// 4. For a move, delete every original key. Failed deletes are reported
    ///    in [`Relocation::stale`], not rolled back.
    async fn relocate_folder(
        &self,
        user: UserId,
        source: &VirtualPath,
        target: &VirtualPath,
        transfer: Transfer,
    ) -> TreeResult<Relocation> {
        let _guard = self.locks.lock(user, &[source, target]).await;

        let src_prefix = to_key(user, source);
        let dst_prefix = to_key(user, target);

        let snapshot: Vec<ObjectMeta> = self.store.list(&src_prefix).await?;
        if snapshot.is_empty() {
            return Err(TreeError::NotExists(source.to_string()));
        }
        if !self.folder_exists(user, &target.parent()).await? {
            return Err(TreeError::NotExists(target.parent().to_string()));
        }
        // Any key under the destination prefix would be merged into, so an
        // implied folder conflicts just like an explicit one.
        if self.exists(&dst_prefix).await? || !self.store.list(&dst_prefix).await?.is_empty() {
            return Err(TreeError::AlreadyExists(target.to_string()));
        }

        let pairs: Vec<(String, String)> = snapshot
            .iter()
            .map(|m| (m.key.clone(), format!("{}{}", dst_prefix, &m.key[src_prefix.len()..])))
            .collect();
        let copied = pairs.len();

        bulk::copy_all(&self.store, pairs, self.bulk_concurrency)
            .await
            .map_err(|failure| {
                warn!(
                    user = %user,
                    key = %failure.key,
                    error = %failure.error,
                    "Folder copy aborted; source untouched, destination partially written"
                );
                TreeError::from(failure.error)
            })?;

        let mut stale = Vec::new();
        if transfer == Transfer::Move {
            let keys = snapshot.into_iter().map(|m| m.key).collect();
            for failure in bulk::delete_all(&self.store, keys, self.bulk_concurrency).await {
                warn!(user = %user, key = %failure.key, error = %failure.error, "Source left behind after copy");
                let rest = failure.key.strip_prefix(&user.root_prefix()).unwrap_or(&failure.key);
                stale.push(rest.to_string());
            }
        }

        info!(user = %user, from = %source, to = %target, keys = copied, "Folder relocated");
        Ok(Relocation {
            source_parent: source.parent(),
            destination: target.clone(),
            copied,
            stale,
        })
    }

    /// Delete one file; returns its parent folder.
    pub async fn delete_file(&self, user: UserId, path: &VirtualPath) -> TreeResult<VirtualPath> {
        Self::require_file(path)?;
        let _guard = self.locks.lock(user, &[path]).await;

        let key = to_key(user, path);
        if !self.exists(&key).await? {
            return Err(TreeError::NotExists(path.to_string()));
        }
        self.store.delete(&key).await?;

        info!(user = %user, file = %path, "File deleted");
        Ok(path.parent())
    }

    /// Delete a folder and everything below it; returns its parent folder.
    /// Every delete is attempted; if any failed the first error is returned.
    pub async fn delete_folder(&self, user: UserId, path: &VirtualPath) -> TreeResult<VirtualPath> {
        Self::require_folder(path)?;
        Self::require_not_root(path)?;
        let _guard = self.locks.lock(user, &[path]).await;

        let prefix = to_key(user, path);
        let snapshot = self.store.list(&prefix).await?;
        if snapshot.is_empty() {
            return Err(TreeError::NotExists(path.to_string()));
        }
        let total = snapshot.len();
        let keys: Vec<String> = snapshot.into_iter().map(|m| m.key).collect();

        let failures = bulk::delete_all(&self.store, keys, self.bulk_concurrency).await;
        if let Some(first) = failures.into_iter().next() {
            return Err(first.error.into());
        }

        info!(user = %user, folder = %path, keys = total, "Folder deleted");
        Ok(path.parent())
    }
}
