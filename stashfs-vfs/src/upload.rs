use std::collections::HashSet;

use tracing::{info, warn};

use stashfs_common::backend::{empty_body, ByteReader, StoreError};
use stashfs_common::error::{TreeError, TreeResult};
use stashfs_common::paths::{is_valid_filename, to_key, UserId, VirtualPath, SEPARATOR};

use crate::tree::TreeManager;

fn upload_error(path: &VirtualPath, e: StoreError) -> TreeError {
    match e {
        StoreError::Unavailable(_) => TreeError::StoreUnavailable(e),
        other => TreeError::Upload { path: path.to_string(), reason: other.to_string() },
    }
}

impl TreeManager {
    /// Stream `body` into a new file `filename` inside `parent`.
    ///
    /// The parent must already exist; it is never created implicitly.
    pub async fn upload_file(
        &self,
        user: UserId,
        parent: &VirtualPath,
        filename: &str,
        body: ByteReader,
    ) -> TreeResult<VirtualPath> {
        if filename.contains(SEPARATOR) || !is_valid_filename(filename) {
            return Err(TreeError::InvalidPath(format!("'{}' is not a valid file name", filename)));
        }
        let target = parent.child_file(filename)?;
        let _guard = self.locks.lock(user, &[&target]).await;

        if !self.folder_exists(user, parent).await? {
            return Err(TreeError::Upload {
                path: target.to_string(),
                reason: format!("folder '{}' does not exist", parent),
            });
        }
        let key = to_key(user, &target);
        if self.exists(&key).await? {
            return Err(TreeError::AlreadyExists(target.to_string()));
        }
        self.store.put(&key, body).await.map_err(|e| {
            warn!(user = %user, file = %target, error = %e, "Upload failed");
            upload_error(&target, e)
        })?;

        info!(user = %user, file = %target, "File uploaded");
        Ok(target)
    }

    /// Begin a multi-file upload below `parent`. Files are added one at a
    /// time with their path relative to `parent`.
    pub async fn start_folder_upload(
        &self,
        user: UserId,
        parent: &VirtualPath,
    ) -> TreeResult<FolderUpload<'_>> {
        if !parent.is_folder() {
            return Err(TreeError::InvalidPath(format!("'{}' is not a folder", parent)));
        }
        if !self.folder_exists(user, parent).await? {
            return Err(TreeError::Upload {
                path: parent.to_string(),
                reason: format!("folder '{}' does not exist", parent),
            });
        }
        Ok(FolderUpload {
            tree: self,
            user,
            parent: parent.clone(),
            claimed_tops: HashSet::new(),
            known_folders: HashSet::new(),
            uploaded: Vec::new(),
        })
    }
}

/// An in-progress folder upload.
///
/// Each top-level folder named by the uploaded paths must be new; it is
/// claimed by the first file that names it. Files already written stay in
/// the store if a later file fails.
pub struct FolderUpload<'a> {
    tree: &'a TreeManager,
    user: UserId,
    parent: VirtualPath,
    claimed_tops: HashSet<String>,
    known_folders: HashSet<VirtualPath>,
    uploaded: Vec<VirtualPath>,
}

impl FolderUpload<'_> {
    pub async fn add_file(&mut self, relative: &str, body: ByteReader) -> TreeResult<VirtualPath> {
        if !is_valid_filename(relative) || !relative.contains(SEPARATOR) {
            return Err(TreeError::InvalidPath(format!(
                "'{}' is not a valid path inside an uploaded folder",
                relative
            )));
        }
        let target = self.parent.join_relative(relative)?;
        let top = self.parent.child_folder(&target.segments()[self.parent.segments().len()])?;
        let tree = self.tree;
        let user = self.user;
        let _guard = tree.locks.lock(user, &[&target]).await;

        let top_name = top.name().unwrap_or_default().to_string();
        if !self.claimed_tops.contains(&top_name) {
            if tree.folder_exists(user, &top).await? {
                return Err(TreeError::AlreadyExists(top.to_string()));
            }
            self.claimed_tops.insert(top_name);
        }

        for folder in target.ancestors().into_iter().filter(|f| f.is_within(&top)) {
            if self.known_folders.contains(&folder) {
                continue;
            }
            let key = to_key(user, &folder);
            if !tree.exists(&key).await? {
                tree.store.put(&key, empty_body()).await.map_err(|e| upload_error(&folder, e))?;
            }
            self.known_folders.insert(folder);
        }

        let key = to_key(user, &target);
        if tree.exists(&key).await? {
            return Err(TreeError::AlreadyExists(target.to_string()));
        }
        tree.store.put(&key, body).await.map_err(|e| {
            warn!(user = %user, file = %target, error = %e, "Upload failed");
            upload_error(&target, e)
        })?;

        self.uploaded.push(target.clone());
        Ok(target)
    }

    /// Close the session and return every file written.
    pub fn finish(self) -> Vec<VirtualPath> {
        info!(
            user = %self.user,
            parent = %self.parent,
            files = self.uploaded.len(),
            "Folder upload complete"
        );
        self.uploaded
    }
}
