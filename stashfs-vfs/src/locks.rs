//! Advisory striped locks for mutating tree operations.
//!
//! A path maps to a stripe by hashing the user and the path's top-level
//! segment, so operations touching overlapping subtrees of the same user
//! always contend on the same stripe. Unrelated subtrees may share a stripe;
//! that only costs some parallelism.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use tokio::sync::{Mutex, MutexGuard};

use stashfs_common::paths::{UserId, VirtualPath};

pub struct PathLocks {
    stripes: Vec<Mutex<()>>,
}

/// Held stripes; released on drop.
pub struct PathGuard<'a> {
    _guards: Vec<MutexGuard<'a, ()>>,
}

impl PathLocks {
    pub fn new(stripes: usize) -> Self {
        Self { stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect() }
    }

    fn stripe(&self, user: UserId, path: &VirtualPath) -> usize {
        let mut hasher = DefaultHasher::new();
        user.hash(&mut hasher);
        path.segments().first().hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }

    /// Lock every stripe covering `paths`. Stripes are taken in ascending
    /// index order, so two operations can never wait on each other in a cycle.
    pub async fn lock(&self, user: UserId, paths: &[&VirtualPath]) -> PathGuard<'_> {
        let mut indices: Vec<usize> = paths.iter().map(|p| self.stripe(user, p)).collect();
        indices.sort_unstable();
        indices.dedup();

        let mut guards = Vec::with_capacity(indices.len());
        for idx in indices {
            guards.push(self.stripes[idx].lock().await);
        }
        PathGuard { _guards: guards }
    }
}
