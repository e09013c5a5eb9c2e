use std::time::Instant;

use stashfs_vfs::TreeManager;

/// Shared application state
pub struct AppState {
    pub tree: TreeManager,
    /// Request body cap applied to upload routes
    pub max_upload_bytes: usize,
    /// Server startup time for uptime calculation
    pub started_at: Instant,
}

impl AppState {
    pub fn new(tree: TreeManager, max_upload_bytes: usize) -> Self {
        Self {
            tree,
            max_upload_bytes,
            started_at: Instant::now(),
        }
    }
}
