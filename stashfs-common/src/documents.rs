use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::backend::ObjectMeta;
use crate::paths::VirtualPath;

/// A listed entry: a stored file, an explicit folder, or a folder implied by
/// the keys below it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObjectInfo {
    pub path: VirtualPath,
    pub name: String,
    pub is_folder: bool,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

impl ObjectInfo {
    pub fn from_meta(path: VirtualPath, meta: &ObjectMeta) -> Self {
        Self {
            name: path.name().unwrap_or_default().to_string(),
            is_folder: path.is_folder(),
            size: meta.size,
            last_modified: Some(meta.last_modified),
            path,
        }
    }

    /// Folder with no marker of its own, derived from a descendant key.
    pub fn implied_folder(path: VirtualPath) -> Self {
        Self {
            name: path.name().unwrap_or_default().to_string(),
            is_folder: true,
            size: 0,
            last_modified: None,
            path,
        }
    }
}
