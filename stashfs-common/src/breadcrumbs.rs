use serde::Serialize;

use crate::paths::VirtualPath;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Breadcrumb {
    pub name: String,
    pub path: String,
}

/// Ancestor trail for navigation. Only folders produce crumbs: for a file
/// path the leaf is left out. The root yields nothing.
pub fn build_breadcrumbs(path: &VirtualPath) -> Vec<Breadcrumb> {
    let segments = path.segments();
    let folder_count = if path.is_folder() { segments.len() } else { segments.len().saturating_sub(1) };

    (0..folder_count)
        .map(|i| Breadcrumb {
            name: segments[i].clone(),
            path: segments[..=i].join("/"),
        })
        .collect()
}
