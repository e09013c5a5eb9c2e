use std::collections::BTreeMap;

use tracing::debug;

use stashfs_common::documents::ObjectInfo;
use stashfs_common::error::TreeResult;
use stashfs_common::paths::UserId;

use crate::tree::TreeManager;

impl TreeManager {
    /// Every file and folder of `user` whose own name contains `query`
    /// (case-sensitive). Implied folders are matched too. Results are ordered
    /// by path. An empty query matches nothing.
    pub async fn search(&self, user: UserId, query: &str) -> TreeResult<Vec<ObjectInfo>> {
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.store.list(&user.root_prefix()).await?;
        let mut hits = BTreeMap::new();
        for meta in &entries {
            let Some(path) = Self::decode(user, &meta.key) else {
                continue;
            };
            for ancestor in path.ancestors() {
                if ancestor.name().is_some_and(|n| n.contains(query)) {
                    hits.entry(ancestor.clone())
                        .or_insert_with(|| ObjectInfo::implied_folder(ancestor));
                }
            }
            if path.name().is_some_and(|n| n.contains(query)) {
                // A marker replaces an implied entry recorded earlier.
                hits.insert(path.clone(), ObjectInfo::from_meta(path, meta));
            }
        }

        debug!(user = %user, query = %query, count = hits.len(), "Search complete");
        Ok(hits.into_values().collect())
    }
}
