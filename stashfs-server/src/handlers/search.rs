use std::sync::Arc;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use serde::Deserialize;

use stashfs_common::paths::UserId;

use super::ApiResult;
use crate::state::AppState;

#[derive(Deserialize, Default)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// GET /api/search?q= — case-sensitive name substring match
pub async fn search(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let search_term = query.q.as_deref().unwrap_or("");
    let items = state.tree.search(user, search_term).await?;

    let total = items.len();
    let offset = query.offset.unwrap_or(0) as usize;
    let limit = query.limit.unwrap_or(100) as usize;
    let items: Vec<_> = items.into_iter().skip(offset).take(limit).collect();

    Ok(Json(serde_json::json!({
        "items": items,
        "total": total,
        "offset": offset,
        "limit": limit,
    })))
}
