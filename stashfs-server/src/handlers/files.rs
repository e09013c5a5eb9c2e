use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use tokio_util::io::ReaderStream;

use stashfs_common::paths::{UserId, VirtualPath};

use super::{
    field_reader, relocation_json, ApiError, ApiResult, CopyRequest, MoveRequest, PathQuery,
    RenameRequest,
};
use crate::state::AppState;

/// GET /api/files/download?path= — stream file content
pub async fn download_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    let path = VirtualPath::parse_file(&query.path)?;
    let (info, reader) = state.tree.get_file_content(user, &path).await?;

    let mime_type = mime_guess::from_path(&info.name)
        .first_or_octet_stream()
        .to_string();
    let disposition = format!("attachment; filename=\"{}\"", info.name);

    Ok((
        [
            (header::CONTENT_TYPE, mime_type),
            (header::CONTENT_LENGTH, info.size.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

/// POST /api/files/upload?path= — multipart, every file part lands in the
/// target folder under its own file name
pub async fn upload_files(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let parent = VirtualPath::parse_folder(&query.path)?;
    let mut uploaded = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(filename) = field.file_name().map(str::to_string) else {
            continue;
        };
        let (reader, pump) = field_reader(field);
        let (_, stored) = tokio::join!(pump, state.tree.upload_file(user, &parent, &filename, reader));
        uploaded.push(stored?);
    }

    if uploaded.is_empty() {
        return Err(ApiError::BadRequest("request contains no file parts".to_string()));
    }
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "total": uploaded.len(), "files": uploaded })),
    ))
}

/// PATCH /api/files/rename
pub async fn rename_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_file(&body.path)?;
    let outcome = state.tree.rename_file(user, &path, &body.new_name).await?;
    Ok(Json(relocation_json(&outcome)))
}

/// PUT /api/files/move
pub async fn move_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<MoveRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_file(&body.path)?;
    let dest = VirtualPath::parse_folder(&body.destination)?;
    let outcome = state.tree.move_file(user, &path, &dest).await?;
    Ok(Json(relocation_json(&outcome)))
}

/// POST /api/files/copy
pub async fn copy_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<CopyRequest>,
) -> ApiResult<impl IntoResponse> {
    let path = VirtualPath::parse_file(&body.path)?;
    let dest = VirtualPath::parse_folder(&body.destination)?;
    let outcome = state
        .tree
        .copy_file(user, &path, &dest, body.new_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(relocation_json(&outcome))))
}

/// DELETE /api/files?path=
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_file(&query.path)?;
    let parent = state.tree.delete_file(user, &path).await?;
    Ok(Json(serde_json::json!({ "parent": parent })))
}

/// GET /api/files/move-candidates?path=
pub async fn move_candidates(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_file(&query.path)?;
    let items = state.tree.get_move_candidates(user, &path).await?;
    Ok(Json(serde_json::json!({ "total": items.len(), "items": items })))
}
