use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Multipart, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::warn;

use stashfs_common::breadcrumbs::build_breadcrumbs;
use stashfs_common::paths::{UserId, VirtualPath};

use super::{
    field_reader, relocation_json, ApiError, ApiResult, CopyRequest, MoveRequest, PathQuery,
    RenameRequest,
};
use crate::state::AppState;

const ARCHIVE_BUFFER: usize = 64 * 1024;

/// GET /api/folders?path= — children plus the breadcrumb trail
pub async fn list_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let folder = VirtualPath::parse_folder(&query.path)?;
    let items = state.tree.list(user, &folder).await?;
    Ok(Json(serde_json::json!({
        "path": folder,
        "breadcrumbs": build_breadcrumbs(&folder),
        "total": items.len(),
        "items": items,
    })))
}

#[derive(Deserialize)]
pub struct CreateFolderRequest {
    #[serde(default)]
    pub parent: String,
    pub name: String,
}

/// POST /api/folders
pub async fn create_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<CreateFolderRequest>,
) -> ApiResult<impl IntoResponse> {
    let parent = VirtualPath::parse_folder(&body.parent)?;
    let folder = state.tree.create_folder(user, &parent, &body.name).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "path": folder }))))
}

/// PATCH /api/folders/rename
pub async fn rename_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<RenameRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_folder(&body.path)?;
    let outcome = state.tree.rename_folder(user, &path, &body.new_name).await?;
    Ok(Json(relocation_json(&outcome)))
}

/// PUT /api/folders/move
pub async fn move_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<MoveRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_folder(&body.path)?;
    let dest = VirtualPath::parse_folder(&body.destination)?;
    let outcome = state.tree.move_folder(user, &path, &dest).await?;
    Ok(Json(relocation_json(&outcome)))
}

/// POST /api/folders/copy
pub async fn copy_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Json(body): Json<CopyRequest>,
) -> ApiResult<impl IntoResponse> {
    let path = VirtualPath::parse_folder(&body.path)?;
    let dest = VirtualPath::parse_folder(&body.destination)?;
    let outcome = state
        .tree
        .copy_folder(user, &path, &dest, body.new_name.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(relocation_json(&outcome))))
}

/// DELETE /api/folders?path=
pub async fn delete_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_folder(&query.path)?;
    let parent = state.tree.delete_folder(user, &path).await?;
    Ok(Json(serde_json::json!({ "parent": parent })))
}

/// GET /api/folders/move-candidates?path=
pub async fn move_candidates(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let path = VirtualPath::parse_folder(&query.path)?;
    let items = state.tree.get_move_candidates(user, &path).await?;
    Ok(Json(serde_json::json!({ "total": items.len(), "items": items })))
}

/// Attachment name for a folder archive.
pub(crate) fn archive_name(folder: &VirtualPath) -> String {
    match folder.name() {
        Some(name) => format!("{}.zip", name),
        None => "all-files.zip".to_string(),
    }
}

/// GET /api/folders/download?path= — the subtree as a streamed zip
///
/// Existence is checked up front so a missing folder still gets a 404. Once
/// streaming has begun a store failure can only truncate the body.
pub async fn download_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
) -> ApiResult<Response> {
    let folder = VirtualPath::parse_folder(&query.path)?;
    state.tree.validate_folder_exists(user, &folder).await?;

    let (mut writer, reader) = tokio::io::duplex(ARCHIVE_BUFFER);
    let tree = state.tree.clone();
    let target = folder.clone();
    tokio::spawn(async move {
        if let Err(e) = tree.write_folder_content(user, &target, &mut writer).await {
            warn!(user = %user, folder = %target, error = %e, "Archive stream aborted");
        }
    });

    let disposition = format!("attachment; filename=\"{}\"", archive_name(&folder));
    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        Body::from_stream(ReaderStream::new(reader)),
    )
        .into_response())
}

/// POST /api/folders/upload?path= — multipart, one part per file, each
/// named by its path relative to the target folder
pub async fn upload_folder(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<UserId>,
    Query(query): Query<PathQuery>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let parent = VirtualPath::parse_folder(&query.path)?;
    let mut session = state.tree.start_folder_upload(user, &parent).await?;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.body_text()))?
    {
        let Some(relative) = field.file_name().map(str::to_string) else {
            continue;
        };
        let (reader, pump) = field_reader(field);
        let (_, stored) = tokio::join!(pump, session.add_file(&relative, reader));
        stored?;
    }

    let files = session.finish();
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "total": files.len(), "files": files })),
    ))
}
