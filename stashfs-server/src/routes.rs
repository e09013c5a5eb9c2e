use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::middleware;
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};

use crate::auth;
use crate::handlers::{files, folders, search};
use crate::state::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    let upload_routes = Router::new()
        .route("/api/folders/upload", post(folders::upload_folder))
        .route("/api/files/upload", post(files::upload_files))
        .layer(DefaultBodyLimit::max(state.max_upload_bytes));

    let user_routes = Router::new()
        // Folders
        .route("/api/folders", get(folders::list_folder))
        .route("/api/folders", post(folders::create_folder))
        .route("/api/folders", delete(folders::delete_folder))
        .route("/api/folders/rename", patch(folders::rename_folder))
        .route("/api/folders/move", put(folders::move_folder))
        .route("/api/folders/copy", post(folders::copy_folder))
        .route("/api/folders/download", get(folders::download_folder))
        .route("/api/folders/move-candidates", get(folders::move_candidates))
        // Files
        .route("/api/files", delete(files::delete_file))
        .route("/api/files/download", get(files::download_file))
        .route("/api/files/rename", patch(files::rename_file))
        .route("/api/files/move", put(files::move_file))
        .route("/api/files/copy", post(files::copy_file))
        .route("/api/files/move-candidates", get(files::move_candidates))
        // Search
        .route("/api/search", get(search::search))
        .merge(upload_routes)
        .layer(middleware::from_fn(auth::user_middleware));

    Router::new()
        .route("/api/health", get(health))
        .merge(user_routes)
        .with_state(state)
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}
