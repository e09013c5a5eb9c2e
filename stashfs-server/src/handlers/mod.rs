pub mod files;
pub mod folders;
pub mod search;

use std::io;

use axum::extract::multipart::Field;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::io::StreamReader;
use tracing::warn;

use stashfs_common::backend::ByteReader;
use stashfs_common::error::TreeError;
use stashfs_vfs::Relocation;

pub fn error_json(code: &str, message: &str) -> serde_json::Value {
    serde_json::json!({ "error": { "code": code, "message": message } })
}

/// Handler error: a tree failure or a malformed request.
pub enum ApiError {
    Tree(TreeError),
    BadRequest(String),
}

impl From<TreeError> for ApiError {
    fn from(e: TreeError) -> Self {
        ApiError::Tree(e)
    }
}

pub(crate) fn status_for(e: &TreeError) -> StatusCode {
    match e {
        TreeError::InvalidPath(_) => StatusCode::BAD_REQUEST,
        TreeError::NotExists(_) => StatusCode::NOT_FOUND,
        TreeError::AlreadyExists(_) => StatusCode::CONFLICT,
        TreeError::Upload { .. } | TreeError::Archive(_) => StatusCode::INTERNAL_SERVER_ERROR,
        TreeError::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Tree(e) => {
                let status = status_for(&e);
                if status.is_server_error() {
                    warn!(error = %e, "Request failed");
                }
                (status, Json(error_json(e.code(), &e.to_string()))).into_response()
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, Json(error_json("bad_request", &message))).into_response()
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
pub struct PathQuery {
    #[serde(default)]
    pub path: String,
}

#[derive(Deserialize)]
pub struct RenameRequest {
    pub path: String,
    pub new_name: String,
}

#[derive(Deserialize)]
pub struct MoveRequest {
    pub path: String,
    pub destination: String,
}

#[derive(Deserialize)]
pub struct CopyRequest {
    pub path: String,
    pub destination: String,
    #[serde(default)]
    pub new_name: Option<String>,
}

pub(crate) fn relocation_json(r: &Relocation) -> serde_json::Value {
    serde_json::json!({
        "path": r.destination,
        "parent": r.source_parent,
        "copied": r.copied,
        "stale_keys": r.stale,
    })
}

/// Expose a multipart field as a [`ByteReader`] without buffering it.
///
/// The field borrows the request, so it cannot move into a spawned task.
/// Instead the returned pump future must be polled alongside whatever
/// consumes the reader (`tokio::join!`). A client error mid-stream surfaces
/// as a read error rather than a silently truncated body.
pub(crate) fn field_reader<'a>(
    mut field: Field<'a>,
) -> (ByteReader, impl std::future::Future<Output = ()> + 'a) {
    let (tx, mut rx) = mpsc::channel::<io::Result<Bytes>>(4);

    let pump = async move {
        loop {
            let item = match field.chunk().await {
                Ok(Some(chunk)) => Ok(chunk),
                Ok(None) => break,
                Err(e) => Err(io::Error::other(e.to_string())),
            };
            let stop = item.is_err();
            if tx.send(item).await.is_err() || stop {
                break;
            }
        }
    };

    let stream = futures_util::stream::poll_fn(move |cx| rx.poll_recv(cx));
    let reader: ByteReader = Box::new(StreamReader::new(Box::pin(stream)));
    (reader, pump)
}
