//! Caller identity.
//!
//! Authentication happens in front of this service; the proxy forwards the
//! authenticated user id in a request header.

use axum::extract::Request;
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;

use stashfs_common::paths::UserId;

use crate::handlers::error_json;

pub const USER_HEADER: &str = "x-stashfs-user";

/// Reject requests without a valid user header; otherwise store the
/// [`UserId`] in the request extensions for handlers.
pub async fn user_middleware(mut req: Request, next: Next) -> Response {
    let user = req
        .headers()
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<UserId>().ok());

    let Some(user) = user else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(error_json("unauthorized", "Missing or invalid user header")),
        )
            .into_response();
    };

    req.extensions_mut().insert(user);
    next.run(req).await
}
