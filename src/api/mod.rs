//! REST API module.
//!
//! Contains the KV proxy routes and the document and booking handlers.

mod admin;
mod document;
mod kv;
mod reservations;
mod tents;

pub use admin::*;
pub use document::*;
pub use kv::*;
pub use reservations::*;
pub use tents::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::errors::{AppError, AppErrorWithRevision};
use crate::models::Document;
use crate::AppState;

/// Success response envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision_id: i64,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision_id: i64) -> Self {
        Self {
            success: true,
            data,
            revision_id,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, AppErrorWithRevision>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T, revision_id: i64) -> ApiResult<T> {
    Ok(ApiResponse::new(data, revision_id))
}

/// Create an error API response.
pub fn error<T: Serialize>(err: AppError, revision_id: i64) -> ApiResult<T> {
    Err(AppErrorWithRevision {
        error: err,
        revision_id,
    })
}

/// Load the typed document, or the error response to send back.
async fn load_document(state: &AppState) -> Result<(Document, i64), AppErrorWithRevision> {
    state.store.document().await.map_err(|e| AppErrorWithRevision {
        error: e,
        revision_id: 0,
    })
}

/// Submit a booking patch and answer with the merged document.
async fn commit_patch(
    state: &AppState,
    patch: serde_json::Value,
    revision_id: i64,
) -> ApiResult<serde_json::Value> {
    match state.store.commit(&patch).await {
        Ok(snapshot) => success(snapshot.state, snapshot.rev),
        Err(e) => error(e, revision_id),
    }
}
