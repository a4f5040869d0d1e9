//! Document endpoints: seeding, reading, polling and merging.

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{commit_patch, error, success, ApiResult};
use crate::auth::has_admin_pin;
use crate::booking;
use crate::errors::AppError;
use crate::models::Document;
use crate::store::BootOutcome;
use crate::AppState;

/// Boot query parameters.
#[derive(Debug, Deserialize)]
pub struct BootQuery {
    /// `1` or `true` wipes the document before seeding.
    #[serde(default)]
    pub reset: Option<String>,
}

impl BootQuery {
    fn wants_reset(&self) -> bool {
        matches!(self.reset.as_deref(), Some("1") | Some("true"))
    }
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    pub patch: Value,
}

/// GET|POST /api/boot - Seed the document if absent and return it.
pub async fn boot(
    State(state): State<AppState>,
    Query(query): Query<BootQuery>,
    headers: HeaderMap,
) -> ApiResult<BootOutcome> {
    let reset = query.wants_reset();
    if reset && !has_admin_pin(&headers, &state.config.admin_pin) {
        return error(
            AppError::Unauthorized("Resetting requires the admin PIN".to_string()),
            0,
        );
    }

    match state.store.boot(reset, state.config.tent_count).await {
        Ok(outcome) => {
            let rev = outcome.rev;
            success(outcome, rev)
        }
        Err(e) => error(e, 0),
    }
}

/// GET /api/state - Current document with overdue holds expired.
pub async fn get_state(State(state): State<AppState>) -> ApiResult<Value> {
    let snapshot = match state.store.load().await {
        Ok(snapshot) => snapshot,
        Err(e) => return error(e, 0),
    };

    let doc = match Document::from_value(&snapshot.state) {
        Ok(doc) => doc,
        Err(e) => {
            return error(
                AppError::Internal(format!("Stored document is malformed: {}", e)),
                snapshot.rev,
            )
        }
    };

    match booking::expire_pending(&doc, Utc::now()) {
        Ok(Some((patch, count))) => {
            tracing::info!(count, "Expired pending reservations on read");
            commit_patch(&state, patch, snapshot.rev).await
        }
        Ok(None) => success(snapshot.state, snapshot.rev),
        Err(e) => error(e, snapshot.rev),
    }
}

/// GET /api/revision - Current revision counter.
pub async fn get_revision(State(state): State<AppState>) -> ApiResult<RevisionInfo> {
    match state.store.revision().await {
        Ok(revision_id) => success(RevisionInfo { revision_id }, revision_id),
        Err(e) => error(e, 0),
    }
}

/// POST /api/merge - Merge a partial patch into the document.
pub async fn merge_state(
    State(state): State<AppState>,
    Json(request): Json<MergeRequest>,
) -> ApiResult<Value> {
    let revision_id = state.store.revision().await.unwrap_or(0);

    if !request.patch.is_object() {
        return error(
            AppError::Validation("patch must be a JSON object".to_string()),
            revision_id,
        );
    }

    match state.store.merge(&request.patch).await {
        Ok(snapshot) => success(snapshot.state, snapshot.rev),
        Err(e) => error(e, revision_id),
    }
}
