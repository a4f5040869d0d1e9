//! Tent layout endpoints.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{commit_patch, error, load_document, success, ApiResult};
use crate::booking::{self, TentUpdate};
use crate::models::{Tent, TentStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateTentRequest {
    pub id: i64,
    #[serde(default)]
    pub x: Option<f64>,
    #[serde(default)]
    pub y: Option<f64>,
    #[serde(default)]
    pub state: Option<TentStatus>,
}

#[derive(Debug, Serialize)]
pub struct UpdateTentResponse {
    pub tent: Tent,
    pub state: Value,
}

#[derive(Debug, Deserialize)]
pub struct SyncTentsRequest {
    pub tents: Vec<Tent>,
}

#[derive(Debug, Deserialize)]
pub struct RegridRequest {
    pub count: usize,
}

/// POST /api/tents/update - Move, restate or add a tent.
pub async fn update_tent(
    State(state): State<AppState>,
    Json(request): Json<UpdateTentRequest>,
) -> ApiResult<UpdateTentResponse> {
    let (doc, revision_id) = load_document(&state).await?;
    let update = TentUpdate {
        x: request.x,
        y: request.y,
        status: request.state,
    };

    let (patch, tent) = match booking::update_tent(&doc, request.id, &update, Utc::now()) {
        Ok(updated) => updated,
        Err(e) => return error(e, revision_id),
    };

    match state.store.commit(&patch).await {
        Ok(snapshot) => {
            tracing::info!(tent_id = tent.id, state = tent.status.as_str(), "Tent updated");
            success(
                UpdateTentResponse {
                    tent,
                    state: snapshot.state,
                },
                snapshot.rev,
            )
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/tents/sync - Replace the whole tent list.
pub async fn sync_tents(
    State(state): State<AppState>,
    Json(request): Json<SyncTentsRequest>,
) -> ApiResult<Value> {
    let (doc, revision_id) = load_document(&state).await?;

    match booking::sync_tents(&doc, request.tents, Utc::now()) {
        Ok(patch) => commit_patch(&state, patch, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/tents/regrid - Resize the layout and re-place every tent.
pub async fn regrid_tents(
    State(state): State<AppState>,
    Json(request): Json<RegridRequest>,
) -> ApiResult<Value> {
    let (doc, revision_id) = load_document(&state).await?;

    match booking::regrid(&doc, request.count, Utc::now()) {
        Ok(patch) => commit_patch(&state, patch, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}
