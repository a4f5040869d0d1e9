//! Reservation endpoints.

use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{commit_patch, error, load_document, success, ApiResult};
use crate::booking;
use crate::models::{Reservation, ReservationDraft, ReservationStatus, TentStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HoldRequest {
    pub tent_id: i64,
    #[serde(default)]
    pub reservation: Option<ReservationDraft>,
    #[serde(default)]
    pub hold_minutes: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HoldResponse {
    pub reservation: Reservation,
    pub state: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseRequest {
    pub tent_id: i64,
    pub res_id: String,
    #[serde(default = "default_release_state")]
    pub to_state: TentStatus,
    #[serde(default = "default_release_status")]
    pub new_status: ReservationStatus,
}

fn default_release_state() -> TentStatus {
    TentStatus::Available
}

fn default_release_status() -> ReservationStatus {
    ReservationStatus::Expired
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    pub tent_id: i64,
    pub res_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelRequest {
    pub res_id: String,
}

/// POST /api/reservations/hold - Put a pending hold on an available tent.
pub async fn hold_reservation(
    State(state): State<AppState>,
    Json(request): Json<HoldRequest>,
) -> ApiResult<HoldResponse> {
    let (doc, revision_id) = load_document(&state).await?;
    let hold_minutes = request.hold_minutes.unwrap_or(state.config.hold_minutes);

    let (patch, reservation) = match booking::hold(
        &doc,
        request.tent_id,
        request.reservation.unwrap_or_default(),
        hold_minutes,
        Utc::now(),
    ) {
        Ok(held) => held,
        Err(e) => return error(e, revision_id),
    };

    match state.store.commit(&patch).await {
        Ok(snapshot) => {
            tracing::info!(
                tent_id = request.tent_id,
                reservation_id = %reservation.id,
                extras = reservation.extras_total(),
                "Tent held"
            );
            success(
                HoldResponse {
                    reservation,
                    state: snapshot.state,
                },
                snapshot.rev,
            )
        }
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/reservations/release - Release a tent and close its reservation.
pub async fn release_reservation(
    State(state): State<AppState>,
    Json(request): Json<ReleaseRequest>,
) -> ApiResult<Value> {
    let (doc, revision_id) = load_document(&state).await?;

    match booking::release(
        &doc,
        request.tent_id,
        &request.res_id,
        request.to_state,
        request.new_status,
        Utc::now(),
    ) {
        Ok(patch) => commit_patch(&state, patch, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/reservations/confirm - Mark a reservation paid.
pub async fn confirm_reservation(
    State(state): State<AppState>,
    Json(request): Json<ConfirmRequest>,
) -> ApiResult<Value> {
    let (doc, revision_id) = load_document(&state).await?;

    match booking::confirm_paid(&doc, request.tent_id, &request.res_id, Utc::now()) {
        Ok(patch) => commit_patch(&state, patch, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}

/// POST /api/reservations/cancel - Cancel a reservation.
pub async fn cancel_reservation(
    State(state): State<AppState>,
    Json(request): Json<CancelRequest>,
) -> ApiResult<Value> {
    let (doc, revision_id) = load_document(&state).await?;

    match booking::cancel(&doc, &request.res_id, Utc::now()) {
        Ok(patch) => commit_patch(&state, patch, revision_id).await,
        Err(e) => error(e, revision_id),
    }
}
