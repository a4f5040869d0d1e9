//! Admin login endpoint.

use axum::{extract::State, Json};
use serde::Deserialize;

use super::{error, success, ApiResult};
use crate::auth::pin_matches;
use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub pin: String,
}

/// POST /api/admin/login - Check the admin PIN.
pub async fn admin_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<bool> {
    let revision_id = state.store.revision().await.unwrap_or(0);

    if pin_matches(&request.pin, &state.config.admin_pin) {
        success(true, revision_id)
    } else {
        tracing::warn!("Rejected admin login");
        error(
            AppError::Unauthorized("Invalid PIN".to_string()),
            revision_id,
        )
    }
}
