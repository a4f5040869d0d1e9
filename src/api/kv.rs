//! KV proxy endpoints.
//!
//! Mirror the store primitives with the store's own `{ ok, result }` shape, so a
//! REST store client can talk to this server instead of the hosted store.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::AppError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct KvReply {
    pub ok: bool,
    pub result: Value,
}

/// Error answer of a proxy call: `{ ok: false, error }`.
pub struct KvProxyError(AppError);

impl From<crate::kv::KvError> for KvProxyError {
    fn from(err: crate::kv::KvError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for KvProxyError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "ok": false, "error": self.0.message() });
        (self.0.status_code(), Json(body)).into_response()
    }
}

type KvResult = Result<Json<KvReply>, KvProxyError>;

fn reply(result: Value) -> KvResult {
    Ok(Json(KvReply { ok: true, result }))
}

/// Body of a set call.
#[derive(Debug, Deserialize)]
pub struct SetBody {
    #[serde(default)]
    pub value: Value,
}

/// GET /api/kv/get/{key}
pub async fn kv_get(State(state): State<AppState>, Path(key): Path<String>) -> KvResult {
    let value = state.store.kv().get(&key).await?;
    reply(value.unwrap_or(Value::Null))
}

/// POST /api/kv/set/{key} - Echoes the stored value.
pub async fn kv_set(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Json(body): Json<SetBody>,
) -> KvResult {
    state.store.kv().set(&key, &body.value).await?;
    reply(body.value)
}

/// POST /api/kv/incr/{key}
pub async fn kv_incr(State(state): State<AppState>, Path(key): Path<String>) -> KvResult {
    let value = state.store.kv().incr(&key).await?;
    reply(Value::from(value))
}

/// POST /api/kv/del/{key}
pub async fn kv_del(State(state): State<AppState>, Path(key): Path<String>) -> KvResult {
    state.store.kv().del(&key).await?;
    reply(Value::Null)
}
