//! Key-value store primitives.
//!
//! The shared document lives in a store that only understands four operations:
//! get, set, incr and del. Everything else is built on top of them.

mod client;
mod memory;
mod rest;

pub use client::KvClient;
pub use memory::MemoryKv;
pub use rest::RestKv;

use async_trait::async_trait;
use serde_json::Value;

/// Errors raised by a store primitive.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{op} answered with status {status}")]
    Status { op: &'static str, status: u16 },
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("value at {key} is not an integer")]
    NotANumber { key: String },
    #[error("invalid store url: {0}")]
    InvalidUrl(String),
}

/// A store exposing the primitive operations of the hosted KV service.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value. A missing key and a stored `null` are both `Ok(None)`.
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError>;

    /// Overwrite a value.
    async fn set(&self, key: &str, value: &Value) -> Result<(), KvError>;

    /// Increment an integer counter and return the new value. A missing key starts at 1.
    async fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Remove a key. Removing a missing key is not an error.
    async fn del(&self, key: &str) -> Result<(), KvError>;
}

/// Interpret a stored counter. Hosted stores hand counters back as strings.
pub(crate) fn counter_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
