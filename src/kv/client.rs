//! Best-effort reads from a store.
//!
//! Failures are logged and turned into `None`; callers never see an error and
//! simply stay unsynchronized until their next attempt.

use std::sync::Arc;

use serde_json::Value;

use super::KvStore;

#[derive(Clone)]
pub struct KvClient {
    store: Arc<dyn KvStore>,
}

impl KvClient {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        match self.store.get(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "kv get failed");
                None
            }
        }
    }

    /// Read a counter without bumping it. Missing or malformed counters read as `None`.
    pub async fn counter(&self, key: &str) -> Option<i64> {
        self.get(key)
            .await
            .and_then(|value| super::counter_value(&value))
    }
}
