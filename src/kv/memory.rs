//! In-process store used by tests and local agents.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{counter_value, KvError, KvStore};

#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, Value>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Value>, KvError> {
        let entries = self.entries.lock().await;
        let value = entries.get(key).filter(|v| !v.is_null()).cloned();
        Ok(value)
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), KvError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut entries = self.entries.lock().await;
        let next = match entries.get(key) {
            None | Some(Value::Null) => 1,
            Some(value) => {
                counter_value(value).ok_or_else(|| KvError::NotANumber {
                    key: key.to_string(),
                })? + 1
            }
        };
        entries.insert(key.to_string(), Value::from(next));
        Ok(next)
    }

    async fn del(&self, key: &str) -> Result<(), KvError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_then_get_returns_equal_value() {
        let kv = MemoryKv::new();
        let value = json!({ "brand": { "name": "Coral Club" }, "tents": [{ "id": 1 }] });

        kv.set("doc", &value).await.unwrap();
        assert_eq!(kv.get("doc").await.unwrap(), Some(value));
        assert_eq!(kv.get("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_counts_from_one() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr("rev").await.unwrap(), 1);
        assert_eq!(kv.incr("rev").await.unwrap(), 2);

        kv.set("rev", &json!("41")).await.unwrap();
        assert_eq!(kv.incr("rev").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_incr_rejects_non_numbers() {
        let kv = MemoryKv::new();
        kv.set("doc", &json!({ "a": 1 })).await.unwrap();
        assert!(matches!(
            kv.incr("doc").await,
            Err(KvError::NotANumber { .. })
        ));
    }

    #[tokio::test]
    async fn test_del() {
        let kv = MemoryKv::new();
        kv.set("k", &json!(1)).await.unwrap();
        kv.del("k").await.unwrap();
        kv.del("k").await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_stored_null_reads_as_missing() {
        let kv = MemoryKv::new();
        kv.set("k", &Value::Null).await.unwrap();
        assert_eq!(kv.get("k").await.unwrap(), None);
    }
}
