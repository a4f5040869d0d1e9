//! Merge-on-write access to the shared document.
//!
//! Every write reads the latest document, merges the patch, bumps the revision
//! counter and writes the document back stamped with the new revision. The
//! read-modify-write is not atomic: two concurrent merges can lose an update.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::config::DocumentKeys;
use crate::errors::AppError;
use crate::kv::{counter_value, KvStore};
use crate::merge::{merge_document, MergePolicy, REV_FIELD};
use crate::models::{make_grid, Document};

/// A document together with the revision it was written under.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: Value,
    pub rev: i64,
}

/// Result of seeding the store.
#[derive(Debug, Clone, Serialize)]
pub struct BootOutcome {
    pub state: Value,
    pub rev: i64,
    /// Whether a document had to be written
    pub seeded: bool,
}

#[derive(Clone)]
pub struct DocumentStore {
    kv: Arc<dyn KvStore>,
    keys: DocumentKeys,
    policy: MergePolicy,
}

impl DocumentStore {
    pub fn new(kv: Arc<dyn KvStore>, keys: DocumentKeys) -> Self {
        Self {
            kv,
            keys,
            policy: MergePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: MergePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn kv(&self) -> &Arc<dyn KvStore> {
        &self.kv
    }

    pub fn keys(&self) -> &DocumentKeys {
        &self.keys
    }

    /// Current revision, `0` when the counter has never been written.
    pub async fn revision(&self) -> Result<i64, AppError> {
        let raw = self.kv.get(&self.keys.rev_key).await?;
        Ok(raw.as_ref().and_then(counter_value).unwrap_or(0))
    }

    /// Current document (`{}` when absent) and revision.
    pub async fn load(&self) -> Result<Snapshot, AppError> {
        let state = self
            .kv
            .get(&self.keys.state_key)
            .await?
            .unwrap_or_else(|| Value::Object(Default::default()));
        let rev = self.revision().await?;
        Ok(Snapshot { state, rev })
    }

    /// Typed view of the current document.
    pub async fn document(&self) -> Result<(Document, i64), AppError> {
        let snapshot = self.load().await?;
        let doc = Document::from_value(&snapshot.state).map_err(|e| {
            AppError::Internal(format!("Stored document is malformed: {}", e))
        })?;
        Ok((doc, snapshot.rev))
    }

    /// Merge `patch` into the latest document and persist it under a new revision.
    pub async fn merge(&self, patch: &Value) -> Result<Snapshot, AppError> {
        let current = self
            .kv
            .get(&self.keys.state_key)
            .await?
            .unwrap_or(Value::Null);
        let next = merge_document(&current, patch, &self.policy);
        self.write(next).await
    }

    /// Like [`merge`](Self::merge), but every array in `patch` replaces the stored
    /// one whatever the policy says. Booking patches carry whole collections.
    pub async fn commit(&self, patch: &Value) -> Result<Snapshot, AppError> {
        let current = self
            .kv
            .get(&self.keys.state_key)
            .await?
            .unwrap_or(Value::Null);
        let policy = self.policy.replacing_arrays_of(patch);
        let next = merge_document(&current, patch, &policy);
        self.write(next).await
    }

    async fn write(&self, mut next: Value) -> Result<Snapshot, AppError> {
        let rev = self.kv.incr(&self.keys.rev_key).await?;
        if let Value::Object(map) = &mut next {
            map.insert(REV_FIELD.to_string(), Value::from(rev));
        }
        self.kv.set(&self.keys.state_key, &next).await?;

        tracing::debug!(rev, "document written");
        Ok(Snapshot { state: next, rev })
    }

    /// Make sure a document exists, seeding one with `tent_count` tents if needed.
    ///
    /// With `reset` the document is removed first; the revision keeps counting
    /// so pollers see the fresh seed. A stored document without tents gets a
    /// grid sized from its own layout.
    pub async fn boot(&self, reset: bool, tent_count: usize) -> Result<BootOutcome, AppError> {
        if reset {
            tracing::warn!("Resetting shared document");
            self.kv.del(&self.keys.state_key).await?;
        }

        let existing = self.kv.get(&self.keys.state_key).await?;
        let Some(state) = existing.filter(|v| !v.is_null()) else {
            let seeded = serde_json::to_value(Document::seed(tent_count))?;
            let snapshot = self.write(seeded).await?;

            tracing::info!(tents = tent_count, rev = snapshot.rev, "Seeded shared document");
            return Ok(BootOutcome {
                state: snapshot.state,
                rev: snapshot.rev,
                seeded: true,
            });
        };

        let doc = Document::from_value(&state).map_err(|e| {
            AppError::Internal(format!("Stored document is malformed: {}", e))
        })?;
        if doc.tents.is_empty() {
            let count = if doc.layout.count > 0 {
                doc.layout.count
            } else {
                tent_count
            };
            let patch = serde_json::json!({ "tents": make_grid(count) });
            let snapshot = self.commit(&patch).await?;
            tracing::info!(tents = count, "Filled empty tent list");
            return Ok(BootOutcome {
                state: snapshot.state,
                rev: snapshot.rev,
                seeded: true,
            });
        }

        let rev = match self.revision().await? {
            0 => 1,
            rev => rev,
        };
        Ok(BootOutcome {
            state,
            rev,
            seeded: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;
    use serde_json::json;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryKv::new()), DocumentKeys::default())
    }

    #[tokio::test]
    async fn test_merge_bumps_revision_by_one() {
        let store = store();
        store.boot(false, 4).await.unwrap();

        let mut last = store.revision().await.unwrap();
        for i in 0..5 {
            let snapshot = store
                .merge(&json!({ "brand": { "name": format!("Club {}", i) } }))
                .await
                .unwrap();
            assert_eq!(snapshot.rev, last + 1);
            assert_eq!(snapshot.state["rev"], json!(last + 1));
            last = snapshot.rev;
        }
        assert_eq!(store.revision().await.unwrap(), last);

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.state["brand"]["name"], json!("Club 4"));
        assert_eq!(loaded.state["brand"]["logoSize"], json!(42));
    }

    #[tokio::test]
    async fn test_merge_on_empty_store() {
        let store = store();
        let snapshot = store.merge(&json!({ "layout": { "count": 3 } })).await.unwrap();
        assert_eq!(snapshot.rev, 1);
        assert_eq!(snapshot.state["layout"], json!({ "count": 3 }));
        assert_eq!(snapshot.state["tents"], json!([]));
    }

    #[tokio::test]
    async fn test_boot_seeds_grid() {
        let store = store();
        let outcome = store.boot(false, 9).await.unwrap();
        assert!(outcome.seeded);
        assert_eq!(outcome.rev, 1);

        let (doc, rev) = store.document().await.unwrap();
        assert_eq!(rev, 1);
        assert_eq!(doc.tents.len(), 9);
        assert!(doc
            .tents
            .iter()
            .all(|t| (0.0..=1.0).contains(&t.x) && (0.0..=1.0).contains(&t.y)));
    }

    #[tokio::test]
    async fn test_boot_keeps_existing_document() {
        let store = store();
        store.boot(false, 4).await.unwrap();
        store.merge(&json!({ "brand": { "name": "Kept" } })).await.unwrap();

        let outcome = store.boot(false, 30).await.unwrap();
        assert!(!outcome.seeded);
        assert_eq!(outcome.rev, 2);
        assert_eq!(outcome.state["brand"]["name"], json!("Kept"));
        assert_eq!(outcome.state["tents"].as_array().map(Vec::len), Some(4));
    }

    #[tokio::test]
    async fn test_boot_reset_reseeds() {
        let store = store();
        store.boot(false, 4).await.unwrap();
        store.merge(&json!({ "brand": { "name": "Gone" } })).await.unwrap();

        let before = store.revision().await.unwrap();

        let outcome = store.boot(true, 6).await.unwrap();
        assert!(outcome.seeded);
        assert_eq!(outcome.rev, before + 1);
        assert_eq!(outcome.state["rev"], json!(before + 1));
        assert_eq!(outcome.state["brand"]["name"], json!("Coral Club"));
        assert_eq!(outcome.state["tents"].as_array().map(Vec::len), Some(6));
    }

    #[tokio::test]
    async fn test_boot_fills_missing_tents_from_layout() {
        let store = store();
        store
            .kv()
            .set(
                &store.keys().state_key,
                &json!({ "layout": { "count": 5 }, "tents": [] }),
            )
            .await
            .unwrap();

        let outcome = store.boot(false, 20).await.unwrap();
        assert!(outcome.seeded);
        assert_eq!(outcome.state["tents"].as_array().map(Vec::len), Some(5));
    }

    #[tokio::test]
    async fn test_reset_is_seen_by_pollers() {
        let store = store();
        store.boot(false, 4).await.unwrap();
        let reader = crate::kv::KvClient::new(Arc::clone(store.kv()));
        let seen = reader.counter(&store.keys().rev_key).await;
        assert_eq!(seen, Some(1));

        store.boot(true, 4).await.unwrap();
        let after = reader.counter(&store.keys().rev_key).await;
        assert!(after > seen);
    }

    #[tokio::test]
    async fn test_null_settings_do_not_block_reads() {
        let store = store();
        store.boot(false, 4).await.unwrap();
        store
            .merge(&json!({ "brand": { "logoSize": null }, "layout": { "count": "many" } }))
            .await
            .unwrap();

        let (doc, rev) = store.document().await.unwrap();
        assert_eq!(rev, 2);
        assert_eq!(doc.tents.len(), 4);
        assert_eq!(doc.brand.name, "Coral Club");
        assert_eq!(doc.brand.logo_size, 42);
        assert_eq!(doc.layout.count, 20);

        // The raw document keeps what was written
        let raw = store.load().await.unwrap();
        assert!(raw.state["brand"]["logoSize"].is_null());
    }

    mod upsert_arrays {
        use super::*;
        use crate::booking::{self, TentUpdate, MAX_LOG_ENTRIES};
        use chrono::Utc;

        fn store() -> DocumentStore {
            DocumentStore::new(Arc::new(MemoryKv::new()), DocumentKeys::default())
                .with_policy(MergePolicy::upsert_arrays())
        }

        #[tokio::test]
        async fn test_regrid_shrinks_tent_list() {
            let store = store();
            store.boot(false, 20).await.unwrap();

            let (doc, _) = store.document().await.unwrap();
            let patch = booking::regrid(&doc, 6, Utc::now()).unwrap();
            store.commit(&patch).await.unwrap();

            let (doc, _) = store.document().await.unwrap();
            assert_eq!(doc.layout.count, 6);
            assert_eq!(doc.tents.len(), 6);
        }

        #[tokio::test]
        async fn test_log_stays_capped() {
            let store = store();
            store.boot(false, 2).await.unwrap();

            let update = TentUpdate {
                x: Some(0.3),
                ..TentUpdate::default()
            };
            for _ in 0..MAX_LOG_ENTRIES + 6 {
                let (doc, _) = store.document().await.unwrap();
                let (patch, _) = booking::update_tent(&doc, 1, &update, Utc::now()).unwrap();
                store.commit(&patch).await.unwrap();
            }

            let (doc, _) = store.document().await.unwrap();
            assert_eq!(doc.logs.len(), MAX_LOG_ENTRIES);
        }

        #[tokio::test]
        async fn test_plain_merge_still_upserts() {
            let store = store();
            store.boot(false, 3).await.unwrap();

            let snapshot = store
                .merge(&json!({ "tents": [{ "id": 2, "x": 0.9, "y": 0.9, "state": "bl" }] }))
                .await
                .unwrap();
            let tents = snapshot.state["tents"].as_array().unwrap();
            assert_eq!(tents.len(), 3);
            assert_eq!(tents[1]["state"], json!("bl"));
        }
    }
}
