//! Synchronization with the shared document.
//!
//! A [`SyncClient`] keeps a local copy of the document and its revision. It
//! polls the revision counter and refetches the whole document on change, and
//! periodically expires stale pending holds through the merge path. Every
//! remote failure is logged and swallowed; the local copy simply stays stale
//! until the next tick.
//!
//! A [`Sweeper`] runs next to the store and expires holds from the latest
//! stored document instead of a polled copy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::booking;
use crate::kv::KvClient;
use crate::models::Document;
use crate::store::{DocumentStore, Snapshot};

#[derive(Debug, Clone)]
struct Local {
    doc: Value,
    rev: i64,
}

pub struct SyncClient {
    store: DocumentStore,
    kv: KvClient,
    local: RwLock<Local>,
}

impl SyncClient {
    pub fn new(store: DocumentStore) -> Self {
        let kv = KvClient::new(Arc::clone(store.kv()));
        Self {
            store,
            kv,
            local: RwLock::new(Local {
                doc: Value::Object(Default::default()),
                rev: 0,
            }),
        }
    }

    /// Copy of the local document and the revision it was fetched at.
    pub async fn snapshot(&self) -> Snapshot {
        let local = self.local.read().await;
        Snapshot {
            state: local.doc.clone(),
            rev: local.rev,
        }
    }

    /// Load the remote document into the local copy. Returns whether it succeeded.
    pub async fn bootstrap(&self) -> bool {
        match self.store.load().await {
            Ok(snapshot) => {
                self.replace_local(snapshot).await;
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "initial document load failed");
                false
            }
        }
    }

    /// Merge a patch remotely and adopt the result locally.
    pub async fn merge(&self, patch: &Value) -> Option<Value> {
        match self.store.merge(patch).await {
            Ok(snapshot) => {
                let state = snapshot.state.clone();
                self.replace_local(snapshot).await;
                Some(state)
            }
            Err(e) => {
                tracing::error!(error = %e, "merge failed");
                None
            }
        }
    }

    /// Check the remote revision and refetch the document when it moved.
    pub async fn poll_once(&self) -> bool {
        let keys = self.store.keys();
        let Some(remote_rev) = self.kv.counter(&keys.rev_key).await else {
            return false;
        };
        if remote_rev == self.local.read().await.rev {
            return false;
        }

        let Some(doc) = self.kv.get(&keys.state_key).await else {
            return false;
        };
        tracing::debug!(rev = remote_rev, "remote document changed");
        self.replace_local(Snapshot {
            state: doc,
            rev: remote_rev,
        })
        .await;
        true
    }

    /// Expire pending holds in the local copy whose deadline passed at `now`.
    /// Returns the number of reservations expired.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let doc = {
            let local = self.local.read().await;
            match Document::from_value(&local.doc) {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(error = %e, "local document unreadable, skipping sweep");
                    return 0;
                }
            }
        };

        let Some((patch, count)) = expiry_patch(&doc, now) else {
            return 0;
        };
        match self.store.commit(&patch).await {
            Ok(snapshot) => {
                self.replace_local(snapshot).await;
                tracing::info!(count, "expired pending reservations");
                count
            }
            Err(e) => {
                tracing::error!(error = %e, "expiry write failed");
                0
            }
        }
    }

    /// Start the poll and sweep loops.
    pub fn spawn(self: &Arc<Self>, poll_every: Duration, sweep_every: Duration) -> SyncHandles {
        let poller = Arc::clone(self);
        let poll = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                poller.poll_once().await;
            }
        });

        let sweeper = Arc::clone(self);
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweeper.sweep_once(Utc::now()).await;
            }
        });

        SyncHandles {
            tasks: vec![poll, sweep],
        }
    }

    async fn replace_local(&self, snapshot: Snapshot) {
        let mut local = self.local.write().await;
        local.doc = snapshot.state;
        local.rev = snapshot.rev;
    }
}

/// Expires overdue holds straight from the store.
pub struct Sweeper {
    store: DocumentStore,
}

impl Sweeper {
    pub fn new(store: DocumentStore) -> Self {
        Self { store }
    }

    /// Expire pending holds of the stored document whose deadline passed at
    /// `now`. Returns the number of reservations expired.
    pub async fn sweep_once(&self, now: DateTime<Utc>) -> usize {
        let doc = match self.store.document().await {
            Ok((doc, _)) => doc,
            Err(e) => {
                tracing::error!(error = %e, "document load failed, skipping sweep");
                return 0;
            }
        };

        let Some((patch, count)) = expiry_patch(&doc, now) else {
            return 0;
        };
        match self.store.commit(&patch).await {
            Ok(snapshot) => {
                tracing::info!(count, rev = snapshot.rev, "expired pending reservations");
                count
            }
            Err(e) => {
                tracing::error!(error = %e, "expiry write failed");
                0
            }
        }
    }

    /// Start the sweep loop.
    pub fn spawn(self: &Arc<Self>, every: Duration) -> SyncHandles {
        let sweeper = Arc::clone(self);
        let sweep = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                sweeper.sweep_once(Utc::now()).await;
            }
        });

        SyncHandles { tasks: vec![sweep] }
    }
}

fn expiry_patch(doc: &Document, now: DateTime<Utc>) -> Option<(Value, usize)> {
    match booking::expire_pending(doc, now) {
        Ok(found) => found,
        Err(e) => {
            tracing::warn!(error = %e, "could not build expiry patch");
            None
        }
    }
}

/// Running background loops. Dropping the handles aborts them.
pub struct SyncHandles {
    tasks: Vec<JoinHandle<()>>,
}

impl SyncHandles {
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

impl Drop for SyncHandles {
    fn drop(&mut self) {
        self.abort();
    }
}
