//! Abstract transactional key-value document store. The consumer (C11)
//! and shadow executor (C10) are written against this trait; the only
//! implementation here is an in-process `dashmap`, but the trait is the
//! seam a real Firestore-backed (or any other) store would plug into.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{PlatformError, Result};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a document by key. `Ok(None)` means it does not exist.
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Value>>;

    /// Creates a document, failing with [`PlatformError::AlreadyExists`]
    /// if one already exists at `doc_id`. Callers use this for
    /// idempotent-create semantics (C10's shadow fills, C11's dedupe docs).
    async fn create(&self, collection: &str, doc_id: &str, value: Value) -> Result<()>;

    /// Runs `f` against the current value (`None` if absent) under a
    /// per-key lock, writing back whatever `f` returns. This is the
    /// optimistic-transaction seam C11's LWW upsert and dedupe docs need;
    /// the in-memory implementation below serializes per key instead of
    /// using real optimistic concurrency, which is sufficient since there
    /// is only one process.
    async fn run_transaction(
        &self,
        collection: &str,
        doc_id: &str,
        f: Box<dyn FnOnce(Option<Value>) -> Result<Value> + Send>,
    ) -> Result<Value>;
}

#[derive(Clone, Default)]
pub struct InMemoryDocumentStore {
    collections: Arc<DashMap<String, Arc<Mutex<std::collections::HashMap<String, Value>>>>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn collection(&self, name: &str) -> Arc<Mutex<std::collections::HashMap<String, Value>>> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(std::collections::HashMap::new())))
            .clone()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Value>> {
        let map = self.collection(collection);
        let guard = map.lock().await;
        Ok(guard.get(doc_id).cloned())
    }

    async fn create(&self, collection: &str, doc_id: &str, value: Value) -> Result<()> {
        let map = self.collection(collection);
        let mut guard = map.lock().await;
        if guard.contains_key(doc_id) {
            return Err(PlatformError::AlreadyExists(format!(
                "{collection}/{doc_id}"
            )));
        }
        guard.insert(doc_id.to_string(), value);
        Ok(())
    }

    async fn run_transaction(
        &self,
        collection: &str,
        doc_id: &str,
        f: Box<dyn FnOnce(Option<Value>) -> Result<Value> + Send>,
    ) -> Result<Value> {
        let map = self.collection(collection);
        let mut guard = map.lock().await;
        let existing = guard.get(doc_id).cloned();
        let next = f(existing)?;
        guard.insert(doc_id.to_string(), next.clone());
        Ok(next)
    }
}
