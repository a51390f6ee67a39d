use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use meshstore_common::Result;
use parking_lot::RwLock;
use tracing::warn;

use crate::key_format::{composite_key, is_embedding_key, parse_embedding};
use crate::similarity::top_similar;
use crate::traits::MemoryStore;

/// Process-local, non-persisted backend. No external dependency, so it
/// doubles as the reference implementation for tests and as the simplest
/// possible `StoreType::InMemory` configuration.
pub struct InMemoryStore {
    values: RwLock<HashMap<String, String>>,
    embeddings: RwLock<HashMap<String, Vec<f32>>>,
    initialized: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            values: RwLock::new(HashMap::new()),
            embeddings: RwLock::new(HashMap::new()),
            initialized: AtomicBool::new(false),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Number of distinct `(session_id, key)` pairs currently held.
    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every value and embedding. Exposed for test determinism
    /// between scenarios that reuse the same store instance.
    pub fn clear(&self) {
        self.values.write().clear();
        self.embeddings.write().clear();
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn initialize(&self) -> Result<()> {
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let composite = composite_key(session_id, key);

        if is_embedding_key(key) {
            match parse_embedding(value) {
                Some(vector) => {
                    self.embeddings.write().insert(composite.clone(), vector);
                }
                None => warn!(key, "value for embedding key is not a JSON float array"),
            }
        }

        self.values.write().insert(composite, value.to_string());
        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let composite = composite_key(session_id, key);
        Ok(self.values.read().get(&composite).cloned().unwrap_or_default())
    }

    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let query = match parse_embedding(embedding_json) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let values = self.values.read();
        let embeddings = self.embeddings.read();

        let candidates = embeddings.iter().map(|(k, v)| (k.clone(), v.clone()));
        let matches = top_similar(&query, candidates, threshold);

        Ok(matches
            .into_iter()
            .filter_map(|(key, _)| values.get(&key).cloned())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();
        store.save("session-a", "greeting", "hello").await.unwrap();

        assert_eq!(store.get("session-a", "greeting").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn get_on_missing_pair_returns_empty_string() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();

        assert_eq!(store.get("session-a", "nope").await.unwrap(), "");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();
        store.save("session-a", "key", "value-a").await.unwrap();
        store.save("session-b", "key", "value-b").await.unwrap();

        assert_eq!(store.get("session-a", "key").await.unwrap(), "value-a");
        assert_eq!(store.get("session-b", "key").await.unwrap(), "value-b");
    }

    #[tokio::test]
    async fn query_similar_returns_matches_above_threshold() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();

        store
            .save("session-a", "doc1_embedding", "[1.0, 0.0]")
            .await
            .unwrap();
        store
            .save("session-a", "doc2_embedding", "[0.0, 1.0]")
            .await
            .unwrap();

        let results = store.query_similar("[1.0, 0.0]", 0.9).await.unwrap();
        assert_eq!(results, vec!["[1.0, 0.0]".to_string()]);
    }

    #[tokio::test]
    async fn query_similar_with_malformed_json_returns_empty() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();

        let results = store.query_similar("not json", 0.0).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn clear_resets_len_to_zero() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();
        store.save("session-a", "key", "value").await.unwrap();
        assert_eq!(store.len(), 1);

        store.clear();
        assert_eq!(store.len(), 0);
        assert!(store.is_empty());
        assert_eq!(store.get("session-a", "key").await.unwrap(), "");
    }

    #[tokio::test]
    async fn save_with_non_array_value_on_embedding_key_still_saves_value() {
        let store = InMemoryStore::new();
        store.initialize().await.unwrap();

        store
            .save("session-a", "note_embedding", "not an embedding")
            .await
            .unwrap();

        assert_eq!(
            store.get("session-a", "note_embedding").await.unwrap(),
            "not an embedding"
        );
    }
}
