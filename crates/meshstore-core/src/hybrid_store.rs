use std::sync::Arc;

use async_trait::async_trait;
use meshstore_common::Result;
use tracing::debug;

use crate::traits::MemoryStore;

/// Composition of exactly one persistent `MemoryStore` and one cache
/// `MemoryStore`, with `tokio::join!` driving parallel dual-write and
/// parallel init across the two owned children, and fallback-on-miss reads
/// between them.
pub struct HybridStore {
    persistent: Arc<dyn MemoryStore>,
    cache: Arc<dyn MemoryStore>,
    prefer_cache_for_retrieval: bool,
}

impl HybridStore {
    pub fn new(
        persistent: Arc<dyn MemoryStore>,
        cache: Arc<dyn MemoryStore>,
        prefer_cache_for_retrieval: bool,
    ) -> Self {
        Self {
            persistent,
            cache,
            prefer_cache_for_retrieval,
        }
    }
}

#[async_trait]
impl MemoryStore for HybridStore {
    /// Initializes both children in parallel; if either fails, the hybrid
    /// fails and the first error observed propagates.
    async fn initialize(&self) -> Result<()> {
        let (persistent, cache) = tokio::join!(self.persistent.initialize(), self.cache.initialize());
        persistent?;
        cache?;
        Ok(())
    }

    /// Writes to both children concurrently and awaits both. There is no
    /// compensation on partial failure — callers are expected to retry the
    /// whole call.
    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        debug!(session_id, key, "dual-writing to hybrid store");
        let (persistent, cache) = tokio::join!(
            self.persistent.save(session_id, key, value),
            self.cache.save(session_id, key, value)
        );
        persistent?;
        cache?;
        Ok(())
    }

    /// Reads the preferred layer first; an empty result (not an error)
    /// falls back to the other layer. A read error from either layer
    /// propagates immediately — fallback only covers "not found".
    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let (preferred, fallback): (&dyn MemoryStore, &dyn MemoryStore) = if self.prefer_cache_for_retrieval {
            (self.cache.as_ref(), self.persistent.as_ref())
        } else {
            (self.persistent.as_ref(), self.cache.as_ref())
        };

        let value = preferred.get(session_id, key).await?;
        if !value.is_empty() {
            return Ok(value);
        }

        fallback.get(session_id, key).await
    }

    /// Always tries the cache first — cache backends own the vector index
    /// in hybrid topologies. An empty sequence falls back to persistent;
    /// errors propagate immediately.
    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let results = self.cache.query_similar(embedding_json, threshold).await?;
        if !results.is_empty() {
            return Ok(results);
        }

        self.persistent.query_similar(embedding_json, threshold).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::in_memory_store::InMemoryStore;

    fn hybrid(prefer_cache: bool) -> (HybridStore, Arc<InMemoryStore>, Arc<InMemoryStore>) {
        let persistent = Arc::new(InMemoryStore::new());
        let cache = Arc::new(InMemoryStore::new());
        let store = HybridStore::new(persistent.clone(), cache.clone(), prefer_cache);
        (store, persistent, cache)
    }

    #[tokio::test]
    async fn dual_write_is_visible_on_both_children() {
        let (store, persistent, cache) = hybrid(false);
        store.initialize().await.unwrap();

        store.save("h", "k1", "persisted").await.unwrap();

        assert_eq!(persistent.get("h", "k1").await.unwrap(), "persisted");
        assert_eq!(cache.get("h", "k1").await.unwrap(), "persisted");
    }

    #[tokio::test]
    async fn falls_back_to_persistent_after_cache_is_cleared() {
        let (store, persistent, cache) = hybrid(true);
        store.initialize().await.unwrap();

        store.save("h", "k1", "persisted").await.unwrap();
        // Simulate cache eviction by writing directly to the persistent
        // child only and clearing the cache's view of this key.
        cache.save("h", "k1", "").await.unwrap();
        persistent.save("h", "k1", "persisted").await.unwrap();

        assert_eq!(store.get("h", "k1").await.unwrap(), "persisted");
    }

    #[tokio::test]
    async fn cache_first_preference_selects_cache_value_when_both_diverge() {
        let (store, persistent, cache) = hybrid(true);
        store.initialize().await.unwrap();

        persistent.save("h", "k1", "persistent-value").await.unwrap();
        cache.save("h", "k1", "cache-value").await.unwrap();

        assert_eq!(store.get("h", "k1").await.unwrap(), "cache-value");
    }

    #[tokio::test]
    async fn persistent_first_preference_selects_persistent_value_when_both_diverge() {
        let (store, persistent, cache) = hybrid(false);
        store.initialize().await.unwrap();

        persistent.save("h", "k1", "persistent-value").await.unwrap();
        cache.save("h", "k1", "cache-value").await.unwrap();

        assert_eq!(store.get("h", "k1").await.unwrap(), "persistent-value");
    }

    #[tokio::test]
    async fn query_similar_falls_back_to_persistent_when_cache_is_empty() {
        let (store, persistent, _cache) = hybrid(true);
        store.initialize().await.unwrap();

        persistent
            .save("q", "doc1_embedding", "[1.0, 0.0]")
            .await
            .unwrap();

        let results = store.query_similar("[1.0, 0.0]", 0.9).await.unwrap();
        assert_eq!(results, vec!["[1.0, 0.0]".to_string()]);
    }

    #[tokio::test]
    async fn initialize_is_idempotent() {
        let (store, _persistent, _cache) = hybrid(false);
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();
    }
}
