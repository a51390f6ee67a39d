use std::sync::Arc;

use meshstore_core::{EmbeddedFileStore, HybridStore, InMemoryStore, MemoryStore};

#[tokio::test]
async fn s1_in_memory_round_trip() {
    let store = InMemoryStore::new();
    store.initialize().await.unwrap();

    store.save("alpha", "note", "hello world").await.unwrap();
    assert_eq!(store.get("alpha", "note").await.unwrap(), "hello world");

    store.save("alpha", "note", "hi").await.unwrap();
    assert_eq!(store.get("alpha", "note").await.unwrap(), "hi");
}

#[tokio::test]
async fn s2_cosine_ordering() {
    let store = InMemoryStore::new();
    store.initialize().await.unwrap();

    store.save("q", "doc1_embedding", "[1,0,0]").await.unwrap();
    store.save("q", "doc2_embedding", "[0.9,0.1,0]").await.unwrap();
    store.save("q", "doc3_embedding", "[0,1,0]").await.unwrap();

    let results = store.query_similar("[1,0,0]", 0.5).await.unwrap();
    assert_eq!(results, vec!["[1,0,0]".to_string(), "[0.9,0.1,0]".to_string()]);
}

#[tokio::test]
async fn s3_threshold_excludes_all() {
    let store = InMemoryStore::new();
    store.initialize().await.unwrap();

    store.save("q", "doc1_embedding", "[1,0,0]").await.unwrap();
    store.save("q", "doc2_embedding", "[0.9,0.1,0]").await.unwrap();
    store.save("q", "doc3_embedding", "[0,1,0]").await.unwrap();

    let results = store.query_similar("[0,0,1]", 0.5).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn s4_hybrid_fallback_after_cache_flush() {
    let persistent = Arc::new(EmbeddedFileStore::in_memory().unwrap());
    let cache = Arc::new(InMemoryStore::new());
    let hybrid = HybridStore::new(persistent.clone(), cache.clone(), true);
    hybrid.initialize().await.unwrap();

    hybrid.save("h", "k1", "persisted").await.unwrap();
    cache.clear();

    assert_eq!(hybrid.get("h", "k1").await.unwrap(), "persisted");
}

#[tokio::test]
async fn s5_embedding_warning_does_not_fail_the_write() {
    let store = InMemoryStore::new();
    store.initialize().await.unwrap();

    store.save("w", "user_embedding", "not-json").await.unwrap();

    assert_eq!(store.get("w", "user_embedding").await.unwrap(), "not-json");
    let results = store.query_similar("[1,0,0]", 0.0).await.unwrap();
    assert!(!results.contains(&"not-json".to_string()));
}

#[tokio::test]
async fn s6_concurrent_upserts_on_the_same_key() {
    let store = Arc::new(InMemoryStore::new());
    store.initialize().await.unwrap();

    let mut handles = Vec::new();
    for i in 0..50 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.save("c", "k", &format!("v_{i}")).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let value = store.get("c", "k").await.unwrap();
    assert!(value.starts_with("v_"));
    assert_eq!(store.len(), 1);
}
