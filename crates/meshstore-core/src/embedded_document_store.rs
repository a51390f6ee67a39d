use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use meshstore_common::{is_embedding_key, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::key_format::parse_embedding;
use crate::similarity::top_similar;
use crate::traits::MemoryStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ContextDocument {
    session_id: String,
    key: String,
    value: String,
    created_at: String,
    updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EmbeddingDocument {
    session_id: String,
    key: String,
    vector: Vec<f32>,
    created_at: String,
}

/// Embedded NoSQL document store. Two `sled` trees stand in for the two
/// collections: `context` documents keyed by the unique
/// `sessionId:key` string, and an append-only `embeddings` tree keyed the
/// same way (each save overwrites the prior embedding document for that
/// pair — only a findable embedding per key is required, not full history).
pub struct EmbeddedDocumentStore {
    context: sled::Tree,
    embeddings: sled::Tree,
    initialized: AtomicBool,
}

impl EmbeddedDocumentStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| Error::Initialization(format!("failed to open document store: {e}")))?;
        Self::from_db(db)
    }

    pub fn temporary() -> Result<Self> {
        let config = sled::Config::new().temporary(true);
        let db = config
            .open()
            .map_err(|e| Error::Initialization(format!("failed to open temporary document store: {e}")))?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let context = db
            .open_tree("context")
            .map_err(|e| Error::Initialization(format!("failed to open context tree: {e}")))?;
        let embeddings = db
            .open_tree("embeddings")
            .map_err(|e| Error::Initialization(format!("failed to open embeddings tree: {e}")))?;

        Ok(Self {
            context,
            embeddings,
            initialized: AtomicBool::new(false),
        })
    }

    fn session_key(session_id: &str, key: &str) -> String {
        format!("{session_id}:{key}")
    }
}

#[async_trait]
impl MemoryStore for EmbeddedDocumentStore {
    async fn initialize(&self) -> Result<()> {
        // Trees already exist on construction (sled has no schema to create);
        // the flag still gives callers the documented idempotent-init contract.
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let session_key = Self::session_key(session_id, key);
        let now = Utc::now().to_rfc3339();

        let existing_created_at = self
            .context
            .get(session_key.as_bytes())
            .map_err(|e| Error::BackendIo(format!("failed to look up context document: {e}")))?
            .and_then(|bytes| serde_json::from_slice::<ContextDocument>(&bytes).ok())
            .map(|doc| doc.created_at);

        let doc = ContextDocument {
            session_id: session_id.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            created_at: existing_created_at.unwrap_or_else(|| now.clone()),
            updated_at: now.clone(),
        };

        let bytes = serde_json::to_vec(&doc)?;
        self.context
            .insert(session_key.as_bytes(), bytes)
            .map_err(|e| Error::BackendIo(format!("failed to insert context document: {e}")))?;

        if is_embedding_key(key) {
            match parse_embedding(value) {
                Some(vector) => {
                    let embedding_doc = EmbeddingDocument {
                        session_id: session_id.to_string(),
                        key: key.to_string(),
                        vector,
                        created_at: now,
                    };
                    let bytes = serde_json::to_vec(&embedding_doc)?;
                    self.embeddings
                        .insert(session_key.as_bytes(), bytes)
                        .map_err(|e| Error::BackendIo(format!("failed to insert embedding document: {e}")))?;
                }
                None => warn!(key, "value for embedding key is not a JSON float array"),
            }
        }

        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let session_key = Self::session_key(session_id, key);
        let doc = self
            .context
            .get(session_key.as_bytes())
            .map_err(|e| Error::BackendIo(format!("failed to read context document: {e}")))?;

        match doc {
            Some(bytes) => {
                let doc: ContextDocument = serde_json::from_slice(&bytes)?;
                Ok(doc.value)
            }
            None => Ok(String::new()),
        }
    }

    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let query = match parse_embedding(embedding_json) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let mut candidates = Vec::new();
        for kv in self.embeddings.iter() {
            let (session_key, bytes) =
                kv.map_err(|e| Error::BackendIo(format!("failed to scan embedding documents: {e}")))?;
            match serde_json::from_slice::<EmbeddingDocument>(&bytes) {
                Ok(doc) => {
                    let session_key = String::from_utf8_lossy(&session_key).into_owned();
                    candidates.push((session_key, doc.vector));
                }
                Err(_) => warn!("skipping corrupt embedding document"),
            }
        }

        let matches = top_similar(&query, candidates, threshold);

        let mut values = Vec::with_capacity(matches.len());
        for (session_key, _) in matches {
            if let Some(bytes) = self
                .context
                .get(session_key.as_bytes())
                .map_err(|e| Error::BackendIo(format!("failed to join context document: {e}")))?
            {
                let doc: ContextDocument = serde_json::from_slice(&bytes)?;
                values.push(doc.value);
            }
        }

        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        store.save("session-a", "greeting", "hello").await.unwrap();
        assert_eq!(store.get("session-a", "greeting").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn get_on_missing_pair_returns_empty_string() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        assert_eq!(store.get("session-a", "nope").await.unwrap(), "");
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        store.save("session-a", "key", "first").await.unwrap();
        store.save("session-a", "key", "second").await.unwrap();

        assert_eq!(store.get("session-a", "key").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn sessions_are_isolated() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        store.save("session-a", "key", "value-a").await.unwrap();
        store.save("session-b", "key", "value-b").await.unwrap();

        assert_eq!(store.get("session-a", "key").await.unwrap(), "value-a");
        assert_eq!(store.get("session-b", "key").await.unwrap(), "value-b");
    }

    #[tokio::test]
    async fn query_similar_matches_embedding_entries() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        store
            .save("session-a", "doc1_embedding", "[1.0, 0.0]")
            .await
            .unwrap();
        store
            .save("session-a", "doc2_embedding", "[0.0, 1.0]")
            .await
            .unwrap();
        store.save("session-a", "note", "[1.0, 0.0]").await.unwrap();

        let results = store.query_similar("[1.0, 0.0]", 0.9).await.unwrap();
        assert_eq!(results, vec!["[1.0, 0.0]".to_string()]);
    }

    #[tokio::test]
    async fn query_similar_with_malformed_json_returns_empty() {
        let store = EmbeddedDocumentStore::temporary().expect("failed to open temp store");
        store.initialize().await.unwrap();

        let results = store.query_similar("not json", 0.0).await.unwrap();
        assert!(results.is_empty());
    }
}
