use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use meshstore_common::{is_embedding_key, Result};
use tracing::debug;

use crate::key_format::{composite_key, parse_embedding};
use crate::traits::{DocumentFields, FieldValue, MemoryStore, VectorSearchProvider};

/// Fast KV role in a hybrid topology. Delegates all storage to a boxed
/// `VectorSearchProvider`; the store itself only knows the small-document
/// shape (`{sessionId, key, value, timestamp, embedding?}`) and the
/// composite-key addressing scheme.
pub struct CacheStore {
    provider: Arc<dyn VectorSearchProvider>,
    initialized: AtomicBool,
}

impl CacheStore {
    pub fn new(provider: Arc<dyn VectorSearchProvider>) -> Self {
        Self {
            provider,
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl MemoryStore for CacheStore {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.provider.initialize().await
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let composite = composite_key(session_id, key);
        debug!(session_id, key, "saving entry via cache provider");

        let mut fields = DocumentFields::new();
        fields.insert("sessionId".to_string(), FieldValue::Text(session_id.to_string()));
        fields.insert("key".to_string(), FieldValue::Text(key.to_string()));
        fields.insert("value".to_string(), FieldValue::Text(value.to_string()));
        fields.insert(
            "timestamp".to_string(),
            FieldValue::Number(chrono::Utc::now().timestamp() as f64),
        );

        if is_embedding_key(key) {
            if let Some(vector) = parse_embedding(value) {
                fields.insert("embedding".to_string(), FieldValue::Vector(vector));
            }
        }

        self.provider.save_document(&composite, fields).await
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let composite = composite_key(session_id, key);
        self.provider.get_document_value(&composite, "value").await
    }

    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let query = match parse_embedding(embedding_json) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        self.provider.query_similar(&query, threshold).await
    }
}
