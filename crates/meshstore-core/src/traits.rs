use std::collections::HashMap;

use async_trait::async_trait;
use meshstore_common::Result;

/// The central abstraction every higher layer consumes. Implementors must be
/// `Send + Sync` so a single instance can be shared behind an `Arc` across
/// concurrently-running tasks; the trait is object-safe so `StoreFactory`
/// returns `Box<dyn MemoryStore>` without exposing the concrete backend.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Idempotent, at-most-once-effective lazy initialization (schema/index/
    /// collection creation). The second and subsequent calls are no-ops.
    async fn initialize(&self) -> Result<()>;

    /// Upsert on `(session_id, key)`. If `value` parses as a JSON array of
    /// floats and `key` contains the substring `"embedding"` (case
    /// insensitive), an embedding entry is also recorded. A parse failure on
    /// the embedding side is a logged warning, never a failure of the save.
    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()>;

    /// Returns the most recently written value for `(session_id, key)`, or
    /// the empty string if the pair was never written. Empty string is the
    /// canonical absent value — never a sentinel `None` across this boundary.
    async fn get(&self, session_id: &str, key: &str) -> Result<String>;

    /// Returns up to 10 values whose associated embedding has cosine
    /// similarity `>= threshold` against the query vector encoded in
    /// `embedding_json`, most similar first. Malformed JSON returns an empty
    /// sequence rather than an error.
    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>>;
}

/// The sum type a `VectorSearchProvider` document field can hold. Concrete
/// providers project this onto their native payload shape (Redis hash field,
/// Qdrant payload value, JSON property, ...).
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Vector(Vec<f32>),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            FieldValue::Vector(v) => Some(v),
            _ => None,
        }
    }
}

pub type DocumentFields = HashMap<String, FieldValue>;

/// Narrower abstraction implemented by backends capable of ANN/KNN queries
/// over vectors. `CacheStore` delegates entirely to one of these; the
/// dimension-bound backends (relational, dedicated vector DB) also implement
/// `MemoryStore` directly and reuse this trait for their search surface.
#[async_trait]
pub trait VectorSearchProvider: Send + Sync {
    /// Ensures the backing index/collection exists with the configured
    /// dimension and cosine metric. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// Upserts a document under `composite_key`. If `fields` contains an
    /// `"embedding"` field holding a `Vector`, it is indexed for search.
    async fn save_document(&self, composite_key: &str, fields: DocumentFields) -> Result<()>;

    /// Returns a named field's value as a string, or empty if the document
    /// or field does not exist.
    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String>;

    /// Returns up to 10 values (the `"value"` field of matching documents)
    /// with similarity `>= threshold`, ordered best first.
    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>>;
}
