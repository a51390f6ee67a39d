use serde::{Deserialize, Serialize};

/// Which concrete `MemoryStore` the factory should build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StoreType {
    Hybrid,
    EmbeddedFile,
    EmbeddedDoc,
    Relational,
    DocumentService,
    Cache,
    InMemory,
}

impl Default for StoreType {
    fn default() -> Self {
        Self::Hybrid
    }
}

/// Which `VectorSearchProvider` backs `CacheStore` (and hybrid topologies).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VectorSearchProviderKind {
    Cache,
    VectorDb,
    Relational,
    HttpVectorDb,
    AiNative,
}

impl Default for VectorSearchProviderKind {
    /// `Relational` (always buildable, no optional client crate) rather
    /// than `Cache`/`VectorDb` — those require the `provider-redis` /
    /// `provider-qdrant` features, so defaulting to either would make the
    /// factory's own default `MeshConfig` unbuildable out of the box.
    fn default() -> Self {
        Self::Relational
    }
}

/// Configuration consumed by `StoreFactory::build`. Every field is optional
/// and `#[serde(default)]`, so an unrecognized or partially-specified
/// document never fails to parse — unknown fields are ignored by construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeshConfig {
    #[serde(default)]
    pub store_type: StoreType,

    #[serde(default)]
    pub vector_search_provider: VectorSearchProviderKind,

    #[serde(default)]
    pub prefer_cache_for_retrieval: bool,

    /// Dimension for dimension-bound backends (relational native index, vector DB).
    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,

    /// Filesystem path for `EmbeddedFileStore` / `EmbeddedDocumentStore`.
    #[serde(default)]
    pub file_path: Option<String>,

    /// Connection string for `RelationalVectorStore`.
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Host/port/endpoint for network-backed providers (cache, vector DB,
    /// HTTP Milvus-style, AI-native Chroma-style, document service).
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub collection_name: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_vector_dimension() -> usize {
    384
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            vector_search_provider: VectorSearchProviderKind::default(),
            prefer_cache_for_retrieval: false,
            vector_dimension: default_vector_dimension(),
            file_path: None,
            connection_string: None,
            host: None,
            port: None,
            endpoint: None,
            collection_name: None,
            api_key: None,
        }
    }
}
