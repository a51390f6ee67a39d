use std::path::PathBuf;
use std::sync::Arc;

use meshstore_common::{Error, Result};
use meshstore_config::{MeshConfig, StoreType, VectorSearchProviderKind};

use crate::cache_store::CacheStore;
use crate::document_service_store::DocumentServiceStore;
use crate::embedded_document_store::EmbeddedDocumentStore;
use crate::embedded_file_store::EmbeddedFileStore;
use crate::hybrid_store::HybridStore;
use crate::in_memory_store::InMemoryStore;
use crate::relational_vector_store::RelationalVectorStore;
use crate::traits::{MemoryStore, VectorSearchProvider};

/// Resolves a `MeshConfig` into a single boxed `MemoryStore`. Never
/// exposes the concrete backend type to the caller — every branch returns
/// `Arc<dyn MemoryStore>`.
pub struct StoreFactory;

impl StoreFactory {
    pub async fn build(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
        match config.store_type {
            StoreType::Hybrid => {
                let persistent = build_embedded_file_store(config)?;
                let cache = build_cache_store(config)?;
                Ok(Arc::new(HybridStore::new(
                    persistent,
                    cache,
                    config.prefer_cache_for_retrieval,
                )))
            }
            StoreType::EmbeddedFile => Ok(build_embedded_file_store(config)?),
            StoreType::EmbeddedDoc => Ok(build_embedded_document_store(config)?),
            StoreType::Relational => Ok(build_relational_store(config)?),
            StoreType::DocumentService => Ok(build_document_service_store(config)?),
            StoreType::Cache => Ok(build_cache_store(config)?),
            StoreType::InMemory => Ok(Arc::new(InMemoryStore::new())),
        }
    }
}

fn build_embedded_file_store(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
    let store = match &config.file_path {
        Some(path) => EmbeddedFileStore::open(&PathBuf::from(path))?,
        None => EmbeddedFileStore::in_memory()?,
    };
    Ok(Arc::new(store))
}

fn build_embedded_document_store(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
    let store = match &config.file_path {
        Some(path) => EmbeddedDocumentStore::open(&PathBuf::from(path))?,
        None => EmbeddedDocumentStore::temporary()?,
    };
    Ok(Arc::new(store))
}

fn build_relational_store(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
    let store = match &config.connection_string {
        Some(path) => RelationalVectorStore::open(&PathBuf::from(path), config.vector_dimension)?,
        None => RelationalVectorStore::in_memory(config.vector_dimension)?,
    };
    Ok(Arc::new(store))
}

fn build_document_service_store(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
    let endpoint = config
        .endpoint
        .clone()
        .or_else(|| config.host.clone())
        .ok_or_else(|| Error::Configuration("documentService store requires an endpoint or host".into()))?;
    let container = config
        .collection_name
        .clone()
        .unwrap_or_else(|| "context".to_string());

    Ok(Arc::new(DocumentServiceStore::new(
        endpoint,
        container,
        config.api_key.clone(),
    )))
}

fn build_cache_store(config: &MeshConfig) -> Result<Arc<dyn MemoryStore>> {
    let provider = build_vector_search_provider(config)?;
    Ok(Arc::new(CacheStore::new(provider)))
}

fn build_vector_search_provider(config: &MeshConfig) -> Result<Arc<dyn VectorSearchProvider>> {
    match config.vector_search_provider {
        VectorSearchProviderKind::Cache => build_cache_native_provider(config),
        VectorSearchProviderKind::VectorDb => build_vector_db_provider(config),
        VectorSearchProviderKind::Relational => {
            let store = match &config.connection_string {
                Some(path) => RelationalVectorStore::open(&PathBuf::from(path), config.vector_dimension)?,
                None => RelationalVectorStore::in_memory(config.vector_dimension)?,
            };
            Ok(Arc::new(store))
        }
        VectorSearchProviderKind::HttpVectorDb => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| Error::Configuration("httpVectorDb provider requires an endpoint".into()))?;
            let collection = config
                .collection_name
                .clone()
                .unwrap_or_else(|| "mesh".to_string());
            Ok(Arc::new(crate::providers::HttpVectorDbProvider::new(
                endpoint,
                collection,
                config.vector_dimension,
                config.api_key.clone(),
            )))
        }
        VectorSearchProviderKind::AiNative => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| Error::Configuration("aiNative provider requires an endpoint".into()))?;
            let collection = config
                .collection_name
                .clone()
                .unwrap_or_else(|| "mesh".to_string());
            Ok(Arc::new(crate::providers::AiNativeProvider::new(endpoint, collection)))
        }
    }
}

#[cfg(feature = "provider-redis")]
fn build_cache_native_provider(config: &MeshConfig) -> Result<Arc<dyn VectorSearchProvider>> {
    let host = config
        .host
        .clone()
        .unwrap_or_else(|| "redis://127.0.0.1:6379".to_string());
    let collection = config
        .collection_name
        .clone()
        .unwrap_or_else(|| "mesh_idx".to_string());
    Ok(Arc::new(crate::providers::CacheNativeProvider::new(
        &host,
        collection,
        config.vector_dimension,
    )?))
}

#[cfg(not(feature = "provider-redis"))]
fn build_cache_native_provider(_config: &MeshConfig) -> Result<Arc<dyn VectorSearchProvider>> {
    Err(Error::Configuration(
        "cache vector search provider requires the provider-redis feature".into(),
    ))
}

#[cfg(feature = "provider-qdrant")]
fn build_vector_db_provider(config: &MeshConfig) -> Result<Arc<dyn VectorSearchProvider>> {
    let url = config
        .endpoint
        .clone()
        .or_else(|| config.host.clone())
        .ok_or_else(|| Error::Configuration("vectorDb provider requires an endpoint or host".into()))?;
    let collection = config
        .collection_name
        .clone()
        .unwrap_or_else(|| "mesh".to_string());
    Ok(Arc::new(crate::providers::VectorDbProvider::new(
        &url,
        collection,
        config.vector_dimension,
    )?))
}

#[cfg(not(feature = "provider-qdrant"))]
fn build_vector_db_provider(_config: &MeshConfig) -> Result<Arc<dyn VectorSearchProvider>> {
    Err(Error::Configuration(
        "vectorDb provider requires the provider-qdrant feature".into(),
    ))
}
