use async_trait::async_trait;
use meshstore_common::{Error, Result};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::similarity::MAX_RESULTS;
use crate::traits::{DocumentFields, FieldValue, VectorSearchProvider};

/// AI-native HTTP provider (Chroma-style). Creates or reuses a collection
/// with `hnsw:space=cosine` metadata, upserts parallel
/// `ids/embeddings/documents/metadatas` arrays, and converts the
/// `distance` array Chroma returns into `similarity = 1 - distance`
/// before threshold filtering.
pub struct AiNativeProvider {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
    tenant: String,
    database: String,
    collection_handle: OnceCell<String>,
}

impl AiNativeProvider {
    pub fn new(base_url: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection_name: collection_name.into(),
            tenant: "default_tenant".to_string(),
            database: "default_database".to_string(),
            collection_handle: OnceCell::new(),
        }
    }

    fn collections_url(&self) -> String {
        format!(
            "{}/api/v2/tenants/{}/databases/{}/collections",
            self.base_url.trim_end_matches('/'),
            self.tenant,
            self.database
        )
    }

    async fn collection_id(&self) -> Result<&str> {
        self.collection_handle
            .get_or_try_init(|| async {
                let response = self
                    .client
                    .post(self.collections_url())
                    .json(&json!({
                        "name": self.collection_name,
                        "get_or_create": true,
                        "metadata": { "hnsw:space": "cosine" },
                    }))
                    .send()
                    .await
                    .map_err(|e| Error::Initialization(format!("failed to create collection: {e}")))?;

                if !response.status().is_success() {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    return Err(Error::Initialization(format!(
                        "collection create error: status={status}, body={body}"
                    )));
                }

                let collection: CollectionResponse = response
                    .json()
                    .await
                    .map_err(|e| Error::Initialization(format!("failed to parse collection response: {e}")))?;

                // Prefer `id`, falling back to `name` only when `id` is absent.
                let handle = collection.id.or(collection.name).ok_or_else(|| {
                    Error::Initialization("collection response had neither id nor name".into())
                })?;

                info!(collection = self.collection_name, handle, "resolved chroma collection");
                Ok(handle)
            })
            .await
            .map(String::as_str)
    }

    fn entries_url(&self, collection_id: &str, op: &str) -> String {
        format!("{}/{collection_id}/{op}", self.collections_url())
    }
}

#[async_trait]
impl VectorSearchProvider for AiNativeProvider {
    async fn initialize(&self) -> Result<()> {
        self.collection_id().await?;
        Ok(())
    }

    async fn save_document(&self, composite_key: &str, fields: DocumentFields) -> Result<()> {
        let vector = fields
            .get("embedding")
            .and_then(|v| v.as_vector())
            .ok_or_else(|| Error::Configuration("document has no embedding field".into()))?;

        let document_text = fields.get("value").and_then(|v| v.as_text()).unwrap_or_default();

        let mut metadata = serde_json::Map::new();
        for (name, field) in &fields {
            if name == "embedding" {
                continue;
            }
            match field {
                FieldValue::Text(s) => {
                    metadata.insert(name.clone(), json!(s));
                }
                FieldValue::Number(n) => {
                    metadata.insert(name.clone(), json!(n));
                }
                FieldValue::Vector(_) => {}
            }
        }

        let collection_id = self.collection_id().await?.to_string();
        let body = json!({
            "ids": [composite_key],
            "embeddings": [vector],
            "documents": [document_text],
            "metadatas": [metadata],
        });

        debug!(composite_key, "upserting chroma document");
        let response = self
            .client
            .post(self.entries_url(&collection_id, "upsert"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("chroma upsert failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendIo(format!(
                "chroma upsert error: status={status}, body={body}"
            )));
        }

        Ok(())
    }

    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String> {
        let collection_id = self.collection_id().await?.to_string();
        let body = json!({
            "ids": [composite_key],
            "include": ["documents", "metadatas"],
        });

        let response = self
            .client
            .post(self.entries_url(&collection_id, "get"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("chroma get failed: {e}")))?;

        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse chroma get response: {e}")))?;

        // `value` has no dedicated metadata slot in Chroma's schema — the
        // document body itself is the canonical source for that field name.
        if field == "value" {
            if let Some(doc) = parsed.documents.into_iter().flatten().next() {
                return Ok(doc);
            }
        }

        Ok(parsed
            .metadatas
            .into_iter()
            .flatten()
            .flatten()
            .next()
            .and_then(|meta| meta.get(field).and_then(|v| v.as_str().map(str::to_string)))
            .unwrap_or_default())
    }

    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>> {
        let collection_id = self.collection_id().await?.to_string();
        let body = json!({
            "query_embeddings": [vector],
            "n_results": MAX_RESULTS,
            "include": ["documents", "distances"],
        });

        let response = self
            .client
            .post(self.entries_url(&collection_id, "query"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("chroma query failed: {e}")))?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse chroma query response: {e}")))?;

        let documents = parsed.documents.into_iter().next().unwrap_or_default();
        let distances = parsed.distances.into_iter().next().unwrap_or_default();

        Ok(documents
            .into_iter()
            .zip(distances)
            .filter_map(|(doc, distance)| {
                let similarity = 1.0 - distance;
                if similarity >= threshold {
                    doc
                } else {
                    None
                }
            })
            .take(MAX_RESULTS)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct CollectionResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(default)]
    documents: Vec<Option<String>>,
    #[serde(default)]
    metadatas: Vec<Option<serde_json::Map<String, serde_json::Value>>>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    documents: Vec<Vec<Option<String>>>,
    #[serde(default)]
    distances: Vec<Vec<f32>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collections_url_nests_tenant_and_database() {
        let provider = AiNativeProvider::new("http://localhost:8000", "mesh");
        assert_eq!(
            provider.collections_url(),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections"
        );
    }

    #[test]
    fn entries_url_nests_collection_id_and_op() {
        let provider = AiNativeProvider::new("http://localhost:8000", "mesh");
        assert_eq!(
            provider.entries_url("abc-123", "query"),
            "http://localhost:8000/api/v2/tenants/default_tenant/databases/default_database/collections/abc-123/query"
        );
    }
}
