use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use meshstore_common::{is_embedding_key, Error, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::key_format::parse_embedding;
use crate::similarity::top_similar;
use crate::traits::MemoryStore;

/// Document shape for the cloud document service: id = `sessionId:key`,
/// partition key = `sessionId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServiceDocument {
    id: String,
    #[serde(rename = "sessionId")]
    session_id: String,
    #[serde(rename = "contextKey")]
    context_key: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    embedding: Option<Vec<f32>>,
    timestamp: String,
}

/// Cloud document service backend (Cosmos/DynamoDB-style: point read by
/// id + partition key, query-and-filter for anything else). Addresses a
/// REST facade in front of the document service via a
/// `reqwest`-client-plus-typed-payload struct, the same shape used for
/// this crate's other HTTP-backed stores.
pub struct DocumentServiceStore {
    client: reqwest::Client,
    base_url: String,
    container: String,
    api_key: Option<String>,
    initialized: AtomicBool,
}

impl DocumentServiceStore {
    pub fn new(base_url: impl Into<String>, container: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            container: container.into(),
            api_key,
            initialized: AtomicBool::new(false),
        }
    }

    fn document_url(&self, id: &str) -> String {
        format!(
            "{}/containers/{}/docs/{}",
            self.base_url.trim_end_matches('/'),
            self.container,
            id
        )
    }

    fn query_url(&self) -> String {
        format!(
            "{}/containers/{}/query",
            self.base_url.trim_end_matches('/'),
            self.container
        )
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("authorization", format!("Bearer {key}")),
            None => builder,
        }
    }

    fn document_id(session_id: &str, key: &str) -> String {
        format!("{session_id}:{key}")
    }
}

#[async_trait]
impl MemoryStore for DocumentServiceStore {
    async fn initialize(&self) -> Result<()> {
        // The document service container is provisioned out of band (IaC,
        // not this client); there is no schema to create here, only the
        // at-most-once init flag to flip.
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let id = Self::document_id(session_id, key);
        let embedding = if is_embedding_key(key) {
            match parse_embedding(value) {
                Some(v) => Some(v),
                None => {
                    warn!(key, "value for embedding key is not a JSON float array");
                    None
                }
            }
        } else {
            None
        };

        let doc = ServiceDocument {
            id: id.clone(),
            session_id: session_id.to_string(),
            context_key: key.to_string(),
            value: value.to_string(),
            embedding,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        debug!(session_id, key, "upserting document service entry");
        let response = self
            .authed(self.client.put(self.document_url(&id)))
            .query(&[("partitionKey", session_id)])
            .json(&doc)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("document service upsert failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendIo(format!(
                "document service upsert error: status={status}, body={body}"
            )));
        }

        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let id = Self::document_id(session_id, key);
        debug!(session_id, key, "point-reading document service entry");

        let response = self
            .authed(self.client.get(self.document_url(&id)))
            .query(&[("partitionKey", session_id)])
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("document service read failed: {e}")))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(String::new());
        }

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendIo(format!(
                "document service read error: status={status}, body={body}"
            )));
        }

        let doc: ServiceDocument = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse document service response: {e}")))?;

        Ok(doc.value)
    }

    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let query = match parse_embedding(embedding_json) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        // This backend owns no vector index, so every document carrying
        // an `embedding` field is fetched and scored in code. Use a
        // dedicated `VectorSearchProvider` instead when vector QPS matters.
        let response = self
            .authed(self.client.post(self.query_url()))
            .json(&serde_json::json!({ "filter": "has(embedding)" }))
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("document service query failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendIo(format!(
                "document service query error: status={status}, body={body}"
            )));
        }

        let docs: Vec<ServiceDocument> = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse document service query response: {e}")))?;

        let candidates = docs
            .iter()
            .filter_map(|d| d.embedding.as_ref().map(|e| (d.value.clone(), e.clone())));

        let matches = top_similar(&query, candidates, threshold);
        Ok(matches.into_iter().map(|(value, _)| value).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_nests_container_and_id() {
        let store = DocumentServiceStore::new("https://docs.example.com", "sessions", None);
        assert_eq!(
            store.document_url("alpha:note"),
            "https://docs.example.com/containers/sessions/docs/alpha:note"
        );
    }

    #[test]
    fn document_id_joins_session_and_key() {
        assert_eq!(
            DocumentServiceStore::document_id("alpha", "note"),
            "alpha:note"
        );
    }
}
