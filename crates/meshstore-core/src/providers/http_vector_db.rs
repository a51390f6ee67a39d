use meshstore_common::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::similarity::MAX_RESULTS;
use crate::traits::{DocumentFields, FieldValue, VectorSearchProvider};

/// Milvus-style HTTP vector-DB provider. Issues the Milvus v2 REST
/// endpoints (`collections/list`, `collections/create`, `entities/insert`,
/// `entities/search`, `entities/query`); client shape is a
/// `reqwest`-client-plus-typed-payload struct, the same shape used for
/// this crate's other HTTP-backed providers.
pub struct HttpVectorDbProvider {
    client: reqwest::Client,
    base_url: String,
    collection_name: String,
    dimension: usize,
    bearer_token: Option<String>,
}

impl HttpVectorDbProvider {
    pub fn new(
        base_url: impl Into<String>,
        collection_name: impl Into<String>,
        dimension: usize,
        bearer_token: Option<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            collection_name: collection_name.into(),
            dimension,
            bearer_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{path}", self.base_url.trim_end_matches('/'))
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl VectorSearchProvider for HttpVectorDbProvider {
    async fn initialize(&self) -> Result<()> {
        let list_response = self
            .request(reqwest::Method::POST, "collections/list")
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| Error::Initialization(format!("failed to list collections: {e}")))?;

        let list: ListCollectionsResponse = list_response
            .json()
            .await
            .map_err(|e| Error::Initialization(format!("failed to parse collection list: {e}")))?;

        if list.data.iter().any(|name| name == &self.collection_name) {
            return Ok(());
        }

        let create_body = json!({
            "collectionName": self.collection_name,
            "dimension": self.dimension,
            "metricType": "COSINE",
        });

        let response = self
            .request(reqwest::Method::POST, "collections/create")
            .json(&create_body)
            .send()
            .await
            .map_err(|e| Error::Initialization(format!("failed to create collection: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Initialization(format!(
                "collection create failed: status={status}, body={body}"
            )));
        }

        info!(
            collection = self.collection_name,
            dimension = self.dimension,
            "created milvus collection"
        );
        Ok(())
    }

    async fn save_document(&self, composite_key: &str, fields: DocumentFields) -> Result<()> {
        let vector = fields
            .get("embedding")
            .and_then(|v| v.as_vector())
            .ok_or_else(|| Error::Configuration("document has no embedding field".into()))?;

        let value = fields.get("value").and_then(|v| v.as_text()).unwrap_or_default();

        let mut data = serde_json::Map::new();
        data.insert("id".to_string(), json!(composite_key));
        data.insert("vector".to_string(), json!(vector));
        data.insert("value".to_string(), json!(value));
        for (name, field) in &fields {
            if name == "embedding" || name == "value" {
                continue;
            }
            if let FieldValue::Text(s) = field {
                data.insert(name.clone(), json!(s));
            }
        }

        let body = json!({
            "collectionName": self.collection_name,
            "data": [data],
        });

        debug!(composite_key, "inserting entity into milvus collection");
        let response = self
            .request(reqwest::Method::POST, "entities/insert")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("entity insert failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::BackendIo(format!(
                "entity insert error: status={status}, body={body}"
            )));
        }

        Ok(())
    }

    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String> {
        let body = json!({
            "collectionName": self.collection_name,
            "filter": format!("id == \"{composite_key}\""),
            "outputFields": [field],
        });

        let response = self
            .request(reqwest::Method::POST, "entities/query")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("entity query failed: {e}")))?;

        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse entity query response: {e}")))?;

        Ok(parsed
            .data
            .into_iter()
            .next()
            .and_then(|mut row| row.remove(field))
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>> {
        let body = json!({
            "collectionName": self.collection_name,
            "data": [vector],
            "annsField": "vector",
            "limit": MAX_RESULTS,
            "searchParams": { "radius": threshold, "metricType": "COSINE" },
            "outputFields": ["value"],
        });

        let response = self
            .request(reqwest::Method::POST, "entities/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::BackendIo(format!("entity search failed: {e}")))?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| Error::BackendIo(format!("failed to parse entity search response: {e}")))?;

        Ok(parsed
            .data
            .into_iter()
            .flatten()
            .filter_map(|mut row| row.remove("value").and_then(|v| v.as_str().map(str::to_string)))
            .take(MAX_RESULTS)
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct ListCollectionsResponse {
    data: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    data: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    data: Vec<Vec<serde_json::Map<String, serde_json::Value>>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_base_and_path() {
        let provider = HttpVectorDbProvider::new("http://localhost:19530", "mesh", 384, None);
        assert_eq!(
            provider.url("entities/search"),
            "http://localhost:19530/v2/vectordb/entities/search"
        );
    }

    #[test]
    fn url_strips_trailing_slash_from_base() {
        let provider = HttpVectorDbProvider::new("http://localhost:19530/", "mesh", 384, None);
        assert_eq!(
            provider.url("collections/list"),
            "http://localhost:19530/v2/vectordb/collections/list"
        );
    }
}
