use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use meshstore_common::{Error, Result};
use qdrant_client::qdrant::{
    vectors_config::Config, CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value as QdrantValue, VectorParamsBuilder, VectorsConfig,
};
use qdrant_client::Qdrant;
use tracing::info;

use crate::similarity::MAX_RESULTS;
use crate::traits::{DocumentFields, FieldValue, VectorSearchProvider};

/// Dedicated vector-DB provider (Qdrant): `ensure_collection`,
/// `PointStruct`/`UpsertPointsBuilder`, and `SearchPointsBuilder` with a
/// score threshold passed straight through as Qdrant's native cosine score.
pub struct VectorDbProvider {
    client: Qdrant,
    collection_name: String,
    dimension: usize,
}

impl VectorDbProvider {
    pub fn new(url: &str, collection_name: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build qdrant client: {e}")))?;

        Ok(Self {
            client,
            collection_name: collection_name.into(),
            dimension,
        })
    }

    /// A stable non-negative 63-bit hash of the composite key, used as the
    /// point id. Qdrant requires numeric or UUID ids; collisions across
    /// distinct keys are accepted given the scale this store targets.
    fn point_id(composite_key: &str) -> u64 {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        composite_key.hash(&mut hasher);
        hasher.finish() & 0x7fff_ffff_ffff_ffff
    }
}

#[async_trait]
impl VectorSearchProvider for VectorDbProvider {
    async fn initialize(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(&self.collection_name)
            .await
            .map_err(|e| Error::Initialization(format!("failed to check collection: {e}")))?;

        if !exists {
            let create = CreateCollectionBuilder::new(self.collection_name.clone()).vectors_config(
                VectorsConfig {
                    config: Some(Config::Params(
                        VectorParamsBuilder::new(self.dimension as u64, Distance::Cosine).build(),
                    )),
                },
            );

            self.client
                .create_collection(create)
                .await
                .map_err(|e| Error::Initialization(format!("failed to create collection: {e}")))?;

            info!(
                collection = self.collection_name,
                dimension = self.dimension,
                "created qdrant collection"
            );
        }

        Ok(())
    }

    async fn save_document(&self, composite_key: &str, fields: DocumentFields) -> Result<()> {
        let vector = fields
            .get("embedding")
            .and_then(|v| v.as_vector())
            .ok_or_else(|| Error::Configuration("document has no embedding field".into()))?;

        let mut payload: HashMap<String, QdrantValue> = HashMap::new();
        payload.insert(
            "composite_key".to_string(),
            QdrantValue::from(composite_key.to_string()),
        );
        for (name, value) in &fields {
            if name == "embedding" {
                continue;
            }
            let qvalue = match value {
                FieldValue::Text(s) => QdrantValue::from(s.clone()),
                FieldValue::Number(n) => QdrantValue::from(*n),
                FieldValue::Vector(_) => continue,
            };
            payload.insert(name.clone(), qvalue);
        }

        let point = PointStruct::new(Self::point_id(composite_key), vector.to_vec(), payload);
        let upsert = UpsertPointsBuilder::new(&self.collection_name, vec![point]);

        self.client
            .upsert_points(upsert)
            .await
            .map_err(|e| Error::BackendIo(format!("failed to upsert point: {e}")))?;

        Ok(())
    }

    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String> {
        let point_id = Self::point_id(composite_key);
        let points = self
            .client
            .get_points(qdrant_client::qdrant::GetPointsBuilder::new(
                &self.collection_name,
                vec![point_id.into()],
            ))
            .await
            .map_err(|e| Error::BackendIo(format!("failed to fetch point: {e}")))?;

        let Some(point) = points.result.into_iter().next() else {
            return Ok(String::new());
        };

        Ok(point
            .payload
            .get(field)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default())
    }

    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>> {
        let search = SearchPointsBuilder::new(&self.collection_name, vector.to_vec(), MAX_RESULTS as u64)
            .with_payload(true)
            .score_threshold(threshold);

        let results = self
            .client
            .search_points(search)
            .await
            .map_err(|e| Error::BackendIo(format!("search failed: {e}")))?;

        Ok(results
            .result
            .into_iter()
            .filter_map(|point| {
                point
                    .payload
                    .get("value")
                    .and_then(|v| v.as_str().map(str::to_string))
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_id_is_stable_and_non_negative() {
        let a = VectorDbProvider::point_id("mesh:alpha:note");
        let b = VectorDbProvider::point_id("mesh:alpha:note");
        assert_eq!(a, b);
        assert!((a as i64) >= 0);
    }

    #[test]
    fn point_id_differs_across_keys() {
        let a = VectorDbProvider::point_id("mesh:alpha:note");
        let b = VectorDbProvider::point_id("mesh:beta:note");
        assert_ne!(a, b);
    }
}
