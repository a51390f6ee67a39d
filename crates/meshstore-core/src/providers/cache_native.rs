use async_trait::async_trait;
use meshstore_common::{Error, Result};
use redis::AsyncCommands;
use tracing::{info, warn};

use crate::similarity::MAX_RESULTS;
use crate::traits::{DocumentFields, VectorSearchProvider};

const VALUE_FIELD: &str = "value";
const EMBEDDING_FIELD: &str = "embedding";

/// RediSearch-style provider: an in-memory KV store with a search module
/// that can index a binary vector field with HNSW and a cosine metric.
/// Documents are stored as Redis hashes (one field per `DocumentFields`
/// entry); vectors are packed as little-endian `f32` blobs, which is the
/// wire format RediSearch's `VECTOR` field type expects.
pub struct CacheNativeProvider {
    client: redis::Client,
    index_name: String,
    key_prefix: String,
    dimension: usize,
}

impl CacheNativeProvider {
    pub fn new(redis_url: &str, index_name: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| Error::Configuration(format!("invalid redis url: {e}")))?;

        Ok(Self {
            client,
            index_name: index_name.into(),
            key_prefix: "mesh:".to_string(),
            dimension,
        })
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| Error::BackendIo(format!("redis connection failed: {e}")))
    }

    fn pack_vector(vector: &[f32]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(vector.len() * 4);
        for v in vector {
            bytes.extend(v.to_le_bytes());
        }
        bytes
    }
}

#[async_trait]
impl VectorSearchProvider for CacheNativeProvider {
    async fn initialize(&self) -> Result<()> {
        let mut conn = self.connection().await?;

        let info_result: redis::RedisResult<redis::Value> = redis::cmd("FT.INFO")
            .arg(&self.index_name)
            .query_async(&mut conn)
            .await;

        if info_result.is_ok() {
            return Ok(());
        }

        let created: redis::RedisResult<redis::Value> = redis::cmd("FT.CREATE")
            .arg(&self.index_name)
            .arg("ON")
            .arg("HASH")
            .arg("PREFIX")
            .arg(1)
            .arg(&self.key_prefix)
            .arg("SCHEMA")
            .arg(VALUE_FIELD)
            .arg("TEXT")
            .arg(EMBEDDING_FIELD)
            .arg("VECTOR")
            .arg("HNSW")
            .arg(6)
            .arg("TYPE")
            .arg("FLOAT32")
            .arg("DIM")
            .arg(self.dimension)
            .arg("DISTANCE_METRIC")
            .arg("COSINE")
            .query_async(&mut conn)
            .await;

        match created {
            Ok(_) => {
                info!(index = self.index_name, dimension = self.dimension, "created RediSearch index");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "failed to create native vector index, search will be unavailable");
                Ok(())
            }
        }
    }

    async fn save_document(&self, composite_key: &str, fields: DocumentFields) -> Result<()> {
        let mut conn = self.connection().await?;
        let key = format!("{}{}", self.key_prefix, composite_key);

        let mut pairs: Vec<(String, Vec<u8>)> = Vec::new();
        for (name, value) in &fields {
            match value {
                crate::traits::FieldValue::Text(s) => pairs.push((name.clone(), s.clone().into_bytes())),
                crate::traits::FieldValue::Number(n) => pairs.push((name.clone(), n.to_string().into_bytes())),
                crate::traits::FieldValue::Vector(v) => {
                    pairs.push((EMBEDDING_FIELD.to_string(), Self::pack_vector(v)))
                }
            }
        }

        conn.hset_multiple::<_, _, _, ()>(&key, &pairs)
            .await
            .map_err(|e| Error::BackendIo(format!("failed to save document {key}: {e}")))?;

        Ok(())
    }

    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String> {
        let mut conn = self.connection().await?;
        let key = format!("{}{}", self.key_prefix, composite_key);

        let value: Option<String> = conn
            .hget(&key, field)
            .await
            .map_err(|e| Error::BackendIo(format!("failed to read document field {field}: {e}")))?;

        Ok(value.unwrap_or_default())
    }

    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>> {
        let mut conn = self.connection().await?;
        let blob = Self::pack_vector(vector);

        let query = format!(
            "*=>[KNN {MAX_RESULTS} @{EMBEDDING_FIELD} $vec AS score]"
        );

        let result: redis::RedisResult<redis::Value> = redis::cmd("FT.SEARCH")
            .arg(&self.index_name)
            .arg(&query)
            .arg("PARAMS")
            .arg(2)
            .arg("vec")
            .arg(blob)
            .arg("SORTBY")
            .arg("score")
            .arg("RETURN")
            .arg(2)
            .arg(VALUE_FIELD)
            .arg("score")
            .arg("DIALECT")
            .arg(2)
            .query_async(&mut conn)
            .await;

        let raw = match result {
            Ok(v) => v,
            Err(e) => return Err(Error::BackendIo(format!("FT.SEARCH failed: {e}"))),
        };

        Ok(parse_search_reply(raw, threshold))
    }
}

/// `FT.SEARCH` replies as a flat array: `[count, key1, fields1, key2,
/// fields2, ...]` where each `fieldsN` is itself a flat
/// `[name1, value1, name2, value2, ...]` array. RediSearch reports cosine
/// *distance* in `score` for a `COSINE` field; this provider converts it
/// to similarity (`1 - distance`) before the caller's threshold is applied.
fn parse_search_reply(raw: redis::Value, threshold: f32) -> Vec<String> {
    let redis::Value::Array(items) = raw else {
        return Vec::new();
    };

    let mut results = Vec::new();
    let mut i = 1; // items[0] is the total result count
    while i + 1 < items.len() {
        if let redis::Value::Array(fields) = &items[i + 1] {
            let mut value = None;
            let mut distance = None;
            let mut j = 0;
            while j + 1 < fields.len() {
                if let redis::Value::BulkString(name) = &fields[j] {
                    let name = String::from_utf8_lossy(name);
                    let as_string = |v: &redis::Value| -> Option<String> {
                        match v {
                            redis::Value::BulkString(b) => Some(String::from_utf8_lossy(b).into_owned()),
                            redis::Value::SimpleString(s) => Some(s.clone()),
                            _ => None,
                        }
                    };
                    if name == VALUE_FIELD {
                        value = as_string(&fields[j + 1]);
                    } else if name == "score" {
                        distance = as_string(&fields[j + 1]).and_then(|s| s.parse::<f32>().ok());
                    }
                }
                j += 2;
            }

            if let (Some(value), Some(distance)) = (value, distance) {
                let similarity = 1.0 - distance;
                if similarity >= threshold {
                    results.push(value);
                }
            }
        }
        i += 2;
    }

    results.truncate(MAX_RESULTS);
    results
}
