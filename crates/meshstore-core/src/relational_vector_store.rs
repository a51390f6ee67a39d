use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Once};

use async_trait::async_trait;
use meshstore_common::{is_embedding_key, Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::key_format::parse_embedding;
use crate::migrations::RELATIONAL_VECTOR_SCHEMA_V1;
use crate::similarity::top_similar;
use crate::traits::{MemoryStore, VectorSearchProvider};

static REGISTER_VEC_EXTENSION: Once = Once::new();

/// Registers the `sqlite-vec` extension as an auto-extension for every
/// connection opened in this process. A `rusqlite` connection has no
/// per-instance "load this extension" call that survives `:memory:`
/// reopen semantics, so this uses the process-wide `sqlite3_auto_extension`
/// hook the `sqlite-vec` crate is built around instead.
fn register_vec_extension() {
    REGISTER_VEC_EXTENSION.call_once(|| unsafe {
        #[allow(clippy::missing_transmute_annotations)]
        let init_fn = std::mem::transmute(sqlite_vec::sqlite3_vec_init as *const ());
        rusqlite::ffi::sqlite3_auto_extension(Some(init_fn));
    });
}

/// Relational backend with an optional native ANN index (`vec0`, via
/// `sqlite-vec`), standing in for a client/server relational engine with
/// an HNSW-capable vector extension. When the extension fails to load,
/// this falls back to a sequential scan with identical result semantics.
pub struct RelationalVectorStore {
    conn: Mutex<Connection>,
    dimension: usize,
    ann_available: AtomicBool,
    initialized: AtomicBool,
}

impl RelationalVectorStore {
    pub fn open(db_path: &Path, dimension: usize) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Initialization(format!("failed to open {}: {e}", db_path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Initialization(format!("failed to set WAL mode: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
            ann_available: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn in_memory(dimension: usize) -> Result<Self> {
        register_vec_extension();
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Initialization(format!("failed to open in-memory database: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            dimension,
            ann_available: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
        })
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::BackendIo("relational vector store connection lock poisoned".into()))
    }

    /// Attempts to create the `vec0` virtual table backing the HNSW-style
    /// index. On any failure this logs a warning and leaves `ann_available`
    /// false — queries then fall back to the sequential scan in
    /// `query_similar`.
    fn try_enable_ann(&self, conn: &Connection) -> bool {
        let create = format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_embeddings USING vec0(
                embedding FLOAT[{}] distance_metric=cosine
            )",
            self.dimension
        );

        match conn.execute_batch(&create) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    error = %e,
                    "failed to create native vector index, falling back to sequential scan"
                );
                false
            }
        }
    }

    pub fn ann_available(&self) -> bool {
        self.ann_available.load(Ordering::SeqCst)
    }
}

/// Indexes `blob` into the `vec0` virtual table for the row addressed by
/// `(session_id, key)`, when the native ANN index is available. A no-op
/// otherwise — callers fall back to the sequential scan in `query_similar`.
///
/// Virtual tables reject the `ON CONFLICT ... DO UPDATE` upsert clause
/// (`cannot UPSERT a virtual table`); `vec0` only supports the `REPLACE`
/// conflict algorithm, so this uses `INSERT OR REPLACE` instead.
fn index_embedding(conn: &Connection, ann_available: bool, session_id: &str, key: &str, blob: &[u8]) -> Result<()> {
    if !ann_available {
        return Ok(());
    }

    let rowid: i64 = conn
        .query_row(
            "SELECT id FROM vectors WHERE session_id = ?1 AND key = ?2",
            params![session_id, key],
            |row| row.get(0),
        )
        .map_err(|e| Error::BackendIo(format!("failed to resolve row id: {e}")))?;

    conn.execute(
        "INSERT OR REPLACE INTO vec_embeddings(rowid, embedding) VALUES (?1, ?2)",
        params![rowid, blob],
    )
    .map_err(|e| Error::BackendIo(format!("failed to index embedding: {e}")))?;

    Ok(())
}

#[async_trait]
impl MemoryStore for RelationalVectorStore {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let conn = self.connection()?;
        conn.execute_batch(RELATIONAL_VECTOR_SCHEMA_V1.sql)
            .map_err(|e| Error::Initialization(format!("vector schema migration failed: {e}")))?;

        let ann_ok = self.try_enable_ann(&conn);
        self.ann_available.store(ann_ok, Ordering::SeqCst);
        if ann_ok {
            info!(dimension = self.dimension, "native vector index ready");
        }

        Ok(())
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::BackendIo(format!("failed to begin transaction: {e}")))?;

        tx.execute(
            "INSERT INTO vectors (session_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(session_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![session_id, key, value],
        )
        .map_err(|e| Error::BackendIo(format!("failed to save context entry: {e}")))?;

        if is_embedding_key(key) {
            match parse_embedding(value) {
                Some(vector) if vector.len() == self.dimension => {
                    let blob = embedding_to_blob(&vector);
                    tx.execute(
                        "UPDATE vectors SET embedding = ?3 WHERE session_id = ?1 AND key = ?2",
                        params![session_id, key, blob],
                    )
                    .map_err(|e| Error::BackendIo(format!("failed to save embedding: {e}")))?;

                    index_embedding(&tx, self.ann_available(), session_id, key, &blob)?;
                }
                Some(vector) => warn!(
                    key,
                    expected = self.dimension,
                    actual = vector.len(),
                    "embedding dimension mismatch, value saved without an embedding"
                ),
                None => warn!(key, "value for embedding key is not a JSON float array"),
            }
        }

        tx.commit()
            .map_err(|e| Error::BackendIo(format!("failed to commit save: {e}")))?;

        Ok(())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<String> {
        let conn = self.connection()?;
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM vectors WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::BackendIo(format!("failed to read context entry: {e}")))?;

        Ok(value.unwrap_or_default())
    }

    async fn query_similar(&self, embedding_json: &str, threshold: f32) -> Result<Vec<String>> {
        let query = match parse_embedding(embedding_json) {
            Some(v) => v,
            None => return Ok(Vec::new()),
        };

        let conn = self.connection()?;

        if self.ann_available() {
            let max_distance = 1.0 - threshold;
            let mut stmt = conn
                .prepare(
                    "SELECT v.value, e.distance FROM vec_embeddings e
                     JOIN vectors v ON v.id = e.rowid
                     WHERE e.embedding MATCH ?1 AND k = 10
                     ORDER BY e.distance ASC",
                )
                .map_err(|e| Error::BackendIo(format!("failed to prepare ANN query: {e}")))?;

            let blob = embedding_to_blob(&query);
            let rows = stmt
                .query_map(params![blob], |row| {
                    let value: String = row.get(0)?;
                    let distance: f64 = row.get(1)?;
                    Ok((value, distance))
                })
                .map_err(|e| Error::BackendIo(format!("ANN query failed: {e}")))?;

            let mut values = Vec::new();
            for row in rows {
                let (value, distance) =
                    row.map_err(|e| Error::BackendIo(format!("failed to read ANN row: {e}")))?;
                if distance <= max_distance as f64 {
                    values.push(value);
                }
            }
            return Ok(values);
        }

        let mut stmt = conn
            .prepare("SELECT session_id, key, embedding FROM vectors WHERE embedding IS NOT NULL")
            .map_err(|e| Error::BackendIo(format!("failed to prepare embedding scan: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let session_id: String = row.get(0)?;
                let key: String = row.get(1)?;
                let blob: Vec<u8> = row.get(2)?;
                Ok((session_id, key, blob))
            })
            .map_err(|e| Error::BackendIo(format!("failed to scan embeddings: {e}")))?;

        let mut candidates = Vec::new();
        for row in rows {
            let (session_id, key, blob) =
                row.map_err(|e| Error::BackendIo(format!("failed to read embedding row: {e}")))?;
            match blob_to_embedding(&blob) {
                Ok(vector) => candidates.push(((session_id, key), vector)),
                Err(_) => warn!(key, "skipping embedding row with malformed blob"),
            }
        }

        let matches = top_similar(&query, candidates, threshold);

        let mut values = Vec::with_capacity(matches.len());
        for ((session_id, key), _) in matches {
            let value: String = conn
                .query_row(
                    "SELECT value FROM vectors WHERE session_id = ?1 AND key = ?2",
                    params![session_id, key],
                    |row| row.get(0),
                )
                .unwrap_or_default();
            values.push(value);
        }

        Ok(values)
    }
}

/// `RelationalVectorStore` also serves as a dimension-bound
/// `VectorSearchProvider`. Documents are addressed by the composite key
/// directly rather than by `(session_id, key)`, so this impl stores them
/// in the same `vectors` table keyed on the composite string in both
/// `session_id` and `key` columns — adequate for a provider role where
/// callers never split the key back apart.
#[async_trait]
impl VectorSearchProvider for RelationalVectorStore {
    async fn initialize(&self) -> Result<()> {
        MemoryStore::initialize(self).await
    }

    async fn save_document(
        &self,
        composite_key: &str,
        fields: crate::traits::DocumentFields,
    ) -> Result<()> {
        let value = fields
            .get("value")
            .and_then(|v| v.as_text())
            .unwrap_or_default();

        let conn = self.connection()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::BackendIo(format!("failed to begin transaction: {e}")))?;

        tx.execute(
            "INSERT INTO vectors (session_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(session_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![composite_key, composite_key, value],
        )
        .map_err(|e| Error::BackendIo(format!("failed to save document: {e}")))?;

        if let Some(vector) = fields.get("embedding").and_then(|v| v.as_vector()) {
            let blob = embedding_to_blob(vector);
            tx.execute(
                "UPDATE vectors SET embedding = ?3 WHERE session_id = ?1 AND key = ?2",
                params![composite_key, composite_key, blob],
            )
            .map_err(|e| Error::BackendIo(format!("failed to save document embedding: {e}")))?;

            index_embedding(&tx, self.ann_available(), composite_key, composite_key, &blob)?;
        }

        tx.commit()
            .map_err(|e| Error::BackendIo(format!("failed to commit save: {e}")))?;

        Ok(())
    }

    async fn get_document_value(&self, composite_key: &str, field: &str) -> Result<String> {
        if field != "value" {
            return Ok(String::new());
        }
        MemoryStore::get(self, composite_key, composite_key).await
    }

    async fn query_similar(&self, vector: &[f32], threshold: f32) -> Result<Vec<String>> {
        let json = serde_json::to_string(vector)?;
        MemoryStore::query_similar(self, &json, threshold).await
    }
}

fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for v in embedding {
        bytes.extend(v.to_le_bytes());
    }
    bytes
}

fn blob_to_embedding(blob: &[u8]) -> Result<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return Err(Error::BackendIo("invalid embedding blob length".into()));
    }

    let mut out = Vec::with_capacity(blob.len() / 4);
    for chunk in blob.chunks_exact(4) {
        out.push(f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_get_roundtrips() {
        let store = RelationalVectorStore::in_memory(3).expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store.save("session-a", "greeting", "hello").await.unwrap();
        assert_eq!(store.get("session-a", "greeting").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn get_on_missing_pair_returns_empty_string() {
        let store = RelationalVectorStore::in_memory(3).expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        assert_eq!(store.get("session-a", "nope").await.unwrap(), "");
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = RelationalVectorStore::in_memory(3).expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store.save("session-a", "key", "first").await.unwrap();
        store.save("session-a", "key", "second").await.unwrap();

        assert_eq!(store.get("session-a", "key").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn query_similar_matches_embedding_entries_with_or_without_native_index() {
        let store = RelationalVectorStore::in_memory(2).expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store
            .save("session-a", "doc1_embedding", "[1.0, 0.0]")
            .await
            .unwrap();
        store
            .save("session-a", "doc2_embedding", "[0.0, 1.0]")
            .await
            .unwrap();

        let results = store.query_similar("[1.0, 0.0]", 0.9).await.unwrap();
        assert_eq!(results, vec!["[1.0, 0.0]".to_string()]);
    }

    #[tokio::test]
    async fn embedding_dimension_mismatch_does_not_fail_save() {
        let store = RelationalVectorStore::in_memory(3).expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store
            .save("session-a", "bad_embedding", "[1.0, 0.0]")
            .await
            .unwrap();

        assert_eq!(
            store.get("session-a", "bad_embedding").await.unwrap(),
            "[1.0, 0.0]"
        );
        let results = store.query_similar("[1.0, 0.0, 0.0]", 0.0).await.unwrap();
        assert!(results.is_empty());
    }
}
