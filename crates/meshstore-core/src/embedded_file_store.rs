use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use meshstore_common::{is_embedding_key, Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::key_format::parse_embedding;
use crate::migrations::CONTEXT_SCHEMA_V1;
use crate::similarity::top_similar;
use crate::traits::MemoryStore;

/// Single-file SQLite-backed store. Every `MemoryStore` operation goes
/// through one shared connection guarded by a `Mutex`, matching the
/// single-writer discipline SQLite's WAL mode is built around.
pub struct EmbeddedFileStore {
    conn: Mutex<Connection>,
    initialized: AtomicBool,
}

impl EmbeddedFileStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Initialization(format!("failed to open {}: {e}", db_path.display())))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| Error::Initialization(format!("failed to set WAL mode: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            initialized: AtomicBool::new(false),
        })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Initialization(format!("failed to open in-memory database: {e}")))?;

        Ok(Self {
            conn: Mutex::new(conn),
            initialized: AtomicBool::new(false),
        })
    }

    fn connection(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::BackendIo("embedded file store connection lock poisoned".into()))
    }
}

#[async_trait]
impl MemoryStore for EmbeddedFileStore {
    async fn initialize(&self) -> Result<()> {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let conn = self.connection()?;
        conn.execute_batch(CONTEXT_SCHEMA_V1.sql)
            .map_err(|e| Error::Initialization(format!("context schema migration failed: {e}")))?;
        Ok(())
    }

    async fn save(&self, session_id: &str, key: &str, value: &str) -> Result<()> {
        let conn = self.connection()?;
        let tx = conn
            .unchecked_transaction()
            .map_err(|e| Error::BackendIo(format!("failed to begin transaction: {e}")))?;

        tx.execute(
            "INSERT INTO context (session_id, key, value, updated_at)
             VALUES (?1, ?2, ?3, datetime('now'))
             ON CONFLICT(session_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at",
            params![session_id, key, value],
        )
        .map_err(|e| Error::BackendIo(format!("failed to save context entry: {e}")))?;

        if is_embedding_key(key) {
            match parse_embedding(value) {
                Some(vector) => {
                    let blob = embedding_to_blob(&vector);
                    tx.execute(
                        "INSERT INTO embeddings (session_id, key, embedding, created_at)
                         VALUES (?1, ?2, ?3, datetime('now'))
                         ON CONFLICT(session_id, key) DO UPDATE SET
                            embedding = excluded.embedding,
                            created_at = excluded.created_at",
                        params![session_id, key, blob],
                    )
                    .map_err(|e| Error::BackendIo(format!("failed to save embedding: {e}")))?;
                }
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
                "SELECT value FROM context WHERE session_id = ?1 AND key = ?2",
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
        let mut stmt = conn
            .prepare("SELECT session_id, key, embedding FROM embeddings")
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
                    "SELECT value FROM context WHERE session_id = ?1 AND key = ?2",
                    params![session_id, key],
                    |row| row.get(0),
                )
                .unwrap_or_default();
            values.push(value);
        }

        Ok(values)
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
        let store = EmbeddedFileStore::in_memory().expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store.save("session-a", "greeting", "hello").await.unwrap();
        assert_eq!(store.get("session-a", "greeting").await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn get_on_missing_pair_returns_empty_string() {
        let store = EmbeddedFileStore::in_memory().expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        assert_eq!(store.get("session-a", "nope").await.unwrap(), "");
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = EmbeddedFileStore::in_memory().expect("failed to open in-memory store");
        store.initialize().await.unwrap();

        store.save("session-a", "key", "first").await.unwrap();
        store.save("session-a", "key", "second").await.unwrap();

        assert_eq!(store.get("session-a", "key").await.unwrap(), "second");
    }

    #[tokio::test]
    async fn query_similar_matches_embedding_entries() {
        let store = EmbeddedFileStore::in_memory().expect("failed to open in-memory store");
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
    async fn initialize_is_idempotent() {
        let store = EmbeddedFileStore::in_memory().expect("failed to open in-memory store");
        store.initialize().await.unwrap();
        store.initialize().await.unwrap();

        store.save("session-a", "k", "v").await.unwrap();
        assert_eq!(store.get("session-a", "k").await.unwrap(), "v");
    }
}
