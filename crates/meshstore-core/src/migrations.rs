/// Migration system for tracking and applying database schema changes.
///
/// Each migration has a version number and a SQL statement.
/// Migrations are applied in order and tracked in a `_migrations` table.
pub struct Migration {
    pub version: u32,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Schema for [`crate::embedded_file_store::EmbeddedFileStore`]: a flat
/// key/value table plus a side table of decoded embeddings keyed the same
/// way, so `query_similar` never has to decode every row's value.
pub const CONTEXT_SCHEMA_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS context (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(session_id, key)
);

CREATE INDEX IF NOT EXISTS idx_context_session_key
    ON context(session_id, key);

CREATE TABLE IF NOT EXISTS embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    embedding BLOB NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(session_id, key)
);

CREATE INDEX IF NOT EXISTS idx_embeddings_session_key
    ON embeddings(session_id, key);
";

pub const CONTEXT_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "context_schema_v1",
    sql: CONTEXT_SCHEMA_V1_SQL,
};

/// Schema for [`crate::relational_vector_store::RelationalVectorStore`]. The
/// `vec0` virtual table is created separately at runtime only when the
/// sqlite-vec extension loads successfully; this migration covers the plain
/// relational fallback that always exists.
pub const RELATIONAL_VECTOR_SCHEMA_V1_SQL: &str = "
CREATE TABLE IF NOT EXISTS vectors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value TEXT NOT NULL,
    embedding BLOB,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE(session_id, key)
);

CREATE INDEX IF NOT EXISTS idx_vectors_session_key
    ON vectors(session_id, key);
";

pub const RELATIONAL_VECTOR_SCHEMA_V1: Migration = Migration {
    version: 1,
    name: "relational_vector_schema_v1",
    sql: RELATIONAL_VECTOR_SCHEMA_V1_SQL,
};
