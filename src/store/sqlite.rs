//! Local vector store backed by SQLite.
//!
//! Embeddings are stored as little-endian f32 blobs and searched by brute force,
//! which is fast enough for the few thousand chunks of a single document.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::{
    cosine_similarity, dot_product, IndexEntry, IndexInfo, IndexSpec, Metric, Result, StoreError,
    StoreMatch, StoredRecord, VectorStore,
};

pub struct SqliteStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) a store at the given path.
    pub fn open(db_path: PathBuf) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::init(conn, Some(db_path))
    }

    /// Open a store that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, db_path: Option<PathBuf>) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS indexes (
                name TEXT PRIMARY KEY,
                dimension INTEGER NOT NULL,
                metric TEXT NOT NULL,
                cloud TEXT NOT NULL,
                region TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS entries (
                index_name TEXT NOT NULL,
                id TEXT NOT NULL,
                embedding BLOB NOT NULL,
                metadata TEXT NOT NULL,
                PRIMARY KEY (index_name, id),
                FOREIGN KEY (index_name) REFERENCES indexes(name) ON DELETE CASCADE
            );
            "#,
        )?;

        Ok(Self { conn, db_path })
    }

    /// Get the database path, `None` for in-memory stores.
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn require_index(&self, name: &str) -> Result<IndexInfo> {
        self.describe_index(name)?
            .ok_or_else(|| StoreError::IndexNotFound(name.to_string()))
    }
}

impl VectorStore for SqliteStore {
    fn describe_index(&self, name: &str) -> Result<Option<IndexInfo>> {
        let row = self
            .conn
            .query_row(
                "SELECT dimension, metric FROM indexes WHERE name = ?1",
                params![name],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        let Some((dimension, metric)) = row else {
            return Ok(None);
        };

        let vector_count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE index_name = ?1",
            params![name],
            |row| row.get(0),
        )?;

        Ok(Some(IndexInfo {
            name: name.to_string(),
            dimension: dimension as usize,
            metric: Metric::parse(&metric).unwrap_or_default(),
            vector_count: vector_count as usize,
        }))
    }

    fn create_index(&mut self, spec: &IndexSpec) -> Result<()> {
        self.conn.execute(
            "INSERT OR IGNORE INTO indexes (name, dimension, metric, cloud, region) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                spec.name,
                spec.dimension as i64,
                spec.metric.as_str(),
                spec.placement.cloud,
                spec.placement.region,
            ],
        )?;
        Ok(())
    }

    fn upsert(&mut self, index: &str, entries: &[IndexEntry]) -> Result<usize> {
        let info = self.require_index(index)?;

        for entry in entries {
            if entry.vector.len() != info.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: info.dimension,
                    actual: entry.vector.len(),
                });
            }
        }

        let tx = self.conn.transaction()?;
        for entry in entries {
            let metadata_json = serde_json::to_string(&entry.metadata)?;
            tx.execute(
                "INSERT OR REPLACE INTO entries (index_name, id, embedding, metadata) VALUES (?1, ?2, ?3, ?4)",
                params![index, entry.id, serialize_embedding(&entry.vector), metadata_json],
            )?;
        }
        tx.commit()?;

        Ok(entries.len())
    }

    fn query(
        &self,
        index: &str,
        vector: &[f32],
        top_k: usize,
        include_metadata: bool,
    ) -> Result<Vec<StoreMatch>> {
        let info = self.require_index(index)?;
        if vector.len() != info.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: info.dimension,
                actual: vector.len(),
            });
        }

        let mut stmt = self
            .conn
            .prepare("SELECT id, embedding, metadata FROM entries WHERE index_name = ?1")?;
        let rows = stmt
            .query_map(params![index], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut scored: Vec<(f32, String, String)> = rows
            .into_iter()
            .map(|(id, embedding_bytes, metadata)| {
                let embedding = deserialize_embedding(&embedding_bytes);
                let score = match info.metric {
                    Metric::Cosine => cosine_similarity(vector, &embedding),
                    Metric::DotProduct => dot_product(vector, &embedding),
                };
                (score, id, metadata)
            })
            .collect();

        // Sort by score descending, ties broken by id for stable output
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.cmp(&b.1))
        });

        scored
            .into_iter()
            .take(top_k)
            .map(|(score, id, metadata)| -> Result<StoreMatch> {
                let metadata = if include_metadata {
                    serde_json::from_str(&metadata)?
                } else {
                    Map::new()
                };
                Ok(StoreMatch { id, score, metadata })
            })
            .collect()
    }

    fn fetch_all(&self, index: &str) -> Result<Vec<StoredRecord>> {
        self.require_index(index)?;

        let mut stmt = self
            .conn
            .prepare("SELECT id, metadata FROM entries WHERE index_name = ?1")?;
        let rows = stmt
            .query_map(params![index], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, metadata)| -> Result<StoredRecord> {
                let metadata: Map<String, Value> = serde_json::from_str(&metadata)?;
                Ok(StoredRecord { id, metadata })
            })
            .collect()
    }

    fn delete(&mut self, index: &str, ids: &[String]) -> Result<()> {
        self.require_index(index)?;

        let tx = self.conn.transaction()?;
        for id in ids {
            tx.execute(
                "DELETE FROM entries WHERE index_name = ?1 AND id = ?2",
                params![index, id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_all(&mut self, index: &str) -> Result<()> {
        self.require_index(index)?;
        self.conn
            .execute("DELETE FROM entries WHERE index_name = ?1", params![index])?;
        Ok(())
    }
}

/// Serialize embedding as binary blob (f32 little-endian).
fn serialize_embedding(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize embedding from binary blob.
fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
