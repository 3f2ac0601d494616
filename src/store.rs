//! Persistence and similarity search over SQLite.
//!
//! [`Store`] is the seam the pipelines talk to; [`SqliteStore`] is the only
//! implementation. Embedding vectors live in a BLOB column and cosine
//! similarity is computed in Rust over the fetched vectors, which is plenty
//! for the corpus sizes a single SQLite file holds.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::cmp::Ordering;
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{DocumentSummary, EmbeddedChunk, NewDocument, RetrievedChunk};

#[async_trait]
pub trait Store: Send + Sync {
    /// Persist a document and all of its chunks in one transaction,
    /// returning the new document id. Either the whole document becomes
    /// visible or nothing does, so a failure (or a caller dropping the
    /// future before commit) leaves the filename free to retry. Fails with
    /// [`Error::DuplicateDocument`] when the filename is already ingested.
    async fn insert_document(&self, doc: &NewDocument, chunks: &[EmbeddedChunk])
        -> Result<String>;

    /// Top-k most similar chunks, descending similarity; ties break by
    /// ascending chunk index, then document id, so ranking is deterministic.
    async fn search(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>>;

    /// All stored documents with chunk counts, newest first.
    async fn list_documents(&self) -> Result<Vec<DocumentSummary>>;

    /// True when the required tables exist and respond.
    async fn health_check(&self) -> Result<bool>;
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `path`, creating the file if missing. Schema
    /// creation is separate; see [`SqliteStore::migrate`].
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Create the schema. Idempotent.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                filename TEXT NOT NULL UNIQUE,
                total_pages INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS chunks (
                id TEXT PRIMARY KEY,
                document_id TEXT NOT NULL,
                page_number INTEGER NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                embedding BLOB NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(document_id, chunk_index),
                FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_document(
        &self,
        doc: &NewDocument,
        chunks: &[EmbeddedChunk],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO documents (id, title, filename, total_pages, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&doc.title)
        .bind(&doc.filename)
        .bind(doc.total_pages)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            let unique = e
                .as_database_error()
                .map(|d| d.is_unique_violation())
                .unwrap_or(false);
            if unique {
                Error::DuplicateDocument {
                    filename: doc.filename.clone(),
                }
            } else {
                Error::Storage(e)
            }
        })?;

        for chunk in chunks {
            sqlx::query(
                "INSERT INTO chunks (id, document_id, page_number, chunk_index, content, embedding, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&id)
            .bind(chunk.draft.page_number)
            .bind(chunk.draft.chunk_index)
            .bind(&chunk.draft.content)
            .bind(vec_to_blob(&chunk.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(id)
    }

    async fn search(&self, query_vec: &[f32], top_k: usize) -> Result<Vec<RetrievedChunk>> {
        let rows = sqlx::query(
            "SELECT c.id, c.document_id, c.page_number, c.chunk_index, c.content, c.embedding,
                    d.title
             FROM chunks c
             JOIN documents d ON d.id = c.document_id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut scored: Vec<RetrievedChunk> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let stored = blob_to_vec(&blob);
                let cos = cosine_similarity(query_vec, &stored) as f64;
                RetrievedChunk {
                    chunk_id: row.get("id"),
                    document_id: row.get("document_id"),
                    document_title: row.get("title"),
                    page_number: row.get("page_number"),
                    chunk_index: row.get("chunk_index"),
                    content: row.get("content"),
                    // rescale cosine from [-1, 1] into [0, 1]
                    similarity: (cos + 1.0) / 2.0,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.chunk_index.cmp(&b.chunk_index))
                .then_with(|| a.document_id.cmp(&b.document_id))
        });
        scored.truncate(top_k);
        Ok(scored)
    }

    async fn list_documents(&self) -> Result<Vec<DocumentSummary>> {
        let rows = sqlx::query(
            "SELECT d.id, d.title, d.filename, d.total_pages, d.created_at,
                    COUNT(c.id) AS chunk_count
             FROM documents d
             LEFT JOIN chunks c ON c.document_id = d.id
             GROUP BY d.id
             ORDER BY d.created_at DESC, d.filename ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentSummary {
                id: row.get("id"),
                title: row.get("title"),
                filename: row.get("filename"),
                total_pages: row.get("total_pages"),
                chunk_count: row.get("chunk_count"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        let present: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM sqlite_master
             WHERE type = 'table' AND name IN ('documents', 'chunks')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(present == 2)
    }
}
