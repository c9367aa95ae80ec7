//! SQLite persistence for built collections.
//!
//! A collection is stored as one `collections` row plus aligned `chunks`
//! and `vectors` rows keyed by `(collection_key, seq)`. Vectors are
//! little-endian f32 BLOBs (see [`crate::embedding::vec_to_blob`]).
//!
//! Saving a collection replaces every older collection with the same
//! display name, so a repository that changed upstream does not leave its
//! stale index behind.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::db;
use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::index::Collection;
use crate::migrate;
use crate::models::Chunk;

/// Summary row for `cache list`.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub key: String,
    pub name: String,
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct CollectionStore {
    pool: SqlitePool,
}

impl CollectionStore {
    /// Open the database at `db_path` and make sure the schema exists.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn load(&self, key: &str) -> Result<Option<Collection>> {
        let row = sqlx::query("SELECT key, name, model, created_at FROM collections WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };

        let chunk_rows = sqlx::query(
            "SELECT source_id, position_index, sibling_count, start_offset, url, text \
             FROM chunks WHERE collection_key = ? ORDER BY seq ASC",
        )
        .bind(key)
        .fetch_all(&self.pool)
        .await?;

        let chunks: Vec<Chunk> = chunk_rows
            .iter()
            .map(|r| {
                let text: String = r.get("text");
                Chunk {
                    size: text.chars().count(),
                    text,
                    source_id: r.get("source_id"),
                    position_index: r.get::<i64, _>("position_index") as usize,
                    sibling_count: r.get::<i64, _>("sibling_count") as usize,
                    start_offset: r.get::<i64, _>("start_offset") as usize,
                    url: r.get("url"),
                }
            })
            .collect();

        let vector_rows =
            sqlx::query("SELECT embedding FROM vectors WHERE collection_key = ? ORDER BY seq ASC")
                .bind(key)
                .fetch_all(&self.pool)
                .await?;

        let vectors: Vec<Vec<f32>> = vector_rows
            .iter()
            .map(|r| {
                let blob: Vec<u8> = r.get("embedding");
                blob_to_vec(&blob)
            })
            .collect();

        let created_at: i64 = row.get("created_at");

        let collection = Collection::from_parts(
            row.get("key"),
            row.get("name"),
            row.get("model"),
            DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
            chunks,
            vectors,
        )?;

        Ok(Some(collection))
    }

    /// Persist `collection`, replacing any row under the same key and
    /// removing older collections with the same name.
    ///
    /// Returns the keys of the superseded collections.
    pub async fn save(&self, collection: &Collection) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let superseded: Vec<String> =
            sqlx::query_scalar("SELECT key FROM collections WHERE name = ? AND key != ?")
                .bind(&collection.name)
                .bind(&collection.key)
                .fetch_all(&mut *tx)
                .await?;

        let mut stale = superseded.clone();
        stale.push(collection.key.clone());
        for key in &stale {
            sqlx::query("DELETE FROM vectors WHERE collection_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE collection_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM collections WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO collections (key, name, model, dims, chunk_count, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&collection.key)
        .bind(&collection.name)
        .bind(&collection.model)
        .bind(collection.dims as i64)
        .bind(collection.len() as i64)
        .bind(collection.created_at.timestamp())
        .execute(&mut *tx)
        .await?;

        for (seq, (chunk, vector)) in collection
            .chunks
            .iter()
            .zip(collection.vectors.iter())
            .enumerate()
        {
            sqlx::query(
                "INSERT INTO chunks (collection_key, seq, source_id, position_index, sibling_count, start_offset, url, text) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&collection.key)
            .bind(seq as i64)
            .bind(&chunk.source_id)
            .bind(chunk.position_index as i64)
            .bind(chunk.sibling_count as i64)
            .bind(chunk.start_offset as i64)
            .bind(&chunk.url)
            .bind(&chunk.text)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO vectors (collection_key, seq, embedding) VALUES (?, ?, ?)")
                .bind(&collection.key)
                .bind(seq as i64)
                .bind(vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        if !superseded.is_empty() {
            tracing::info!(name = %collection.name, count = superseded.len(), "superseded cached collections");
        }
        Ok(superseded)
    }

    /// Delete every collection whose key or name equals `name_or_key`.
    ///
    /// Returns the deleted keys (empty when nothing matched).
    pub async fn delete(&self, name_or_key: &str) -> Result<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let keys: Vec<String> =
            sqlx::query_scalar("SELECT key FROM collections WHERE key = ? OR name = ?")
                .bind(name_or_key)
                .bind(name_or_key)
                .fetch_all(&mut *tx)
                .await?;
        for key in &keys {
            sqlx::query("DELETE FROM vectors WHERE collection_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM chunks WHERE collection_key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM collections WHERE key = ?")
                .bind(key)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        Ok(keys)
    }

    /// All stored collections, newest first.
    pub async fn list(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            "SELECT key, name, model, dims, chunk_count, created_at FROM collections \
             ORDER BY created_at DESC, name ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| {
                let created_at: i64 = r.get("created_at");
                CollectionInfo {
                    key: r.get("key"),
                    name: r.get("name"),
                    model: r.get("model"),
                    dims: r.get::<i64, _>("dims") as usize,
                    chunk_count: r.get::<i64, _>("chunk_count") as usize,
                    created_at: DateTime::from_timestamp(created_at, 0).unwrap_or_else(Utc::now),
                }
            })
            .collect())
    }
}
