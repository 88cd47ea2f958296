//! The persisted vector table.
//!
//! One row per embedded chunk, keyed by `(source_path, chunk_index)`.
//! Each row records the model and dimensionality it was produced with;
//! [`load_records`] refuses to mix rows from different providers.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, vec_to_blob};
use crate::models::{EmbeddingRecord, RecordMetadata};

/// A chunk ready to be written, vector included.
#[derive(Debug, Clone)]
pub struct NewRow<'a> {
    pub source_path: &'a str,
    pub metadata: &'a RecordMetadata,
    pub text_hash: &'a str,
    pub vector: &'a [f32],
}

/// Stable row id for a chunk.
pub fn record_id(source_path: &str, chunk_index: i64) -> String {
    format!("{}#{}", source_path, chunk_index)
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub async fn upsert_row(pool: &SqlitePool, row: &NewRow<'_>, model: &str) -> Result<()> {
    let now = chrono::Utc::now().timestamp();
    let id = record_id(row.source_path, row.metadata.chunk_index);

    sqlx::query(
        r#"
        INSERT INTO chunk_vectors (id, title, section, filename, source_path, chunk_index, text, text_hash, model, dims, embedding, indexed_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_path, chunk_index) DO UPDATE SET
            id = excluded.id,
            title = excluded.title,
            section = excluded.section,
            filename = excluded.filename,
            text = excluded.text,
            text_hash = excluded.text_hash,
            model = excluded.model,
            dims = excluded.dims,
            embedding = excluded.embedding,
            indexed_at = excluded.indexed_at
        "#,
    )
    .bind(&id)
    .bind(&row.metadata.title)
    .bind(&row.metadata.section)
    .bind(&row.metadata.filename)
    .bind(row.source_path)
    .bind(row.metadata.chunk_index)
    .bind(&row.metadata.text)
    .bind(row.text_hash)
    .bind(model)
    .bind(row.vector.len() as i64)
    .bind(vec_to_blob(row.vector))
    .bind(now)
    .execute(pool)
    .await?;

    Ok(())
}

/// Text hashes already stored for one source file under `model`, by chunk index.
pub async fn stored_hashes(
    pool: &SqlitePool,
    source_path: &str,
    model: &str,
) -> Result<HashMap<i64, String>> {
    let rows = sqlx::query(
        "SELECT chunk_index, text_hash FROM chunk_vectors WHERE source_path = ? AND model = ?",
    )
    .bind(source_path)
    .bind(model)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("chunk_index"), row.get("text_hash")))
        .collect())
}

/// Drop chunks past the end of a re-chunked file.
pub async fn truncate_source(pool: &SqlitePool, source_path: &str, chunk_count: i64) -> Result<u64> {
    let result = sqlx::query("DELETE FROM chunk_vectors WHERE source_path = ? AND chunk_index >= ?")
        .bind(source_path)
        .bind(chunk_count)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Remove rows whose source file is no longer in the catalog.
pub async fn retain_sources(pool: &SqlitePool, live: &[&str]) -> Result<u64> {
    let stored: Vec<String> = sqlx::query_scalar("SELECT DISTINCT source_path FROM chunk_vectors")
        .fetch_all(pool)
        .await?;

    let mut removed = 0;
    for path in stored.iter().filter(|p| !live.contains(&p.as_str())) {
        let result = sqlx::query("DELETE FROM chunk_vectors WHERE source_path = ?")
            .bind(path)
            .execute(pool)
            .await?;
        removed += result.rows_affected();
    }
    Ok(removed)
}

/// Remove rows produced by any other model or dimensionality.
pub async fn retain_model(pool: &SqlitePool, model: &str, dims: usize) -> Result<u64> {
    let result = sqlx::query("DELETE FROM chunk_vectors WHERE model != ? OR dims != ?")
        .bind(model)
        .bind(dims as i64)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn clear(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM chunk_vectors").execute(pool).await?;
    Ok(result.rows_affected())
}

/// Load every stored record, ordered by source path and chunk index.
///
/// # Errors
///
/// Fails when a row was produced by a different model than `model`, or
/// when its vector length differs from `dims`.
pub async fn load_records(
    pool: &SqlitePool,
    model: &str,
    dims: usize,
) -> Result<Vec<EmbeddingRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, title, section, filename, chunk_index, text, model, dims, embedding
        FROM chunk_vectors
        ORDER BY source_path, chunk_index
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        let id: String = row.get("id");
        let row_model: String = row.get("model");
        if row_model != model {
            bail!(
                "Vector table row '{}' was embedded with '{}' but the active model is '{}'. Run `gw index --rebuild`.",
                id,
                row_model,
                model
            );
        }

        let blob: Vec<u8> = row.get("embedding");
        let vector = blob_to_vec(&blob);
        let row_dims: i64 = row.get("dims");
        if vector.len() != dims || row_dims as usize != dims {
            bail!(
                "Vector table row '{}' has {} dimensions, expected {}",
                id,
                vector.len(),
                dims
            );
        }

        records.push(EmbeddingRecord {
            id,
            metadata: RecordMetadata {
                title: row.get("title"),
                section: row.get("section"),
                filename: row.get("filename"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
            },
            vector,
        });
    }

    Ok(records)
}

/// Row count and distinct source count.
pub async fn counts(pool: &SqlitePool) -> Result<(i64, i64)> {
    let row = sqlx::query("SELECT COUNT(*) AS n, COUNT(DISTINCT source_path) AS files FROM chunk_vectors")
        .fetch_one(pool)
        .await?;
    Ok((row.get("n"), row.get("files")))
}
