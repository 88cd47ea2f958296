//! Export the vector table as JSON.
//!
//! Produces one object per stored chunk with its metadata and the embedding
//! inline as a float array, for downstream tools that do their own ranking.

use anyhow::Result;
use serde::Serialize;
use sqlx::Row;
use std::path::Path;

use crate::config::Config;
use crate::db;
use crate::embedding::blob_to_vec;
use crate::migrate;

#[derive(Serialize)]
struct ExportData {
    model: Option<String>,
    dims: Option<i64>,
    chunks: Vec<ExportChunk>,
}

#[derive(Serialize)]
struct ExportChunk {
    id: String,
    title: String,
    section: String,
    filename: String,
    source_path: String,
    chunk_index: i64,
    text: String,
    embedding: Vec<f32>,
}

/// Export every stored chunk as JSON.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(config: &Config, output: Option<&Path>) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let rows = sqlx::query(
        "SELECT id, title, section, filename, source_path, chunk_index, text, model, dims, embedding \
         FROM chunk_vectors ORDER BY source_path, chunk_index",
    )
    .fetch_all(&pool)
    .await?;

    let model: Option<String> = rows.first().map(|row| row.get("model"));
    let dims: Option<i64> = rows.first().map(|row| row.get("dims"));

    let chunks: Vec<ExportChunk> = rows
        .iter()
        .map(|row| {
            let blob: Vec<u8> = row.get("embedding");
            ExportChunk {
                id: row.get("id"),
                title: row.get("title"),
                section: row.get("section"),
                filename: row.get("filename"),
                source_path: row.get("source_path"),
                chunk_index: row.get("chunk_index"),
                text: row.get("text"),
                embedding: blob_to_vec(&blob),
            }
        })
        .collect();

    let chunk_count = chunks.len();
    let data = ExportData {
        model,
        dims,
        chunks,
    };
    let json = serde_json::to_string_pretty(&data)?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)?;
            tracing::info!(chunks = chunk_count, path = %path.display(), "exported vector table");
        }
        None => {
            println!("{}", json);
        }
    }

    pool.close().await;
    Ok(())
}
