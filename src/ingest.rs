//! Indexing pipeline: catalog → chunk → embed → vector table.
//!
//! Re-runs are incremental. A chunk whose text hash is already stored under
//! the active model keeps its vector; only new or changed chunks are sent to
//! the embedding provider. Rows for deleted files, for chunk positions past
//! the end of a shortened file, and for any other model are removed.
//!
//! A failed embedding batch is logged and counted as pending; the rest of
//! the corpus is still indexed.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::chunk::{chapter_label, collection_title, Chunker};
use crate::config::Config;
use crate::corpus;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::migrate;
use crate::models::{CatalogEntry, RecordMetadata};
use crate::vectors::{self, NewRow};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files: usize,
    pub unreadable: usize,
    pub chunks: usize,
    pub reused: usize,
    pub embedded: usize,
    pub pending: usize,
    pub removed: u64,
}

pub async fn run_index(config: &Config, rebuild: bool, dry_run: bool) -> Result<()> {
    let catalog = corpus::build_catalog(&config.corpus)?;
    let chunker = Chunker::from_config(&config.chunking);

    if dry_run {
        let mut chunks = 0usize;
        for entry in &catalog {
            if let Some(text) = read_source(entry) {
                chunks += chunker.chunks(&text).count();
            }
        }
        println!("index (dry-run)");
        println!("  files found: {}", catalog.len());
        println!("  estimated chunks: {}", chunks);
        return Ok(());
    }

    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let stats = index_catalog(
        &pool,
        provider.as_ref(),
        &catalog,
        chunker,
        config.embedding.batch_size,
        rebuild,
    )
    .await?;
    let (rows, files) = vectors::counts(&pool).await?;

    println!("index{}", if rebuild { " (rebuild)" } else { "" });
    println!("  files: {}", stats.files);
    if stats.unreadable > 0 {
        println!("  unreadable: {}", stats.unreadable);
    }
    println!("  chunks: {}", stats.chunks);
    println!("  reused: {}", stats.reused);
    println!("  embedded: {}", stats.embedded);
    println!("  pending: {}", stats.pending);
    println!("  removed rows: {}", stats.removed);
    println!("  stored: {} chunks from {} files", rows, files);
    println!("ok");

    pool.close().await;
    Ok(())
}

struct PendingChunk {
    source_path: String,
    metadata: RecordMetadata,
    text_hash: String,
}

/// Index an already-built catalog into `pool` with `provider`.
pub async fn index_catalog(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    catalog: &[CatalogEntry],
    chunker: Chunker,
    batch_size: usize,
    rebuild: bool,
) -> Result<IndexStats> {
    let model = provider.model_name().to_string();
    let mut stats = IndexStats {
        files: catalog.len(),
        ..Default::default()
    };

    if rebuild {
        stats.removed += vectors::clear(pool).await?;
    } else {
        let stale = vectors::retain_model(pool, &model, provider.dims()).await?;
        if stale > 0 {
            tracing::info!(rows = stale, model = %model, "dropped rows from a previous embedding model");
        }
        stats.removed += stale;
    }

    let live: Vec<&str> = catalog.iter().map(|e| e.relative_path.as_str()).collect();
    stats.removed += vectors::retain_sources(pool, &live).await?;

    let mut pending: Vec<PendingChunk> = Vec::new();

    for entry in catalog {
        let Some(text) = read_source(entry) else {
            stats.unreadable += 1;
            continue;
        };

        let stored = vectors::stored_hashes(pool, &entry.relative_path, &model).await?;
        let title = collection_title(&entry.collection);
        let section = chapter_label(&entry.filename);

        let mut count = 0i64;
        for chunk in chunker.chunk_document(&entry.relative_path, &section, &text) {
            count += 1;
            stats.chunks += 1;
            let chunk_index = chunk.sequence as i64;
            let text_hash = vectors::hash_text(&chunk.text);

            if stored.get(&chunk_index) == Some(&text_hash) {
                stats.reused += 1;
                continue;
            }

            pending.push(PendingChunk {
                source_path: chunk.document_id,
                metadata: RecordMetadata {
                    title: title.clone(),
                    section: chunk.chapter_label,
                    filename: entry.filename.clone(),
                    chunk_index,
                    text: chunk.text,
                },
                text_hash,
            });
        }

        stats.removed += vectors::truncate_source(pool, &entry.relative_path, count).await?;
        tracing::debug!(path = %entry.relative_path, chunks = count, "chunked");
    }

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|p| p.metadata.text.clone()).collect();

        match embedding::embed_texts(provider, &texts).await {
            Ok(vecs) => {
                for (item, vector) in batch.iter().zip(vecs.iter()) {
                    let row = NewRow {
                        source_path: &item.source_path,
                        metadata: &item.metadata,
                        text_hash: &item.text_hash,
                        vector,
                    };
                    vectors::upsert_row(pool, &row, &model).await?;
                    stats.embedded += 1;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, chunks = batch.len(), "embedding batch failed");
                stats.pending += batch.len();
            }
        }
    }

    tracing::info!(
        files = stats.files,
        chunks = stats.chunks,
        embedded = stats.embedded,
        reused = stats.reused,
        "index complete"
    );
    Ok(stats)
}

fn read_source(entry: &CatalogEntry) -> Option<String> {
    match std::fs::read(&entry.absolute_path) {
        Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Err(e) => {
            tracing::warn!(path = %entry.absolute_path.display(), error = %e, "skipping unreadable file");
            None
        }
    }
}
