//! Semantic search over the vector table, with optional grounded answers.

use anyhow::{bail, Result};
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::judge::{ContextPassage, GroundedJudge};
use crate::llm;
use crate::migrate;
use crate::models::RecordMetadata;
use crate::rank;
use crate::vectors;

/// One ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub metadata: RecordMetadata,
}

impl From<&SearchHit> for ContextPassage {
    fn from(hit: &SearchHit) -> Self {
        ContextPassage {
            title: hit.metadata.title.clone(),
            section: hit.metadata.section.clone(),
            score: hit.score,
            text: hit.metadata.text.clone(),
        }
    }
}

/// Embed `query` and return the `k` most similar stored chunks.
pub async fn search(
    pool: &SqlitePool,
    provider: &dyn EmbeddingProvider,
    query: &str,
    k: usize,
) -> Result<Vec<SearchHit>> {
    let records = vectors::load_records(pool, provider.model_name(), provider.dims()).await?;
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let query_vec = embedding::embed_query(provider, query).await?;
    let hits = rank::top_k(&query_vec, &records, k)?
        .into_iter()
        .map(|r| SearchHit {
            id: r.record.id.clone(),
            score: r.score,
            metadata: r.record.metadata.clone(),
        })
        .collect();

    Ok(hits)
}

pub async fn run_search(
    config: &Config,
    query: &str,
    top_k: Option<usize>,
    answer: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let provider = embedding::create_provider(&config.embedding)?;
    let pool = db::connect(config).await?;
    migrate::ensure_schema(&pool).await?;

    let k = top_k.unwrap_or(config.retrieval.top_k);
    let hits = search(&pool, provider.as_ref(), query, k).await?;
    pool.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} / {} (chunk {})",
            i + 1,
            hit.score,
            hit.metadata.title,
            hit.metadata.section,
            hit.metadata.chunk_index
        );
        println!("    file: {}", hit.metadata.filename);
        println!("    id: {}", hit.id);
        println!("    {}", snippet(&hit.metadata.text, 200));
        println!();
    }

    if answer {
        let client = llm::create_client(&config.llm)?;
        let judge = GroundedJudge::new(client.as_ref(), &config.grading, &config.generation);
        let passages: Vec<ContextPassage> = hits.iter().map(ContextPassage::from).collect();
        let text = judge
            .generate_answer(query, &passages, config.retrieval.context_chars)
            .await?;
        println!("Answer:");
        println!("{}", text);
    }

    Ok(())
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = crate::judge::truncate_chars(&flat, max_chars);
    if cut.len() < flat.len() {
        format!("{}...", cut)
    } else {
        flat
    }
}
