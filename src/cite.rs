//! `gw resolve`: attach a source citation to every response.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::context::RunContext;
use crate::dataset::Dataset;
use crate::resolver::MatchKind;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolveSummary {
    pub total: usize,
    pub skipped_existing: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl ResolveSummary {
    pub fn found(&self) -> usize {
        self.exact + self.fuzzy
    }
}

/// Resolve citations in place. Items that already carry a citation are kept
/// unless `force` is set. A failed lookup leaves the item's citation as it was.
pub async fn resolve_dataset(
    ctx: &RunContext,
    dataset: &mut Dataset,
    force: bool,
) -> Result<ResolveSummary> {
    let resolver = ctx.resolver();
    let mut summary = ResolveSummary {
        total: dataset.items().len(),
        ..Default::default()
    };

    for index in 0..dataset.items().len() {
        let item = &dataset.items()[index];
        if item.citation.is_some() && !force {
            summary.skipped_existing += 1;
            continue;
        }

        let resolution = resolver.resolve(&item.response_text).await;
        tracing::info!(
            student = %item.student,
            question = item.question,
            risk = item.risk,
            citation = %resolution.citation,
            kind = ?resolution.kind,
            "resolved"
        );

        match resolution.kind {
            MatchKind::Exact => summary.exact += 1,
            MatchKind::Fuzzy => summary.fuzzy += 1,
            MatchKind::NotFound | MatchKind::Skipped => summary.not_found += 1,
            MatchKind::Failed => {
                // Left unwritten so the next run retries it
                summary.failed += 1;
                continue;
            }
        }
        dataset.set_citation(index, resolution.citation)?;
    }

    Ok(summary)
}

pub async fn run_resolve(
    config: &Config,
    input: &Path,
    output: Option<&Path>,
    force: bool,
) -> Result<()> {
    let mut dataset = Dataset::load(input, &config.grading)?;
    let ctx = RunContext::from_config(config.clone())?;

    let summary = resolve_dataset(&ctx, &mut dataset, force).await?;

    let output_path = output.unwrap_or(input);
    dataset.save(output_path)?;

    println!("resolve");
    println!("  responses: {}", summary.total);
    println!("  kept existing: {}", summary.skipped_existing);
    println!("  found: {} (exact {}, fuzzy {})", summary.found(), summary.exact, summary.fuzzy);
    println!("  not found: {}", summary.not_found);
    println!("  failed: {}", summary.failed);
    println!("  output: {}", output_path.display());
    println!("ok");

    Ok(())
}
