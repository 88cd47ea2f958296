//! `gw grade`: grade every response against the source it cites.
//!
//! Items are grouped by citation so each source file is loaded once, then
//! graded in fixed-size batches. Batches run one after another; a failed
//! batch marks only its own items as errors.

use anyhow::Result;
use std::path::Path;

use crate::config::Config;
use crate::context::RunContext;
use crate::dataset::Dataset;
use crate::grouping::group_selected;
use crate::judge::Grounding;
use crate::models::ResponseItem;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GradeSummary {
    pub total: usize,
    pub skipped_existing: usize,
    pub groups: usize,
    pub batches: usize,
    pub graded: usize,
    pub errors: usize,
}

/// Grade in place. Items holding a non-error grade are kept unless
/// `regrade` is set.
pub async fn grade_dataset(
    ctx: &RunContext,
    dataset: &mut Dataset,
    regrade: bool,
) -> Result<GradeSummary> {
    let items = dataset.items();
    let pending: Vec<usize> = (0..items.len())
        .filter(|&i| regrade || items[i].grade.as_ref().map_or(true, |g| g.is_error()))
        .collect();

    let unresolved = pending.iter().filter(|&&i| items[i].citation.is_none()).count();
    if unresolved > 0 {
        tracing::warn!(unresolved, "some responses have no citation field; run `gw resolve` first");
    }

    let groups = group_selected(items, &pending);
    let mut summary = GradeSummary {
        total: items.len(),
        skipped_existing: items.len() - pending.len(),
        groups: groups.len(),
        ..Default::default()
    };

    let judge = ctx.judge();
    let batch_size = ctx.config.grading.batch_size;

    for group in &groups {
        let content = group.target.as_deref().and_then(|t| ctx.sources.load(t));
        let grounding = Grounding {
            target: group.target.as_deref(),
            content: content.as_deref(),
        };
        tracing::info!(
            citation = group.target.as_deref().unwrap_or("NOT_FOUND"),
            responses = group.items.len(),
            grounded = content.is_some(),
            "grading citation group"
        );

        for batch in group.batches(batch_size) {
            let batch_items: Vec<&ResponseItem> =
                batch.iter().map(|&i| &dataset.items()[i]).collect();
            let grades = judge.grade_batch(grounding, &batch_items).await;
            summary.batches += 1;

            for (&index, grade) in batch.iter().zip(grades) {
                if grade.is_error() {
                    summary.errors += 1;
                } else {
                    summary.graded += 1;
                }
                dataset.set_grade(index, grade)?;
            }
        }
    }

    Ok(summary)
}

pub async fn run_grade(
    config: &Config,
    input: &Path,
    output: Option<&Path>,
    regrade: bool,
) -> Result<()> {
    let mut dataset = Dataset::load(input, &config.grading)?;
    let ctx = RunContext::from_config(config.clone())?;

    let summary = grade_dataset(&ctx, &mut dataset, regrade).await?;

    let output_path = output.unwrap_or(input);
    dataset.save(output_path)?;

    println!("grade");
    println!("  responses: {}", summary.total);
    println!("  kept existing: {}", summary.skipped_existing);
    println!("  citation groups: {}", summary.groups);
    println!("  batches: {}", summary.batches);
    println!("  graded: {}", summary.graded);
    println!("  errors: {}", summary.errors);
    println!("  output: {}", output_path.display());
    println!("ok");

    Ok(())
}
