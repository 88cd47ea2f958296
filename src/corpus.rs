//! Corpus catalog: the flat, numbered list of source files.
//!
//! The catalog is built in one walk over the corpus root and is read-only
//! afterwards. Entries are sorted by relative path, never by traversal
//! order, so the 1-based numbering shown to the model is identical across
//! runs on the same tree.

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use walkdir::WalkDir;

use crate::config::CorpusConfig;
use crate::models::CatalogEntry;

/// Walk the corpus root and return every matching file, sorted by path.
///
/// Unreadable entries (permissions, broken links) are logged and skipped.
pub fn build_catalog(config: &CorpusConfig) -> Result<Vec<CatalogEntry>> {
    let root = &config.root;
    if !root.is_dir() {
        bail!("Corpus root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut entries = Vec::new();

    let walker = WalkDir::new(root).follow_links(config.follow_symlinks);
    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable corpus entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = normalize_separators(&relative.to_string_lossy());

        if exclude_set.is_match(&rel_str) {
            continue;
        }
        if !include_set.is_match(&rel_str) {
            continue;
        }

        entries.push(to_entry(path, rel_str));
    }

    // Sort for deterministic numbering
    entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));

    tracing::debug!(root = %root.display(), files = entries.len(), "catalog built");
    Ok(entries)
}

fn to_entry(path: &Path, relative_path: String) -> CatalogEntry {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let collection = match relative_path.split_once('/') {
        Some((first, _)) => first.to_string(),
        None => String::new(),
    };

    CatalogEntry {
        relative_path,
        filename,
        collection,
        absolute_path: path.to_path_buf(),
    }
}

/// Unify `\` and `/` so paths compare the same on every platform.
pub fn normalize_separators(path: &str) -> String {
    path.replace('\\', "/")
}

/// Numbered listing used in resolver prompts: `1. Books/Ch1.txt`.
pub fn numbered_listing(catalog: &[CatalogEntry]) -> String {
    catalog
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {}", i + 1, e.relative_path))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Print the numbered catalog with collection and file count.
pub fn run_catalog(config: &CorpusConfig) -> Result<()> {
    let catalog = build_catalog(config)?;
    if catalog.is_empty() {
        println!("No source files under {}", config.root.display());
        return Ok(());
    }

    let width = catalog.len().to_string().len();
    for (i, entry) in catalog.iter().enumerate() {
        println!("{:>width$}. {}", i + 1, entry.relative_path, width = width);
    }

    let mut collections: Vec<&str> = catalog.iter().map(|e| e.collection.as_str()).collect();
    collections.sort_unstable();
    collections.dedup();
    println!();
    println!("{} files in {} collections", catalog.len(), collections.len());
    Ok(())
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
