//! Citation resolution: free text → one catalog path, or `NOT_FOUND`.
//!
//! The model sees the numbered catalog and the raw text and is asked for a
//! single path. Its reply is accepted verbatim when it equals a catalog path;
//! otherwise a case-insensitive, separator-normalized substring match is
//! tried in catalog order. Any failure along the way resolves to
//! [`Citation::NotFound`] and never stops the run.
//!
//! [`SourceCache`] loads resolved files lazily and memoizes the result
//! (including absence) for the lifetime of the cache.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::CitationConfig;
use crate::corpus::{normalize_separators, numbered_listing};
use crate::llm::{CompletionClient, CompletionRequest};
use crate::models::{CatalogEntry, Citation, NOT_FOUND};

const RESOLVER_SYSTEM_PROMPT: &str =
    "You are a precise citation matcher. Return only the exact file path from the provided list.";

/// How a citation reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy,
    /// The model answered, but nothing in the catalog matched.
    NotFound,
    /// Text was empty or too short to contain a citation.
    Skipped,
    /// The completion call failed. Callers should leave the item unresolved.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub citation: Citation,
    pub kind: MatchKind,
}

impl Resolution {
    fn found(path: &str, kind: MatchKind) -> Self {
        Self {
            citation: Citation::Resolved(path.to_string()),
            kind,
        }
    }

    fn not_found(kind: MatchKind) -> Self {
        Self {
            citation: Citation::NotFound,
            kind,
        }
    }
}

pub struct CitationResolver<'a> {
    catalog: &'a [CatalogEntry],
    listing: String,
    client: &'a dyn CompletionClient,
    settings: &'a CitationConfig,
}

impl<'a> CitationResolver<'a> {
    pub fn new(
        catalog: &'a [CatalogEntry],
        client: &'a dyn CompletionClient,
        settings: &'a CitationConfig,
    ) -> Self {
        Self {
            catalog,
            listing: numbered_listing(catalog),
            client,
            settings,
        }
    }

    pub async fn resolve(&self, raw: &str) -> Resolution {
        if raw.trim().chars().count() < self.settings.min_chars {
            return Resolution::not_found(MatchKind::Skipped);
        }

        let request = CompletionRequest {
            system: RESOLVER_SYSTEM_PROMPT.to_string(),
            user: resolution_prompt(&self.listing, raw),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let reply = match self.client.complete(&request).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(error = %e, "citation lookup failed");
                return Resolution::not_found(MatchKind::Failed);
            }
        };
        tracing::debug!(reply = %reply, "citation lookup reply");

        self.match_reply(&reply)
    }

    /// Map a model reply onto the catalog.
    pub fn match_reply(&self, reply: &str) -> Resolution {
        let reply = reply.trim();
        if reply.is_empty() || reply == NOT_FOUND {
            return Resolution::not_found(MatchKind::NotFound);
        }

        if let Some(entry) = self.catalog.iter().find(|e| e.relative_path == reply) {
            return Resolution::found(&entry.relative_path, MatchKind::Exact);
        }

        match fuzzy_match(self.catalog, reply) {
            Some(entry) => Resolution::found(&entry.relative_path, MatchKind::Fuzzy),
            None => Resolution::not_found(MatchKind::NotFound),
        }
    }
}

/// First catalog entry that contains, or is contained in, `reply` after
/// lowercasing and unifying separators.
pub fn fuzzy_match<'c>(catalog: &'c [CatalogEntry], reply: &str) -> Option<&'c CatalogEntry> {
    let needle = normalize_separators(reply.trim()).to_lowercase();
    if needle.is_empty() {
        return None;
    }

    catalog.iter().find(|entry| {
        let candidate = normalize_separators(&entry.relative_path).to_lowercase();
        candidate.contains(&needle) || needle.contains(&candidate)
    })
}

fn resolution_prompt(listing: &str, raw: &str) -> String {
    format!(
        "You are a citation file locator. Given a response text that contains citations, \
identify which file from the available files list contains the cited source.

Available files:
{listing}

Response text:
{raw}

Instructions:
1. Identify the citation in the response text (book title, chapter, author, article name, etc.)
2. Match it to the most appropriate file from the available files list
3. Return ONLY the file path exactly as it appears in the list above
4. If multiple files match, return the most specific match
5. If no file matches, return \"{NOT_FOUND}\"

Return only the file path, nothing else."
    )
}

/// Lazily loaded source file contents, keyed by catalog-relative path.
///
/// A path that cannot be read is reported once and remembered as absent.
pub struct SourceCache {
    root: PathBuf,
    entries: Mutex<HashMap<String, Option<Arc<str>>>>,
}

impl SourceCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn load(&self, relative_path: &str) -> Option<Arc<str>> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(cached) = entries.get(relative_path) {
            return cached.clone();
        }

        let content = self.read(relative_path);
        entries.insert(relative_path.to_string(), content.clone());
        content
    }

    /// Number of distinct paths looked up so far.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self, relative_path: &str) -> Option<Arc<str>> {
        let relative = Path::new(relative_path);
        let escapes_root = relative.is_absolute()
            || relative
                .components()
                .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)));
        if escapes_root {
            tracing::warn!(path = relative_path, "refusing to load citation outside corpus root");
            return None;
        }

        let full_path = self.root.join(relative);
        match std::fs::read(&full_path) {
            Ok(bytes) => Some(Arc::from(String::from_utf8_lossy(&bytes).as_ref())),
            Err(e) => {
                tracing::warn!(path = %full_path.display(), error = %e, "citation file not found");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct Scripted {
        reply: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn replying(reply: &'static str) -> Self {
            Self {
                reply: Ok(reply),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(|_| LlmError::InvalidResponse("boom".to_string()))
        }
    }

    fn catalog(paths: &[&str]) -> Vec<CatalogEntry> {
        paths
            .iter()
            .map(|p| CatalogEntry {
                relative_path: p.to_string(),
                filename: p.rsplit('/').next().unwrap_or(p).to_string(),
                collection: p.split('/').next().unwrap_or("").to_string(),
                absolute_path: PathBuf::from(p),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_short_text_skips_collaborator() {
        let cat = catalog(&["MMM/Ch4.txt"]);
        let client = Scripted::replying("MMM/Ch4.txt");
        let settings = CitationConfig::default();
        let resolver = CitationResolver::new(&cat, &client, &settings);

        assert_eq!(resolver.resolve("").await.kind, MatchKind::Skipped);
        assert_eq!(resolver.resolve("  Brooks  ").await.citation, Citation::NotFound);
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exact_reply_accepted() {
        let cat = catalog(&["MMM/Ch1.txt", "MMM/Ch4.txt"]);
        let client = Scripted::replying("MMM/Ch4.txt");
        let settings = CitationConfig::default();
        let resolver = CitationResolver::new(&cat, &client, &settings);

        let r = resolver
            .resolve("Brooks, Mythical Man-Month, Chapter 4")
            .await;
        assert_eq!(r.citation, Citation::Resolved("MMM/Ch4.txt".to_string()));
        assert_eq!(r.kind, MatchKind::Exact);
    }

    #[tokio::test]
    async fn test_backslash_reply_resolves_fuzzily() {
        let cat = catalog(&["MMM/Ch1.txt", "MMM/Ch4.txt"]);
        let client = Scripted::replying("mmm\\ch4.txt");
        let settings = CitationConfig::default();
        let resolver = CitationResolver::new(&cat, &client, &settings);

        let r = resolver.resolve("Mythical Man-Month chapter four").await;
        assert_eq!(r.citation, Citation::Resolved("MMM/Ch4.txt".to_string()));
        assert_eq!(r.kind, MatchKind::Fuzzy);
    }

    #[tokio::test]
    async fn test_failure_is_not_found() {
        let cat = catalog(&["MMM/Ch4.txt"]);
        let client = Scripted {
            reply: Err(()),
            calls: AtomicUsize::new(0),
        };
        let settings = CitationConfig::default();
        let resolver = CitationResolver::new(&cat, &client, &settings);

        let r = resolver.resolve("Brooks, Mythical Man-Month, Chapter 4").await;
        assert_eq!(r.citation, Citation::NotFound);
        assert_eq!(r.kind, MatchKind::Failed);
    }

    #[test]
    fn test_sentinel_and_empty_reply() {
        let cat = catalog(&["MMM/Ch4.txt"]);
        let client = Scripted::replying("");
        let settings = CitationConfig::default();
        let resolver = CitationResolver::new(&cat, &client, &settings);

        assert_eq!(resolver.match_reply("NOT_FOUND").citation, Citation::NotFound);
        assert_eq!(resolver.match_reply("   ").citation, Citation::NotFound);
        assert_eq!(
            resolver.match_reply("Peopleware/ch2.txt").kind,
            MatchKind::NotFound
        );
    }

    #[test]
    fn test_fuzzy_first_match_wins() {
        let cat = catalog(&["MMM/Ch1.txt", "MMM/Ch10.txt"]);
        // "mmm/ch1" is contained in both; catalog order decides.
        assert_eq!(
            fuzzy_match(&cat, "MMM/Ch1").map(|e| e.relative_path.as_str()),
            Some("MMM/Ch1.txt")
        );
        // Reply containing a catalog path also matches.
        assert_eq!(
            fuzzy_match(&cat, "Books/MMM/Ch10.txt").map(|e| e.relative_path.as_str()),
            Some("MMM/Ch10.txt")
        );
    }

    #[test]
    fn test_source_cache_memoizes() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("MMM")).unwrap();
        std::fs::write(tmp.path().join("MMM/Ch4.txt"), "Adding manpower...").unwrap();

        let cache = SourceCache::new(tmp.path());
        let first = cache.load("MMM/Ch4.txt").unwrap();
        std::fs::remove_file(tmp.path().join("MMM/Ch4.txt")).unwrap();
        let second = cache.load("MMM/Ch4.txt").unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        assert!(cache.load("MMM/missing.txt").is_none());
        assert!(cache.load("../outside.txt").is_none());
        assert_eq!(cache.len(), 3);
    }
}
