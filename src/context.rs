//! Per-run state shared by the resolve and grade stages.

use anyhow::Result;

use crate::config::Config;
use crate::corpus;
use crate::judge::GroundedJudge;
use crate::llm::{self, CompletionClient};
use crate::models::CatalogEntry;
use crate::resolver::{CitationResolver, SourceCache};

/// Built once per command and borrowed by every component that needs the
/// catalog, the completion client, or loaded source text.
pub struct RunContext {
    pub config: Config,
    pub catalog: Vec<CatalogEntry>,
    pub client: Box<dyn CompletionClient>,
    pub sources: SourceCache,
}

impl RunContext {
    /// Walk the corpus and connect the configured completion client.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = llm::create_client(&config.llm)?;
        Self::with_client(config, client)
    }

    pub fn with_client(config: Config, client: Box<dyn CompletionClient>) -> Result<Self> {
        let catalog = corpus::build_catalog(&config.corpus)?;
        let sources = SourceCache::new(config.corpus.root.clone());
        tracing::info!(
            files = catalog.len(),
            model = client.model_name(),
            "run context ready"
        );
        Ok(Self {
            config,
            catalog,
            client,
            sources,
        })
    }

    pub fn resolver(&self) -> CitationResolver<'_> {
        CitationResolver::new(&self.catalog, self.client.as_ref(), &self.config.citations)
    }

    pub fn judge(&self) -> GroundedJudge<'_> {
        GroundedJudge::new(
            self.client.as_ref(),
            &self.config.grading,
            &self.config.generation,
        )
    }
}
