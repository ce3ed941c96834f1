//! Workspace umbrella crate for the provision relatedness engine.
//!
//! `lexgraph` wires the stage crates (store, semantic, query, lexical,
//! graph, relatedness, search, indexer) into one engine behind a single
//! YAML configuration, and re-exports their public types so applications
//! need only this dependency.
//!
//! ## Quick start
//!
//! ```no_run
//! use lexgraph::{CorpusInfo, LexGraph, LexGraphConfig};
//!
//! # fn demo() -> Result<(), lexgraph::LexGraphError> {
//! let config = LexGraphConfig::in_memory(CorpusInfo::new(
//!     "ITAA1997",
//!     "Income Tax Assessment Act 1997",
//! ));
//! let engine = LexGraph::open(config)?;
//!
//! // Ingest replaces the corpus, embeds every provision, rebuilds the
//! // baseline and fingerprints, and advances the graph version.
//! // engine.ingest_corpus("ITAA1997", &provisions, &references, &usages)?;
//!
//! let response = engine.search("s 6-5 ordinary income", 10, 0, "ITAA1997")?;
//! println!("{}", serde_json::to_string_pretty(&response).unwrap());
//! # Ok(())
//! # }
//! ```
//!
//! ## Errors
//!
//! Failures from any stage converge on [`LexGraphError`], which preserves
//! the source error so callers can distinguish configuration, storage,
//! search, indexing, and embedding faults without depending on the
//! individual stage crates.

pub mod config;

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use graph::GraphBuilder;
use indexer::{Indexer, IndexerError};
use lexical::LexicalRetriever;
use query::QueryParser;
use relatedness::RelatednessEngine;
use search::UnifiedSearch;
use semantic::PROVISION_ENTITY_KIND;
use store::{EmbeddingRecord, EntityStore, StoreConfig, StoreError};

pub use config::{ConfigError, LexGraphConfig};
pub use graph::{EdgeView, ExpansionLimits, GraphWeights};
pub use indexer::{IndexSummary, IndexerConfig};
pub use lexical::{LexicalCandidate, LexicalConfig};
pub use query::{normalize_query, ParsedToken, QueryInterpretation, ALL_CORPORA};
pub use relatedness::ApprConfig;
pub use search::{
    DebugInfo, DetailOptions, DetailResponse, Pagination, ScoredResult, SearchConfig,
    SearchError, SearchResponse,
};
pub use semantic::{Embedder, SemanticConfig, SemanticEmbedding, SemanticError, StubEmbedder};
pub use store::{
    BackendConfig, CorpusInfo, CorpusRegistry, DefinedTermUsage, ExclusionPolicy, Fingerprint,
    Provision, ProvisionKind, Reference, RefId,
};

/// Engine-level error union.
#[derive(Error, Debug)]
pub enum LexGraphError {
    #[error("configuration failure: {0}")]
    Config(#[from] ConfigError),
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("search failure: {0}")]
    Search(#[from] SearchError),
    #[error("indexing failure: {0}")]
    Index(#[from] IndexerError),
    #[error("embedding failure: {0}")]
    Semantic(#[from] SemanticError),
}

/// The assembled engine: one store, one corpus registry, the unified search
/// orchestrator, and the ingest-time indexer.
pub struct LexGraph {
    store: Arc<EntityStore>,
    search: UnifiedSearch,
    indexer: Indexer,
    embedder: Arc<dyn Embedder>,
    embed_model_id: String,
}

impl LexGraph {
    /// Open an engine from a validated configuration. Embeddings default to
    /// the deterministic stub; swap in a model-backed [`Embedder`] with
    /// [`LexGraph::with_embedder`].
    pub fn open(config: LexGraphConfig) -> Result<Self, LexGraphError> {
        config.validate()?;

        let store = Arc::new(EntityStore::new(
            StoreConfig::new().with_backend(config.store.backend_config()),
        )?);
        let registry = Arc::new(config.registry());
        let policy = Arc::new(ExclusionPolicy::from_registry(&registry));

        let parser = QueryParser::new(store.clone(), registry.clone());
        let retriever = LexicalRetriever::new(store.clone(), config.lexical.clone());
        let builder = GraphBuilder::new(
            store.clone(),
            policy.clone(),
            config.graph.weights,
            config.graph.limits,
            &config.semantic.model_id,
        );
        let relatedness = RelatednessEngine::new(store.clone(), policy.clone(), builder, config.appr);
        let search = UnifiedSearch::new(
            store.clone(),
            registry,
            policy,
            parser,
            retriever,
            relatedness,
            config.search.clone(),
        );
        let indexer = Indexer::new(store.clone(), config.indexer_config());
        let embedder: Arc<dyn Embedder> = Arc::new(StubEmbedder::new(config.semantic.clone()));
        let embed_model_id = config.semantic.model_id.clone();

        info!(corpora = ?config.corpora.entries.iter().map(|c| &c.id).collect::<Vec<_>>(), "engine opened");
        Ok(Self {
            store,
            search,
            indexer,
            embedder,
            embed_model_id,
        })
    }

    /// Replace the embedding backend.
    pub fn with_embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embed_model_id = embedder.model_id().to_string();
        self.embedder = embedder;
        self
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Replace one corpus's content, embed every provision, rebuild the
    /// baseline and fingerprints, and advance the graph version.
    pub fn ingest_corpus(
        &self,
        corpus_id: &str,
        provisions: &[Provision],
        references: &[Reference],
        usages: &[DefinedTermUsage],
    ) -> Result<IndexSummary, LexGraphError> {
        self.store
            .replace_corpus(corpus_id, provisions, references, usages)?;

        let mut records = Vec::with_capacity(provisions.len());
        for p in provisions {
            let text = match &p.content_md {
                Some(content) => format!("{}\n{}", p.title, content),
                None => p.title.clone(),
            };
            let embedding = self.embedder.embed(&p.internal_id, &text)?;
            records.push(EmbeddingRecord {
                entity_kind: PROVISION_ENTITY_KIND.to_string(),
                entity_id: p.internal_id.clone(),
                model_id: self.embed_model_id.clone(),
                dim: embedding.dim,
                l2_norm: embedding.l2_norm(),
                vector: embedding.vector,
            });
        }
        self.store.put_embeddings_bulk(&records)?;

        Ok(self.indexer.run(corpus_id)?)
    }

    /// Rebuild the index artifacts for a corpus without re-ingesting it.
    pub fn index_corpus(&self, corpus_id: &str) -> Result<IndexSummary, LexGraphError> {
        Ok(self.indexer.run(corpus_id)?)
    }

    /// Run a unified search. `corpus_id` names one corpus or `*` for all.
    pub fn search(
        &self,
        query: &str,
        k: usize,
        offset: usize,
        corpus_id: &str,
    ) -> Result<SearchResponse, LexGraphError> {
        Ok(self.search.search(query, k, offset, corpus_id)?)
    }

    /// Detailed view of one provision by internal id or flexible citation
    /// token.
    pub fn provision_detail(
        &self,
        id_or_token: &str,
        corpus_id: &str,
        opts: &DetailOptions,
    ) -> Result<DetailResponse, LexGraphError> {
        Ok(self.search.provision_detail(id_or_token, corpus_id, opts)?)
    }
}
