//! # Ingest-time indexing
//!
//! Builds the whole-corpus mixed graph, computes the baseline stationary
//! distribution, optionally precomputes every per-seed fingerprint, and
//! installs the artifacts stamped with `current_version + 1`. The graph
//! version bump is the very last step: an interrupted run leaves the older
//! artifacts authoritative, which is what makes the batch resumable.

use std::sync::Arc;

use hashbrown::HashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use graph::{build_global_adjacency, GraphWeights, NormalizedAdjacency};
use relatedness::{approx_ppr_push, power_iteration_baseline, ApprConfig, BASELINE_ITERATIONS};
use store::{EntityStore, Fingerprint, StoreError};

#[derive(Error, Debug)]
pub enum IndexerError {
    #[error("store failure during indexing: {0}")]
    Store(#[from] StoreError),
    #[error("invariant violation during indexing: {0}")]
    InvariantViolation(String),
}

/// Batch configuration.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct IndexerConfig {
    pub weights: GraphWeights,
    pub appr: ApprConfig,
    /// Precompute a fingerprint for every provision. Query time falls back
    /// to lazy computation when this is off.
    pub precompute_fingerprints: bool,
    /// Overlay vector-neighbor edges when embeddings are present.
    pub include_semantic: bool,
    pub embed_model_id: String,
    /// Vector neighbors per provision for the semantic overlay.
    pub sem_k: usize,
    pub baseline_iterations: usize,
    /// Fan the fingerprint precompute across the thread pool.
    pub parallel: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            weights: GraphWeights::default(),
            appr: ApprConfig::default(),
            precompute_fingerprints: true,
            include_semantic: true,
            embed_model_id: "stub-384".to_string(),
            sem_k: 80,
            baseline_iterations: BASELINE_ITERATIONS,
            parallel: true,
        }
    }
}

/// What one run produced.
#[derive(Clone, Debug)]
pub struct IndexSummary {
    pub corpus_id: String,
    pub provisions: usize,
    pub baseline_entries: usize,
    pub fingerprints: usize,
    pub graph_version: u64,
}

/// Runs the offline batch for one corpus at a time.
pub struct Indexer {
    store: Arc<EntityStore>,
    cfg: IndexerConfig,
}

impl Indexer {
    pub fn new(store: Arc<EntityStore>, cfg: IndexerConfig) -> Self {
        Self { store, cfg }
    }

    /// Build and install baseline plus fingerprints for `corpus_id`, then
    /// advance the graph version.
    pub fn run(&self, corpus_id: &str) -> Result<IndexSummary, IndexerError> {
        let provisions = self.store.list_provisions(corpus_id)?;
        if provisions.is_empty() {
            let version = self.store.current_graph_version()?;
            return Ok(IndexSummary {
                corpus_id: corpus_id.to_string(),
                provisions: 0,
                baseline_entries: 0,
                fingerprints: 0,
                graph_version: version,
            });
        }
        let references = self.store.all_references(corpus_id)?;
        let usages = self.store.all_term_usages(corpus_id)?;
        let sem_neighbors = if self.cfg.include_semantic {
            self.collect_semantic_neighbors(corpus_id, &provisions)?
        } else {
            HashMap::new()
        };

        let (nodes, adjacency) = build_global_adjacency(
            &provisions,
            &references,
            &usages,
            &sem_neighbors,
            &self.cfg.weights,
        );

        let baseline = power_iteration_baseline(
            &adjacency,
            &nodes,
            self.cfg.appr.gamma,
            self.cfg.baseline_iterations,
        );
        let total: f64 = baseline.values().sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(IndexerError::InvariantViolation(format!(
                "baseline mass for {corpus_id} sums to {total}"
            )));
        }

        let target_version = self.store.current_graph_version()? + 1;
        let scores: Vec<(String, f64)> = nodes
            .iter()
            .map(|node| (node.clone(), baseline.get(node).copied().unwrap_or(0.0)))
            .collect();
        self.store.put_baseline_bulk(&scores, target_version)?;

        let fingerprints = if self.cfg.precompute_fingerprints {
            let computed = self.precompute(&adjacency, &nodes, target_version);
            self.store.put_fingerprints_bulk(&computed)?;
            computed.len()
        } else {
            0
        };

        let new_version = self.store.bump_graph_version()?;
        if new_version != target_version {
            warn!(
                corpus_id,
                expected = target_version,
                actual = new_version,
                "graph version advanced past the indexed target; artifacts are stale"
            );
        }
        info!(
            corpus_id,
            provisions = provisions.len(),
            fingerprints,
            version = new_version,
            "index build installed"
        );
        Ok(IndexSummary {
            corpus_id: corpus_id.to_string(),
            provisions: provisions.len(),
            baseline_entries: scores.len(),
            fingerprints,
            graph_version: new_version,
        })
    }

    fn collect_semantic_neighbors(
        &self,
        corpus_id: &str,
        provisions: &[store::Provision],
    ) -> Result<HashMap<String, Vec<String>>, IndexerError> {
        let prefix = format!("{corpus_id}_");
        let mut out = HashMap::new();
        for p in provisions {
            let Some(vector) =
                self.store
                    .get_embedding("provision", &p.internal_id, &self.cfg.embed_model_id)?
            else {
                continue;
            };
            let neighbors: Vec<String> = self
                .store
                .semantic_knn(
                    "provision",
                    &self.cfg.embed_model_id,
                    &vector,
                    self.cfg.sem_k + 1,
                )?
                .into_iter()
                .map(|(id, _)| id)
                .filter(|id| id != &p.internal_id && id.starts_with(&prefix))
                .take(self.cfg.sem_k)
                .collect();
            if !neighbors.is_empty() {
                out.insert(p.internal_id.clone(), neighbors);
            }
        }
        Ok(out)
    }

    fn precompute(
        &self,
        adjacency: &NormalizedAdjacency,
        nodes: &[String],
        target_version: u64,
    ) -> Vec<(String, Fingerprint)> {
        let compute_one = |seed: &String| {
            let result = approx_ppr_push(
                adjacency,
                &[(seed.clone(), 1.0)],
                &self.cfg.appr,
                self.cfg.appr.top_k + 1,
            );
            let mut neighbors: Vec<(String, f64)> = result
                .entries
                .into_iter()
                .filter(|(node, _)| node != seed)
                .collect();
            neighbors.truncate(self.cfg.appr.top_k);
            let captured_mass = neighbors.iter().map(|(_, m)| m).sum();
            (
                seed.clone(),
                Fingerprint {
                    neighbors,
                    captured_mass,
                    graph_version: target_version,
                },
            )
        };

        if self.cfg.parallel {
            nodes.par_iter().map(compute_one).collect()
        } else {
            nodes.iter().map(compute_one).collect()
        }
    }
}
