//! The relatedness engine: versioned APPR fingerprints over local subgraphs.

use std::sync::Arc;

use hashbrown::HashMap;
use thiserror::Error;
use tracing::{debug, warn};

use graph::builder::GraphError;
use graph::GraphBuilder;
use store::{EntityStore, ExclusionPolicy, Fingerprint, StoreError};

use crate::appr::{approx_ppr_push, ApprConfig};

#[derive(Error, Debug)]
pub enum RelatednessError {
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("graph failure: {0}")]
    Graph(#[from] GraphError),
}

/// Computes, caches, and serves per-seed fingerprints.
pub struct RelatednessEngine {
    store: Arc<EntityStore>,
    policy: Arc<ExclusionPolicy>,
    builder: GraphBuilder,
    cfg: ApprConfig,
}

impl RelatednessEngine {
    pub fn new(
        store: Arc<EntityStore>,
        policy: Arc<ExclusionPolicy>,
        builder: GraphBuilder,
        cfg: ApprConfig,
    ) -> Self {
        Self {
            store,
            policy,
            builder,
            cfg,
        }
    }

    pub fn config(&self) -> &ApprConfig {
        &self.cfg
    }

    pub fn builder(&self) -> &GraphBuilder {
        &self.builder
    }

    /// Compute a single-seed fingerprint at the current graph version. The
    /// seed itself never appears in the output.
    pub fn compute_fingerprint(
        &self,
        seed_id: &str,
        corpus_id: &str,
    ) -> Result<Fingerprint, RelatednessError> {
        self.compute_multi_internal(&[(seed_id.to_string(), 1.0)], corpus_id)
    }

    /// Compute one fingerprint for a whole seed distribution. Weights are
    /// normalized to sum to 1 and every seed's self-contribution is removed
    /// from the output.
    pub fn compute_fingerprint_multi(
        &self,
        seed_weights: &[(String, f64)],
        corpus_id: &str,
    ) -> Result<Fingerprint, RelatednessError> {
        self.compute_multi_internal(seed_weights, corpus_id)
    }

    fn compute_multi_internal(
        &self,
        seed_weights: &[(String, f64)],
        corpus_id: &str,
    ) -> Result<Fingerprint, RelatednessError> {
        let version = self.store.current_graph_version()?;

        let mut seeds: Vec<(String, f64)> = seed_weights
            .iter()
            .filter(|(_, w)| *w > 0.0)
            .cloned()
            .collect();
        seeds.sort_by(|a, b| a.0.cmp(&b.0));
        let total: f64 = seeds.iter().map(|(_, w)| w).sum();
        if total <= 0.0 {
            return Ok(Fingerprint {
                neighbors: Vec::new(),
                captured_mass: 0.0,
                graph_version: version,
            });
        }
        for entry in &mut seeds {
            entry.1 /= total;
        }
        let seed_ids: Vec<String> = seeds.iter().map(|(id, _)| id.clone()).collect();

        let subgraph = self
            .builder
            .expand_local_subgraph(&seed_ids, corpus_id, version)?;
        if subgraph.is_empty() {
            return Ok(Fingerprint {
                neighbors: Vec::new(),
                captured_mass: 0.0,
                graph_version: version,
            });
        }
        let adj = self.builder.normalize(&subgraph);

        // Ask for enough entries that dropping the seeds still leaves top_k.
        let oversized = self.cfg.top_k + seeds.len();
        let result = approx_ppr_push(&adj, &seeds, &self.cfg, oversized);

        let mut neighbors: Vec<(String, f64)> = result
            .entries
            .into_iter()
            .filter(|(node, _)| !seed_ids.contains(node))
            .collect();
        neighbors.truncate(self.cfg.top_k);
        let captured_mass: f64 = neighbors.iter().map(|(_, m)| m).sum();

        debug!(
            corpus_id,
            seeds = seeds.len(),
            neighbors = neighbors.len(),
            captured_mass,
            version,
            "fingerprint computed"
        );
        Ok(Fingerprint {
            neighbors,
            captured_mass,
            graph_version: version,
        })
    }

    /// Serve a fingerprint from cache when its version matches the current
    /// graph version; otherwise compute, persist, and return it. Persistence
    /// failures are logged and ignored; the computed value stays
    /// authoritative.
    pub fn get_or_compute_and_cache(
        &self,
        seed_id: &str,
        corpus_id: &str,
    ) -> Result<Fingerprint, RelatednessError> {
        let version = self.store.current_graph_version()?;
        let (mut hits, _missing) = self
            .store
            .get_fingerprints(std::slice::from_ref(&seed_id.to_string()), version)?;
        if let Some(fp) = hits.remove(seed_id) {
            debug!(seed_id, version, "fingerprint cache hit");
            return Ok(self.filter_fingerprint(fp, corpus_id));
        }

        let fp = self.compute_fingerprint(seed_id, corpus_id)?;
        if let Err(err) = self.store.put_fingerprint(seed_id, &fp) {
            warn!(seed_id, error = %err, "fingerprint persist failed; serving computed value");
        }
        Ok(fp)
    }

    /// Cached fingerprints for many seeds at `expected_version`, hits
    /// filtered by corpus and exclusion per neighbor. Returns the hits and
    /// the seeds that need recomputation.
    pub fn get_cached_fingerprints(
        &self,
        seeds: &[String],
        expected_version: u64,
        corpus_id: &str,
    ) -> Result<(HashMap<String, Fingerprint>, Vec<String>), RelatednessError> {
        let (hits, missing) = self.store.get_fingerprints(seeds, expected_version)?;
        let filtered = hits
            .into_iter()
            .map(|(seed, fp)| (seed, self.filter_fingerprint(fp, corpus_id)))
            .collect();
        Ok((filtered, missing))
    }

    fn filter_fingerprint(&self, fp: Fingerprint, corpus_id: &str) -> Fingerprint {
        let prefix = format!("{corpus_id}_");
        let neighbors: Vec<(String, f64)> = fp
            .neighbors
            .into_iter()
            .filter(|(id, _)| id.starts_with(&prefix) && !self.policy.is_excluded(corpus_id, id))
            .collect();
        let captured_mass = neighbors.iter().map(|(_, m)| m).sum();
        Fingerprint {
            neighbors,
            captured_mass,
            graph_version: fp.graph_version,
        }
    }
}
