//! Approximate nearest-neighbor search over provision embeddings.
//!
//! Uses an HNSW graph for sub-linear search on large embedding sets and falls
//! back to an exact linear scan below a configurable vector-count threshold.
//! Distances are L2; since stored vectors are unit-normalized, the similarity
//! reported to callers is `1 − d/2`.

use hnsw_rs::prelude::*;
use std::collections::HashMap;

/// Configuration for ANN index construction.
#[derive(Debug, Clone, Copy)]
pub struct AnnConfig {
    /// Number of neighbors per node (higher = better recall, slower build).
    pub m: usize,
    /// Size of dynamic candidate list during construction.
    pub ef_construction: usize,
    /// Size of dynamic candidate list during search.
    pub ef_search: usize,
    /// Whether HNSW may be used at all.
    pub enabled: bool,
    /// Minimum number of vectors before HNSW is used. Below this threshold a
    /// linear scan runs even when `enabled` is true.
    pub min_vectors_for_ann: usize,
}

impl Default for AnnConfig {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            enabled: true,
            min_vectors_for_ann: 1024,
        }
    }
}

impl AnnConfig {
    pub fn with_min_vectors_for_ann(mut self, min: usize) -> Self {
        self.min_vectors_for_ann = min;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    fn should_use_ann(&self, num_vectors: usize) -> bool {
        self.enabled && num_vectors >= self.min_vectors_for_ann
    }
}

/// One nearest-neighbor hit: entity id plus L2 distance to the query.
#[derive(Debug, Clone)]
pub struct AnnHit {
    pub id: String,
    pub distance: f32,
}

/// Vector index over embedding rows. Rebuilt from the store whenever the
/// embedding set changes; insertion order is the caller's responsibility and
/// should be sorted by id for deterministic tie-breaks.
pub struct AnnIndex {
    config: AnnConfig,
    dimension: usize,
    hnsw: Option<Hnsw<'static, f32, DistL2>>,
    ids: Vec<String>,
    id_to_slot: HashMap<String, usize>,
    vectors: Vec<Vec<f32>>,
    built: bool,
}

impl AnnIndex {
    pub fn new(dimension: usize, config: AnnConfig) -> Self {
        Self {
            config,
            dimension,
            hnsw: None,
            ids: Vec::new(),
            id_to_slot: HashMap::new(),
            vectors: Vec::new(),
            built: false,
        }
    }

    /// Insert a vector with its entity id. Silently replaces an existing id.
    pub fn insert(&mut self, id: String, vector: Vec<f32>) {
        debug_assert_eq!(vector.len(), self.dimension);
        if let Some(&slot) = self.id_to_slot.get(&id) {
            self.vectors[slot] = vector;
        } else {
            let slot = self.vectors.len();
            self.vectors.push(vector);
            self.ids.push(id.clone());
            self.id_to_slot.insert(id, slot);
        }
        self.built = false;
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Build the HNSW graph. Below ten vectors the graph degenerates, so the
    /// index is marked built and the linear path serves queries.
    pub fn build(&mut self) {
        if self.vectors.is_empty() {
            return;
        }
        let nb_elem = self.vectors.len();
        if nb_elem < 10 || !self.config.should_use_ann(nb_elem) {
            self.built = true;
            return;
        }

        let nb_layer = 16.min((nb_elem as f32).ln().trunc() as usize);
        let hnsw = Hnsw::<f32, DistL2>::new(
            self.config.m,
            nb_elem,
            nb_layer,
            self.config.ef_construction,
            DistL2 {},
        );
        let data_for_insertion: Vec<(&Vec<f32>, usize)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(idx, vec)| (vec, idx))
            .collect();
        hnsw.parallel_insert(&data_for_insertion);

        self.hnsw = Some(hnsw);
        self.built = true;
    }

    /// Search for the `k` nearest neighbors of `query`. Ordering is by
    /// ascending distance with the entity id as tie-break.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        if query.len() != self.dimension || k == 0 {
            return Vec::new();
        }

        let mut hits =
            if self.built && self.config.should_use_ann(self.vectors.len()) && self.hnsw.is_some() {
                self.hnsw_search(query, k)
            } else {
                self.linear_search(query, k)
            };

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }

    fn hnsw_search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        let Some(ref hnsw) = self.hnsw else {
            return Vec::new();
        };
        let ef = self.config.ef_search.max(k);
        let neighbours: Vec<Neighbour> = hnsw.search(query, k, ef);
        neighbours
            .into_iter()
            .filter_map(|n| {
                self.ids.get(n.get_origin_id()).map(|id| AnnHit {
                    id: id.clone(),
                    distance: n.distance,
                })
            })
            .collect()
    }

    fn linear_search(&self, query: &[f32], k: usize) -> Vec<AnnHit> {
        let mut hits: Vec<AnnHit> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(slot, vec)| AnnHit {
                id: self.ids[slot].clone(),
                distance: l2_distance(query, vec),
            })
            .collect();
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(k);
        hits
    }
}

/// Plain Euclidean distance.
pub fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Convert an L2 distance between unit vectors into the similarity reported
/// by the store: `1 − d/2`.
pub fn similarity_from_distance(d: f32) -> f32 {
    1.0 - d / 2.0
}
