//! Query-time local subgraph expansion.
//!
//! Starting from validated seeds, [`GraphBuilder`] runs a bounded citation
//! BFS and overlays hierarchy, term co-usage, and semantic k-NN edges. Two
//! caches keep repeated expansions cheap: a parent/child snapshot memoized
//! by graph version (LRU of 2) and a seed-vector LRU of 512 entries.

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use hashbrown::HashMap;
use lru::LruCache;
use thiserror::Error;
use tracing::debug;

use store::{EntityStore, ExclusionPolicy, StoreError};

use crate::{
    mix_views, row_normalize, sibling_sort_key, EdgeView, ExpansionLimits, GraphWeights,
    NormalizedAdjacency, TypedEdge,
};

const SNAPSHOT_CACHE_CAP: usize = 2;
const SEED_VECTOR_CACHE_CAP: usize = 512;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("store failure during graph expansion: {0}")]
    Store(#[from] StoreError),
}

/// Immutable parent/child view of one corpus at one graph version.
pub struct HierarchySnapshot {
    parent_of: HashMap<String, String>,
    /// Children per parent, ordered by sibling_order (nulls last, id
    /// tie-break).
    children_of: HashMap<String, Vec<String>>,
}

impl HierarchySnapshot {
    pub fn parent_of(&self, id: &str) -> Option<&String> {
        self.parent_of.get(id)
    }

    pub fn children_of(&self, id: &str) -> &[String] {
        self.children_of.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// A bounded per-seed neighborhood: its node set and typed edges.
#[derive(Debug, Default)]
pub struct LocalSubgraph {
    pub nodes: BTreeSet<String>,
    pub edges: Vec<TypedEdge>,
}

impl LocalSubgraph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn node_cap_reached(&self, limits: &ExpansionLimits) -> bool {
        self.nodes.len() >= limits.max_nodes
    }

    fn edge_cap_reached(&self, limits: &ExpansionLimits) -> bool {
        self.edges.len() >= limits.max_edges
    }
}

/// Expands per-seed local subgraphs and mixes them into normalized
/// adjacencies.
pub struct GraphBuilder {
    store: Arc<EntityStore>,
    policy: Arc<ExclusionPolicy>,
    weights: GraphWeights,
    limits: ExpansionLimits,
    embed_model_id: String,
    snapshots: Mutex<LruCache<(String, u64), Arc<HierarchySnapshot>>>,
    seed_vectors: Mutex<LruCache<String, Option<Arc<Vec<f32>>>>>,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<EntityStore>,
        policy: Arc<ExclusionPolicy>,
        weights: GraphWeights,
        limits: ExpansionLimits,
        embed_model_id: &str,
    ) -> Self {
        Self {
            store,
            policy,
            weights,
            limits,
            embed_model_id: embed_model_id.to_string(),
            snapshots: Mutex::new(LruCache::new(
                NonZeroUsize::new(SNAPSHOT_CACHE_CAP).expect("non-zero cache size"),
            )),
            seed_vectors: Mutex::new(LruCache::new(
                NonZeroUsize::new(SEED_VECTOR_CACHE_CAP).expect("non-zero cache size"),
            )),
        }
    }

    pub fn weights(&self) -> &GraphWeights {
        &self.weights
    }

    pub fn limits(&self) -> &ExpansionLimits {
        &self.limits
    }

    /// The corpus-membership test: internal ids are prefixed with their
    /// corpus id.
    fn in_corpus(corpus_id: &str, id: &str) -> bool {
        id.starts_with(&format!("{corpus_id}_"))
    }

    fn admissible(&self, corpus_id: &str, id: &str) -> bool {
        Self::in_corpus(corpus_id, id) && !self.policy.is_excluded(corpus_id, id)
    }

    /// Parent/child snapshot for `(corpus, version)`, memoized.
    pub fn snapshot(
        &self,
        corpus_id: &str,
        version: u64,
    ) -> Result<Arc<HierarchySnapshot>, GraphError> {
        let key = (corpus_id.to_string(), version);
        if let Ok(mut cache) = self.snapshots.lock() {
            if let Some(snapshot) = cache.get(&key) {
                return Ok(snapshot.clone());
            }
        }

        let provisions = self.store.list_provisions(corpus_id)?;
        let mut parent_of: HashMap<String, String> = HashMap::new();
        let mut raw_children: HashMap<String, Vec<(Option<i32>, String)>> = HashMap::new();
        for p in &provisions {
            if let Some(parent) = &p.parent_internal_id {
                parent_of.insert(p.internal_id.clone(), parent.clone());
                raw_children
                    .entry(parent.clone())
                    .or_default()
                    .push((p.sibling_order, p.internal_id.clone()));
            }
        }
        let mut children_of: HashMap<String, Vec<String>> =
            HashMap::with_capacity(raw_children.len());
        for (parent, mut entries) in raw_children {
            entries.sort_by(|a, b| sibling_sort_key(a).cmp(&sibling_sort_key(b)));
            children_of.insert(parent, entries.into_iter().map(|(_, id)| id).collect());
        }

        let snapshot = Arc::new(HierarchySnapshot {
            parent_of,
            children_of,
        });
        if let Ok(mut cache) = self.snapshots.lock() {
            cache.put(key, snapshot.clone());
        }
        debug!(corpus_id, version, "hierarchy snapshot built");
        Ok(snapshot)
    }

    fn seed_vector(&self, seed_id: &str) -> Result<Option<Arc<Vec<f32>>>, GraphError> {
        if let Ok(mut cache) = self.seed_vectors.lock() {
            if let Some(cached) = cache.get(seed_id) {
                return Ok(cached.clone());
            }
        }
        let vector = self
            .store
            .get_embedding("provision", seed_id, &self.embed_model_id)?
            .map(Arc::new);
        if let Ok(mut cache) = self.seed_vectors.lock() {
            cache.put(seed_id.to_string(), vector.clone());
        }
        Ok(vector)
    }

    /// Expand the local subgraph around `seeds`.
    ///
    /// Seeds outside the corpus or excluded by policy are dropped first; an
    /// empty remainder short-circuits to an empty subgraph. Expansion stops
    /// adding material once the node or edge caps are reached.
    pub fn expand_local_subgraph(
        &self,
        seeds: &[String],
        corpus_id: &str,
        version: u64,
    ) -> Result<LocalSubgraph, GraphError> {
        let mut graph = LocalSubgraph::default();
        let seeds: Vec<String> = seeds
            .iter()
            .filter(|s| self.admissible(corpus_id, s))
            .cloned()
            .collect();
        if seeds.is_empty() {
            return Ok(graph);
        }
        graph.nodes.extend(seeds.iter().cloned());

        self.expand_citations(&mut graph, &seeds, corpus_id)?;
        self.overlay_hierarchy(&mut graph, corpus_id, version)?;
        self.overlay_terms(&mut graph, &seeds, corpus_id)?;
        self.overlay_semantic(&mut graph, &seeds, corpus_id)?;

        debug!(
            corpus_id,
            seeds = seeds.len(),
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "local subgraph expanded"
        );
        Ok(graph)
    }

    /// Mix and row-normalize a subgraph.
    pub fn normalize(&self, graph: &LocalSubgraph) -> NormalizedAdjacency {
        let mixed = mix_views(&graph.edges, &self.weights);
        row_normalize(&mixed, &graph.nodes)
    }

    fn expand_citations(
        &self,
        graph: &mut LocalSubgraph,
        seeds: &[String],
        corpus_id: &str,
    ) -> Result<(), GraphError> {
        let mut frontier: BTreeSet<String> = seeds.iter().cloned().collect();
        let mut visited: BTreeSet<String> = frontier.clone();

        for _hop in 0..self.limits.radius {
            if frontier.is_empty() || graph.node_cap_reached(&self.limits) {
                break;
            }
            let frontier_ids: Vec<String> = frontier.iter().cloned().collect();
            let mut hop_refs = self.store.references_from(&frontier_ids)?;
            hop_refs.extend(self.store.references_to(&frontier_ids)?);
            hop_refs.sort_by(|a, b| {
                a.source_internal_id
                    .cmp(&b.source_internal_id)
                    .then_with(|| a.target_ref_id.cmp(&b.target_ref_id))
            });

            let mut next_frontier: BTreeSet<String> = BTreeSet::new();
            for r in hop_refs {
                if graph.edge_cap_reached(&self.limits) {
                    break;
                }
                let Some(target) = r.target_internal_id.as_deref() else {
                    continue;
                };
                let source = r.source_internal_id.as_str();
                if source == target
                    || !self.admissible(corpus_id, source)
                    || !self.admissible(corpus_id, target)
                {
                    continue;
                }
                if graph.node_cap_reached(&self.limits)
                    && (!graph.nodes.contains(source) || !graph.nodes.contains(target))
                {
                    continue;
                }
                graph
                    .edges
                    .push(TypedEdge::new(source, target, EdgeView::Citation, 1.0));
                graph.nodes.insert(source.to_string());
                graph.nodes.insert(target.to_string());
                next_frontier.insert(source.to_string());
                next_frontier.insert(target.to_string());
            }
            frontier = next_frontier.difference(&visited).cloned().collect();
            visited.extend(frontier.iter().cloned());
            if graph.edge_cap_reached(&self.limits) {
                break;
            }
        }
        Ok(())
    }

    fn overlay_hierarchy(
        &self,
        graph: &mut LocalSubgraph,
        corpus_id: &str,
        version: u64,
    ) -> Result<(), GraphError> {
        let snapshot = self.snapshot(corpus_id, version)?;

        let mut parents: BTreeSet<String> = BTreeSet::new();
        for node in graph.nodes.clone() {
            if graph.edge_cap_reached(&self.limits) {
                return Ok(());
            }
            let Some(parent) = snapshot.parent_of(&node) else {
                continue;
            };
            if !self.admissible(corpus_id, parent) {
                continue;
            }
            graph.edges.push(TypedEdge::new(
                &node,
                parent,
                EdgeView::Hierarchy,
                self.weights.w_parent_child,
            ));
            graph.edges.push(TypedEdge::new(
                parent,
                &node,
                EdgeView::Hierarchy,
                self.weights.w_parent_child,
            ));
            graph.nodes.insert(parent.clone());
            parents.insert(parent.clone());
        }

        for parent in parents {
            let children: Vec<String> = snapshot
                .children_of(&parent)
                .iter()
                .filter(|c| self.admissible(corpus_id, c))
                .cloned()
                .collect();
            for child in &children {
                if graph.edge_cap_reached(&self.limits) || graph.node_cap_reached(&self.limits) {
                    return Ok(());
                }
                if graph.nodes.insert(child.clone()) {
                    graph.edges.push(TypedEdge::new(
                        child,
                        &parent,
                        EdgeView::Hierarchy,
                        self.weights.w_parent_child,
                    ));
                    graph.edges.push(TypedEdge::new(
                        &parent,
                        child,
                        EdgeView::Hierarchy,
                        self.weights.w_parent_child,
                    ));
                }
            }
            for pair in children.windows(2) {
                if graph.edge_cap_reached(&self.limits) {
                    return Ok(());
                }
                graph.edges.push(TypedEdge::new(
                    &pair[0],
                    &pair[1],
                    EdgeView::Hierarchy,
                    self.weights.w_adjacent_sibling,
                ));
                graph.edges.push(TypedEdge::new(
                    &pair[1],
                    &pair[0],
                    EdgeView::Hierarchy,
                    self.weights.w_adjacent_sibling,
                ));
            }
        }
        Ok(())
    }

    fn overlay_terms(
        &self,
        graph: &mut LocalSubgraph,
        seeds: &[String],
        corpus_id: &str,
    ) -> Result<(), GraphError> {
        let usages = self.store.term_usages_from(seeds)?;
        let mut terms: BTreeSet<String> = BTreeSet::new();
        for usage in usages {
            let term = usage.term_text.trim().to_lowercase();
            if !term.is_empty() {
                terms.insert(term);
            }
        }

        for term in terms {
            let members: Vec<String> = self
                .store
                .provisions_using_term(corpus_id, &term, self.limits.term_limit_per_term)?
                .into_iter()
                .filter(|id| self.admissible(corpus_id, id))
                .collect();
            if members.len() < 2 {
                continue;
            }
            let idf = self.weights.term_idf(members.len());
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    if graph.edge_cap_reached(&self.limits) || graph.node_cap_reached(&self.limits)
                    {
                        return Ok(());
                    }
                    graph
                        .edges
                        .push(TypedEdge::new(&members[i], &members[j], EdgeView::Term, idf));
                    graph
                        .edges
                        .push(TypedEdge::new(&members[j], &members[i], EdgeView::Term, idf));
                    graph.nodes.insert(members[i].clone());
                    graph.nodes.insert(members[j].clone());
                }
            }
        }
        Ok(())
    }

    fn overlay_semantic(
        &self,
        graph: &mut LocalSubgraph,
        seeds: &[String],
        corpus_id: &str,
    ) -> Result<(), GraphError> {
        for seed in seeds {
            // A seed without an embedding contributes no sem edges but keeps
            // participating through the other views.
            let Some(vector) = self.seed_vector(seed)? else {
                continue;
            };
            let hits =
                self.store
                    .semantic_knn("provision", &self.embed_model_id, &vector, self.limits.sem_k)?;
            for (neighbor, _sim) in hits {
                if graph.edge_cap_reached(&self.limits) || graph.node_cap_reached(&self.limits) {
                    return Ok(());
                }
                if neighbor == *seed || !self.admissible(corpus_id, &neighbor) {
                    continue;
                }
                graph
                    .edges
                    .push(TypedEdge::new(seed, &neighbor, EdgeView::Semantic, 1.0));
                graph
                    .edges
                    .push(TypedEdge::new(&neighbor, seed, EdgeView::Semantic, 1.0));
                graph.nodes.insert(neighbor);
            }
        }
        Ok(())
    }
}
