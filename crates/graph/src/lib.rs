//! # Provision graph construction
//!
//! Materializes weighted graphs over provisions from four views:
//!
//! | view   | source                                   | direction  |
//! |--------|------------------------------------------|------------|
//! | `cit`  | citation references                      | directed   |
//! | `hier` | parent↔child and adjacent siblings       | undirected |
//! | `term` | provisions sharing a defined term (IDF)  | undirected |
//! | `sem`  | vector nearest neighbors                 | undirected |
//!
//! Per-view weights are mixed into one adjacency (`Σ α_view · w_view` per
//! directed edge) and rows are normalized to sum to 1, with a single
//! self-loop standing in for otherwise empty rows. Iteration orders are
//! fixed (sorted node and neighbor ids) so everything downstream is
//! bit-stable across runs.
//!
//! [`GraphBuilder`] expands bounded per-seed local subgraphs at query time;
//! [`build_global_adjacency`] builds the whole-corpus graph for ingest-time
//! baseline and fingerprint computation.

pub mod builder;

use std::collections::{BTreeMap, BTreeSet};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use store::{DefinedTermUsage, Provision, Reference};

pub use builder::{GraphBuilder, HierarchySnapshot, LocalSubgraph};

/// The four edge views of the mixed graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EdgeView {
    Citation,
    Hierarchy,
    Term,
    Semantic,
}

impl EdgeView {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeView::Citation => "cit",
            EdgeView::Hierarchy => "hier",
            EdgeView::Term => "term",
            EdgeView::Semantic => "sem",
        }
    }
}

/// One directed edge with its view and base weight (before the α mix).
#[derive(Clone, Debug, PartialEq)]
pub struct TypedEdge {
    pub source: String,
    pub target: String,
    pub view: EdgeView,
    pub weight: f64,
}

impl TypedEdge {
    pub fn new(source: &str, target: &str, view: EdgeView, weight: f64) -> Self {
        Self {
            source: source.to_string(),
            target: target.to_string(),
            view,
            weight,
        }
    }
}

/// Per-view mixing weights plus intra-view base weights.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct GraphWeights {
    pub alpha_citation: f64,
    pub alpha_hierarchy: f64,
    pub alpha_term: f64,
    pub alpha_semantic: f64,
    /// Base weight of a parent↔child hierarchy edge.
    pub w_parent_child: f64,
    /// Base weight of an adjacent-sibling hierarchy edge.
    pub w_adjacent_sibling: f64,
    pub idf_min: f64,
    pub idf_max: f64,
}

impl Default for GraphWeights {
    fn default() -> Self {
        Self {
            alpha_citation: 0.45,
            alpha_hierarchy: 0.20,
            alpha_term: 0.20,
            alpha_semantic: 0.05,
            w_parent_child: 1.0,
            w_adjacent_sibling: 0.8,
            idf_min: 0.2,
            idf_max: 2.0,
        }
    }
}

impl GraphWeights {
    pub fn alpha(&self, view: EdgeView) -> f64 {
        match view {
            EdgeView::Citation => self.alpha_citation,
            EdgeView::Hierarchy => self.alpha_hierarchy,
            EdgeView::Term => self.alpha_term,
            EdgeView::Semantic => self.alpha_semantic,
        }
    }

    /// Inverse-document-frequency weight for a term used by `df` provisions:
    /// `clamp(1/ln(1+df), idf_min, idf_max)`.
    pub fn term_idf(&self, df: usize) -> f64 {
        let df = df.max(1) as f64;
        (1.0 / (1.0 + df).ln()).clamp(self.idf_min, self.idf_max)
    }
}

/// Bounds on query-time local subgraph expansion.
#[derive(Serialize, Deserialize, Clone, Copy, Debug)]
#[serde(default)]
pub struct ExpansionLimits {
    /// Citation BFS hop bound.
    pub radius: usize,
    pub max_nodes: usize,
    pub max_edges: usize,
    pub term_limit_per_term: usize,
    /// Vector neighbors requested per seed.
    pub sem_k: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            radius: 2,
            max_nodes: 5000,
            max_edges: 40_000,
            term_limit_per_term: 200,
            sem_k: 80,
        }
    }
}

/// Accumulated weighted adjacency before row normalization. The inner map is
/// ordered so neighbor iteration is deterministic.
pub type WeightedAdjacency = HashMap<String, BTreeMap<String, f64>>;

/// Row-normalized adjacency: every row sums to 1; nodes with no outgoing
/// edges carry a single self-loop.
#[derive(Clone, Debug, Default)]
pub struct NormalizedAdjacency {
    rows: HashMap<String, Vec<(String, f64)>>,
}

impl NormalizedAdjacency {
    pub fn row(&self, node: &str) -> Option<&[(String, f64)]> {
        self.rows.get(node).map(Vec::as_slice)
    }

    pub fn contains(&self, node: &str) -> bool {
        self.rows.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Node ids in sorted order.
    pub fn nodes(&self) -> Vec<String> {
        let mut out: Vec<String> = self.rows.keys().cloned().collect();
        out.sort();
        out
    }
}

/// Mix typed edges into one weighted adjacency: `adj[u][v] += α_view · w`.
pub fn mix_views(edges: &[TypedEdge], weights: &GraphWeights) -> WeightedAdjacency {
    let mut adj: WeightedAdjacency = HashMap::new();
    for edge in edges {
        if edge.source == edge.target {
            continue;
        }
        let alpha = weights.alpha(edge.view);
        if alpha <= 0.0 || edge.weight <= 0.0 {
            continue;
        }
        *adj.entry(edge.source.clone())
            .or_default()
            .entry(edge.target.clone())
            .or_insert(0.0) += alpha * edge.weight;
    }
    adj
}

/// Normalize each node's outgoing weights to sum to 1. Every node in `nodes`
/// gets a row; a node with no outgoing mass gets a self-loop of weight 1.
pub fn row_normalize(adj: &WeightedAdjacency, nodes: &BTreeSet<String>) -> NormalizedAdjacency {
    let mut rows: HashMap<String, Vec<(String, f64)>> = HashMap::with_capacity(nodes.len());
    for node in nodes {
        let row = match adj.get(node) {
            Some(neighbors) => {
                let total: f64 = neighbors.values().sum();
                if total <= 0.0 {
                    vec![(node.clone(), 1.0)]
                } else {
                    neighbors
                        .iter()
                        .map(|(nbr, w)| (nbr.clone(), w / total))
                        .collect()
                }
            }
            None => vec![(node.clone(), 1.0)],
        };
        rows.insert(node.clone(), row);
    }
    NormalizedAdjacency { rows }
}

/// Build the whole-corpus mixed adjacency for ingest-time indexing.
///
/// `sem_neighbors` maps a provision to its vector neighbors; pass an empty
/// map when embeddings are absent and the graph degrades to the
/// citation/hierarchy/term mix.
///
/// Returns the sorted node order alongside the normalized adjacency.
pub fn build_global_adjacency(
    provisions: &[Provision],
    references: &[Reference],
    usages: &[DefinedTermUsage],
    sem_neighbors: &HashMap<String, Vec<String>>,
    weights: &GraphWeights,
) -> (Vec<String>, NormalizedAdjacency) {
    let mut node_order: Vec<String> = provisions.iter().map(|p| p.internal_id.clone()).collect();
    node_order.sort();
    let node_set: BTreeSet<String> = node_order.iter().cloned().collect();

    let mut edges: Vec<TypedEdge> = Vec::new();

    for r in references {
        let Some(target) = r.target_internal_id.as_deref() else {
            continue;
        };
        if r.source_internal_id == target
            || !node_set.contains(&r.source_internal_id)
            || !node_set.contains(target)
        {
            continue;
        }
        edges.push(TypedEdge::new(
            &r.source_internal_id,
            target,
            EdgeView::Citation,
            1.0,
        ));
    }

    // Parent↔child edges plus adjacent siblings per parent.
    let mut children_by_parent: BTreeMap<String, Vec<(Option<i32>, String)>> = BTreeMap::new();
    for p in provisions {
        let Some(parent) = p.parent_internal_id.as_deref() else {
            continue;
        };
        if !node_set.contains(parent) {
            continue;
        }
        edges.push(TypedEdge::new(
            &p.internal_id,
            parent,
            EdgeView::Hierarchy,
            weights.w_parent_child,
        ));
        edges.push(TypedEdge::new(
            parent,
            &p.internal_id,
            EdgeView::Hierarchy,
            weights.w_parent_child,
        ));
        children_by_parent
            .entry(parent.to_string())
            .or_default()
            .push((p.sibling_order, p.internal_id.clone()));
    }
    for siblings in children_by_parent.values_mut() {
        siblings.sort_by(|a, b| sibling_sort_key(a).cmp(&sibling_sort_key(b)));
        for pair in siblings.windows(2) {
            edges.push(TypedEdge::new(
                &pair[0].1,
                &pair[1].1,
                EdgeView::Hierarchy,
                weights.w_adjacent_sibling,
            ));
            edges.push(TypedEdge::new(
                &pair[1].1,
                &pair[0].1,
                EdgeView::Hierarchy,
                weights.w_adjacent_sibling,
            ));
        }
    }

    // Term co-usage: complete graph per term, IDF-weighted.
    let mut term_map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for usage in usages {
        let term = usage.term_text.trim().to_lowercase();
        if term.is_empty() || !node_set.contains(&usage.source_internal_id) {
            continue;
        }
        term_map
            .entry(term)
            .or_default()
            .insert(usage.source_internal_id.clone());
    }
    for members in term_map.values() {
        let idf = weights.term_idf(members.len());
        let ids: Vec<&String> = members.iter().collect();
        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                edges.push(TypedEdge::new(ids[i], ids[j], EdgeView::Term, idf));
                edges.push(TypedEdge::new(ids[j], ids[i], EdgeView::Term, idf));
            }
        }
    }

    // Semantic neighbors, symmetric.
    for (source, neighbors) in sem_neighbors_sorted(sem_neighbors) {
        for nbr in neighbors {
            if *source == *nbr || !node_set.contains(source) || !node_set.contains(nbr) {
                continue;
            }
            edges.push(TypedEdge::new(source, nbr, EdgeView::Semantic, 1.0));
            edges.push(TypedEdge::new(nbr, source, EdgeView::Semantic, 1.0));
        }
    }

    let mixed = mix_views(&edges, weights);
    (node_order, row_normalize(&mixed, &node_set))
}

fn sem_neighbors_sorted(
    sem_neighbors: &HashMap<String, Vec<String>>,
) -> Vec<(&String, &Vec<String>)> {
    let mut entries: Vec<(&String, &Vec<String>)> = sem_neighbors.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

pub(crate) fn sibling_sort_key(entry: &(Option<i32>, String)) -> (bool, i32, String) {
    match entry.0 {
        Some(order) => (false, order, entry.1.clone()),
        None => (true, 0, entry.1.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{ProvisionKind, RefId};

    fn provision(corpus: &str, local: &str, parent: Option<&str>, order: Option<i32>) -> Provision {
        let ref_id = RefId::new(corpus, ProvisionKind::Section, local);
        Provision {
            internal_id: ref_id.internal_id(),
            corpus_id: corpus.to_string(),
            ref_id: ref_id.to_string(),
            local_id: Some(local.to_string()),
            kind: ProvisionKind::Section,
            title: format!("Section {local}"),
            content_md: None,
            level: 3,
            parent_internal_id: parent.map(str::to_string),
            sibling_order: order,
            hierarchy_path: vec![corpus.to_string(), local.to_string()],
        }
    }

    fn reference(source: &str, target: &str) -> Reference {
        Reference {
            source_internal_id: source.to_string(),
            target_ref_id: target.replace('_', ":"),
            target_internal_id: Some(target.to_string()),
            snippet: None,
        }
    }

    #[test]
    fn term_idf_clamps_both_ends() {
        let w = GraphWeights::default();
        // df = 1 → 1/ln 2 ≈ 1.44, inside the clamp band.
        assert!((w.term_idf(1) - 1.0 / 2.0_f64.ln()).abs() < 1e-12);
        // Huge df clamps at the floor.
        assert_eq!(w.term_idf(1_000_000), 0.2);
        // df = 0 is treated as 1.
        assert_eq!(w.term_idf(0), w.term_idf(1));
    }

    #[test]
    fn mix_views_accumulates_alpha_weighted_mass() {
        let w = GraphWeights::default();
        let edges = vec![
            TypedEdge::new("a", "b", EdgeView::Citation, 1.0),
            TypedEdge::new("a", "b", EdgeView::Hierarchy, 1.0),
            TypedEdge::new("a", "a", EdgeView::Citation, 1.0), // self edges dropped
        ];
        let adj = mix_views(&edges, &w);
        let ab = adj["a"]["b"];
        assert!((ab - (0.45 + 0.20)).abs() < 1e-12);
        assert_eq!(adj["a"].len(), 1);
    }

    #[test]
    fn row_normalize_sums_to_one_with_self_loop_fallback() {
        let w = GraphWeights::default();
        let edges = vec![
            TypedEdge::new("a", "b", EdgeView::Citation, 1.0),
            TypedEdge::new("a", "c", EdgeView::Citation, 3.0),
        ];
        let nodes: BTreeSet<String> =
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect();
        let norm = row_normalize(&mix_views(&edges, &w), &nodes);

        let row_a = norm.row("a").expect("row a");
        let total: f64 = row_a.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((row_a.iter().find(|(n, _)| n == "c").unwrap().1 - 0.75).abs() < 1e-12);

        // b and c have no outgoing edges: single self-loops.
        assert_eq!(norm.row("b").unwrap(), &[("b".to_string(), 1.0)]);
        assert_eq!(norm.row("c").unwrap(), &[("c".to_string(), 1.0)]);
    }

    #[test]
    fn global_adjacency_includes_all_views() {
        let provisions = vec![
            provision("C", "1", None, None),
            provision("C", "2", Some("C_Section_1"), Some(1)),
            provision("C", "3", Some("C_Section_1"), Some(2)),
        ];
        let references = vec![reference("C_Section_2", "C_Section_3")];
        let usages = vec![
            DefinedTermUsage {
                source_internal_id: "C_Section_2".into(),
                term_text: "income".into(),
                definition_internal_id: None,
            },
            DefinedTermUsage {
                source_internal_id: "C_Section_3".into(),
                term_text: "Income".into(),
                definition_internal_id: None,
            },
        ];
        let sem = HashMap::new();
        let (order, norm) =
            build_global_adjacency(&provisions, &references, &usages, &sem, &GraphWeights::default());

        assert_eq!(order.len(), 3);
        assert_eq!(norm.len(), 3);
        // Section 2 has citation + hierarchy(parent) + sibling + term edges.
        let row2 = norm.row("C_Section_2").expect("row");
        let total: f64 = row2.iter().map(|(_, p)| p).sum();
        assert!((total - 1.0).abs() < 1e-12);
        let to3 = row2.iter().find(|(n, _)| n == "C_Section_3").unwrap().1;
        let to1 = row2.iter().find(|(n, _)| n == "C_Section_1").unwrap().1;
        // Mass toward 3 (citation + sibling + term) beats mass toward the parent.
        assert!(to3 > to1);
    }

    #[test]
    fn global_adjacency_skips_unresolved_and_foreign_references() {
        let provisions = vec![provision("C", "1", None, None), provision("C", "2", None, None)];
        let mut dangling = reference("C_Section_1", "C_Section_9");
        dangling.target_internal_id = None;
        let foreign = reference("C_Section_1", "OTHER_Section_1");
        let (_, norm) = build_global_adjacency(
            &provisions,
            &[dangling, foreign],
            &[],
            &HashMap::new(),
            &GraphWeights::default(),
        );
        // No usable citation edges: both rows are self-loops.
        assert_eq!(
            norm.row("C_Section_1").unwrap(),
            &[("C_Section_1".to_string(), 1.0)]
        );
    }

    #[test]
    fn sibling_order_nulls_sort_last() {
        let provisions = vec![
            provision("C", "1", None, None),
            provision("C", "2", Some("C_Section_1"), None),
            provision("C", "3", Some("C_Section_1"), Some(5)),
            provision("C", "4", Some("C_Section_1"), Some(2)),
        ];
        let (_, norm) = build_global_adjacency(
            &provisions,
            &[],
            &[],
            &HashMap::new(),
            &GraphWeights::default(),
        );
        // Sibling chain is 4 (order 2) → 3 (order 5) → 2 (order None).
        let row4 = norm.row("C_Section_4").expect("row");
        assert!(row4.iter().any(|(n, _)| n == "C_Section_3"));
        assert!(!row4.iter().any(|(n, _)| n == "C_Section_2"));
        let row3 = norm.row("C_Section_3").expect("row");
        assert!(row3.iter().any(|(n, _)| n == "C_Section_2"));
        assert!(row3.iter().any(|(n, _)| n == "C_Section_4"));
    }
}
