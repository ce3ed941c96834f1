//! Baseline stationary distribution.
//!
//! Power iteration over the mixed normalized adjacency with a uniform
//! teleport of `(1−γ)/N` per node. The result is renormalized to sum to 1
//! and serves as the denominator of the lift score at query time.

use hashbrown::HashMap;

use graph::NormalizedAdjacency;

pub const BASELINE_ITERATIONS: usize = 50;

/// Compute π over `nodes`. Nodes missing from `adj` keep their walk mass on
/// themselves, matching the row-normalization self-loop fallback.
pub fn power_iteration_baseline(
    adj: &NormalizedAdjacency,
    nodes: &[String],
    gamma: f64,
    iters: usize,
) -> HashMap<String, f64> {
    let count = nodes.len();
    if count == 0 {
        return HashMap::new();
    }
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.as_str(), idx))
        .collect();

    let mut ranks = vec![1.0 / count as f64; count];
    let teleport = (1.0 - gamma) / count as f64;

    for _ in 0..iters {
        let mut next = vec![teleport; count];
        for (node, &idx_u) in &index {
            let r_u = ranks[idx_u];
            match adj.row(node) {
                Some(row) if !row.is_empty() => {
                    for (neighbor, prob) in row {
                        if let Some(&idx_v) = index.get(neighbor.as_str()) {
                            next[idx_v] += gamma * r_u * prob;
                        }
                    }
                }
                _ => {
                    next[idx_u] += gamma * r_u;
                }
            }
        }
        ranks = next;
    }

    let total: f64 = ranks.iter().sum();
    let total = if total > 0.0 { total } else { 1.0 };
    nodes
        .iter()
        .enumerate()
        .map(|(idx, node)| (node.clone(), ranks[idx] / total))
        .collect()
}
