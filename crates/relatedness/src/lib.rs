//! # Relatedness engine
//!
//! Per-seed "fingerprints": top-k approximate personalized PageRank
//! neighborhoods over the mixed provision graph, plus the baseline
//! stationary distribution they are normalized against at ranking time.
//!
//! Fingerprints are valid only at the graph version they were computed at:
//! the engine serves cached rows when the version matches and silently
//! recomputes otherwise. Persistence failures never fail a query; the
//! freshly computed value is authoritative.

pub mod appr;
pub mod baseline;
pub mod engine;

pub use appr::{approx_ppr_push, ApprConfig, ApprResult};
pub use baseline::{power_iteration_baseline, BASELINE_ITERATIONS};
pub use engine::{RelatednessEngine, RelatednessError};
