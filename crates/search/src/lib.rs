//! # Unified provision search
//!
//! Orchestrates the full query path: parsing, seeding, fingerprint
//! aggregation, lift-normalized scoring blended with lexical rank,
//! pagination, and response caching. The provision detail view lives here
//! as well.
//!
//! Failure behavior follows one rule: textual oddities and missing signals
//! degrade (empty interpretations, lexical fallbacks, empty pages), while
//! malformed requests, unknown ids, and store faults surface as
//! [`SearchError`] variants.

mod cache;
mod detail;
mod engine;
mod snippet;
mod types;

use thiserror::Error;

use relatedness::RelatednessError;
use store::StoreError;

pub use cache::{ResponseCache, ResponseKey};
pub use detail::{
    BreadcrumbItem, ChildItem, DefinitionRef, DetailOptions, DetailResponse, ReferenceTo,
    ReferencedBy, TermUsed,
};
pub use engine::{SearchConfig, UnifiedSearch};
pub use snippet::{build_snippet, SNIPPET_LIMIT};
pub use types::{DebugInfo, Pagination, ScoredResult, SearchResponse};

/// Search-facing error taxonomy.
#[derive(Error, Debug)]
pub enum SearchError {
    /// Malformed input: absurd `k`, invalid configuration.
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// Detail lookup for an unknown provision.
    #[error("not found: {0}")]
    NotFound(String),
    /// Transient store failure; the caller may retry.
    #[error("store failure: {0}")]
    Store(#[from] StoreError),
    #[error("relatedness failure: {0}")]
    Relatedness(#[from] RelatednessError),
    /// A broken internal precondition (e.g. non-positive aggregated mass);
    /// surfaced as a 500-class failure, never as data.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}
