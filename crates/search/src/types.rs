//! Response types of the search API.

use query::{ParsedToken, QueryInterpretation};
use serde::{Deserialize, Serialize};
use store::ProvisionKind;

/// One ranked search result.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ScoredResult {
    pub id: String,
    pub corpus_id: String,
    pub ref_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ProvisionKind,
    /// Unified relatedness score, an integer in `[0, 100]`.
    pub score_urs: u8,
    pub content_snippet: String,
}

/// Diagnostics accompanying every successful response.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct DebugInfo {
    pub mass_captured: f64,
    pub num_seeds: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_corpus: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_ids: Option<Vec<String>>,
}

/// Result-window bookkeeping.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct Pagination {
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub next_offset: Option<usize>,
}

impl Pagination {
    pub fn new(offset: usize, limit: usize, total: usize) -> Self {
        let next_offset = if offset + limit < total {
            Some(offset + limit)
        } else {
            None
        };
        Self {
            offset,
            limit,
            total,
            next_offset,
        }
    }
}

/// The full search payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SearchResponse {
    pub query_interpretation: QueryInterpretation,
    pub results: Vec<ScoredResult>,
    pub debug: DebugInfo,
    pub pagination: Pagination,
    /// Mirror of `query_interpretation.parsed` for callers that only want
    /// the citation reading.
    pub parsed: Option<ParsedToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_computes_next_offset() {
        let p = Pagination::new(0, 10, 25);
        assert_eq!(p.next_offset, Some(10));
        let p = Pagination::new(20, 10, 25);
        assert_eq!(p.next_offset, None);
        let p = Pagination::new(24, 1, 25);
        assert_eq!(p.next_offset, None);
        let p = Pagination::new(0, 10, 0);
        assert_eq!(p.next_offset, None);
    }

    #[test]
    fn debug_info_omits_empty_optionals_in_json() {
        let debug = DebugInfo {
            mass_captured: 0.5,
            num_seeds: 2,
            ..Default::default()
        };
        let json = serde_json::to_string(&debug).expect("serialize");
        assert!(!json.contains("note"));
        assert!(!json.contains("multi_corpus"));
    }
}
