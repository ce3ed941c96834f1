//! # Lexical retrieval
//!
//! Produces a bounded set of lexical candidates for a query, each with a
//! non-negative composite score blending full-text rank and trigram
//! similarity. The retriever builds a relaxed OR-query from the most
//! distinctive lexemes of the normalized query, delegates row scoring to
//! [`EntityStore::lexical_query`], folds the two raw scores into one
//! composite, and filters excluded provisions.
//!
//! [`EntityStore::lexical_query`]: store::EntityStore::lexical_query

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use store::text::simple_tokens;
use store::{EntityStore, ExclusionPolicy, ProvisionKind, StoreError};
use tracing::debug;

/// Knobs of the lexical retriever.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct LexicalConfig {
    /// Maximum number of lexemes in the relaxed OR-query.
    pub tsquery_or_max_terms: usize,
    /// Minimum trigram similarity for a row to be kept without a
    /// full-text match.
    pub trigram_match_floor: f32,
    /// Weight of the full-text rank in the composite score.
    pub ts_weight: f32,
    /// Weight of the trigram similarity in the composite score.
    pub tri_weight: f32,
    /// Lexemes shorter than this never enter the OR-query.
    pub min_lexeme_len: usize,
}

impl Default for LexicalConfig {
    fn default() -> Self {
        Self {
            tsquery_or_max_terms: 8,
            trigram_match_floor: 0.35,
            ts_weight: 0.7,
            tri_weight: 0.3,
            min_lexeme_len: 2,
        }
    }
}

/// One scored lexical candidate.
#[derive(Clone, Debug)]
pub struct LexicalCandidate {
    pub internal_id: String,
    pub kind: ProvisionKind,
    /// `ts_weight·ts + tri_weight·tri`, always ≥ 0.
    pub score: f32,
    pub ts_score: f32,
    pub tri_score: f32,
}

/// Retrieves lexical candidates from one store.
pub struct LexicalRetriever {
    store: Arc<EntityStore>,
    cfg: LexicalConfig,
}

impl LexicalRetriever {
    pub fn new(store: Arc<EntityStore>, cfg: LexicalConfig) -> Self {
        Self { store, cfg }
    }

    /// Select the distinctive lexemes for the relaxed OR-query: deduplicated
    /// in first-occurrence order, short tokens dropped, then stably sorted
    /// longest-first and capped.
    pub fn or_terms(&self, normalized: &str) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut terms: Vec<String> = simple_tokens(normalized)
            .into_iter()
            .filter(|t| t.len() >= self.cfg.min_lexeme_len)
            .filter(|t| seen.insert(t.clone()))
            .collect();
        terms.sort_by_key(|t| std::cmp::Reverse(t.len()));
        terms.truncate(self.cfg.tsquery_or_max_terms);
        terms
    }

    /// Up to `limit` candidates ordered by descending composite score
    /// (internal id tie-break), excluded provisions removed.
    pub fn lexical_candidates(
        &self,
        corpus_id: &str,
        raw: &str,
        normalized: &str,
        limit: usize,
        policy: &ExclusionPolicy,
    ) -> Result<Vec<LexicalCandidate>, StoreError> {
        if normalized.trim().is_empty() && raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        let or_terms = self.or_terms(normalized);
        let rows = self.store.lexical_query(
            corpus_id,
            normalized,
            raw,
            &or_terms,
            self.cfg.trigram_match_floor,
            limit,
        )?;

        let mut candidates: Vec<LexicalCandidate> = rows
            .into_iter()
            .filter(|row| !policy.is_excluded(corpus_id, &row.internal_id))
            .map(|row| LexicalCandidate {
                score: (self.cfg.ts_weight * row.ts_score + self.cfg.tri_weight * row.tri_score)
                    .max(0.0),
                internal_id: row.internal_id,
                kind: row.kind,
                ts_score: row.ts_score,
                tri_score: row.tri_score,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.internal_id.cmp(&b.internal_id))
        });
        candidates.truncate(limit);
        debug!(
            corpus_id,
            candidates = candidates.len(),
            or_terms = or_terms.len(),
            "lexical retrieval done"
        );
        Ok(candidates)
    }
}
