//! The unified search orchestrator.
//!
//! Single-corpus flow: parse → seed (explicit citations/definitions, else
//! top lexical candidates) → aggregate fingerprints → lift against the
//! baseline → blend with lexical scores → rank, window, cache. The
//! multi-corpus scope fans out over every configured corpus and merges by
//! best URS.

use std::sync::Arc;
use std::time::Duration;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use lexical::{LexicalCandidate, LexicalRetriever};
use query::{QueryInterpretation, QueryParser, ALL_CORPORA};
use relatedness::RelatednessEngine;
use store::{CorpusRegistry, EntityStore, ExclusionPolicy};

use crate::cache::{ResponseCache, ResponseKey};
use crate::snippet::build_snippet;
use crate::types::{DebugInfo, Pagination, ScoredResult, SearchResponse};
use crate::SearchError;

/// Ranking and pagination knobs.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SearchConfig {
    pub default_k: usize,
    pub max_k: usize,
    /// Lexical candidates fetched per query.
    pub lex_top: usize,
    /// Lexical candidates promoted to seeds when the query has no explicit
    /// citations.
    pub seed_top: usize,
    /// Above this many cache misses, missing seeds run as one multi-seed
    /// push instead of per-seed computations.
    pub seed_multi_threshold: usize,
    pub cache_ttl_secs: u64,
    pub cache_capacity: usize,
    pub w_graph: f64,
    pub w_lex: f64,
    /// Seed self-boost added after fingerprint aggregation.
    pub self_boost: f64,
    /// URS handed to the first row of a lexical-only fallback page.
    pub fallback_top_urs: u8,
    /// URS handed to the remaining rows of a lexical-only fallback page.
    pub fallback_rest_urs: u8,
    pub snippet_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_k: 10,
            max_k: 100,
            lex_top: 200,
            seed_top: 12,
            seed_multi_threshold: 3,
            cache_ttl_secs: 600,
            cache_capacity: 2000,
            w_graph: 0.65,
            w_lex: 0.35,
            self_boost: 0.05,
            fallback_top_urs: 100,
            fallback_rest_urs: 80,
            snippet_limit: 120,
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_k == 0 || self.max_k > 1000 {
            return Err(SearchError::InvalidQuery(
                "max_k must be in 1..=1000".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.w_graph) || !(0.0..=1.0).contains(&self.w_lex) {
            return Err(SearchError::InvalidQuery(
                "blend weights must lie in [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Orchestrates one store's parsing, retrieval, relatedness, and ranking.
pub struct UnifiedSearch {
    store: Arc<EntityStore>,
    registry: Arc<CorpusRegistry>,
    policy: Arc<ExclusionPolicy>,
    parser: QueryParser,
    retriever: LexicalRetriever,
    relatedness: RelatednessEngine,
    cfg: SearchConfig,
    cache: ResponseCache,
}

impl UnifiedSearch {
    pub fn new(
        store: Arc<EntityStore>,
        registry: Arc<CorpusRegistry>,
        policy: Arc<ExclusionPolicy>,
        parser: QueryParser,
        retriever: LexicalRetriever,
        relatedness: RelatednessEngine,
        cfg: SearchConfig,
    ) -> Self {
        let cache = ResponseCache::new(cfg.cache_capacity, Duration::from_secs(cfg.cache_ttl_secs));
        Self {
            store,
            registry,
            policy,
            parser,
            retriever,
            relatedness,
            cfg,
            cache,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.cfg
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    /// Run a search. `corpus_id` may name one corpus or `*` for all.
    pub fn search(
        &self,
        raw_query: &str,
        k: usize,
        offset: usize,
        corpus_id: &str,
    ) -> Result<SearchResponse, SearchError> {
        if k == 0 || k > self.cfg.max_k {
            return Err(SearchError::InvalidQuery(format!(
                "k must be in 1..={}, got {k}",
                self.cfg.max_k
            )));
        }
        if corpus_id == ALL_CORPORA {
            self.search_all(raw_query, k, offset)
        } else {
            self.search_single(raw_query, k, offset, corpus_id)
        }
    }

    fn search_single(
        &self,
        raw_query: &str,
        k: usize,
        offset: usize,
        corpus_id: &str,
    ) -> Result<SearchResponse, SearchError> {
        let query = raw_query.trim();
        let mut interpretation = self.parser.parse(query, corpus_id);
        let version = self.store.current_graph_version()?;

        let key = ResponseKey {
            query: query.to_string(),
            k,
            offset,
            graph_version: version,
            corpus_id: corpus_id.to_string(),
        };
        if let Some(cached) = self.cache.get(&key) {
            debug!(corpus_id, query, "response cache hit");
            return Ok((*cached).clone());
        }

        if query.is_empty() {
            let response = self.empty_response(interpretation, k, offset, Some("Empty query"));
            self.cache.put(key, Arc::new(response.clone()));
            return Ok(response);
        }

        // Explicit seeds carry weight 1.0 each, after exclusion.
        let mut seed_weights: Vec<(String, f64)> = Vec::new();
        for id in interpretation
            .provisions
            .iter()
            .chain(interpretation.definitions.iter())
        {
            if self.policy.is_excluded(corpus_id, id)
                || seed_weights.iter().any(|(seed, _)| seed == id)
            {
                continue;
            }
            seed_weights.push((id.clone(), 1.0));
        }

        let lex = if interpretation.keywords.is_empty() {
            Vec::new()
        } else {
            self.retriever.lexical_candidates(
                corpus_id,
                query,
                &interpretation.keywords,
                self.cfg.lex_top,
                &self.policy,
            )?
        };

        // No explicit citations: promote the top lexical rows to seeds.
        if seed_weights.is_empty() && !lex.is_empty() {
            seed_weights = self.pseudo_seed_weights(&lex);
            interpretation.pseudo_seeds =
                seed_weights.iter().map(|(id, _)| id.clone()).collect();
        }

        if seed_weights.is_empty() {
            let response =
                self.empty_response(interpretation, k, offset, Some("No lexical or exact seeds"));
            self.cache.put(key, Arc::new(response.clone()));
            return Ok(response);
        }

        let total_weight: f64 = seed_weights.iter().map(|(_, w)| w).sum();
        if total_weight > 0.0 {
            for entry in &mut seed_weights {
                entry.1 /= total_weight;
            }
        }

        let (mut related, captured_mass) =
            self.aggregate_fingerprints(&seed_weights, version, corpus_id)?;

        if related.is_empty() {
            // No graph signal at all: serve the lexical slice directly.
            let response = self.lexical_fallback_page(
                interpretation,
                &lex,
                k,
                offset,
                corpus_id,
                seed_weights.len(),
            )?;
            self.cache.put(key, Arc::new(response.clone()));
            return Ok(response);
        }

        // Seeds stay visible in their own candidate pool.
        for (seed, weight) in &seed_weights {
            *related.entry(seed.clone()).or_insert(0.0) += weight * self.cfg.self_boost;
        }

        let ranked = self.score_candidates(&related, &lex, corpus_id)?;
        let results = self.enrich(&ranked[offset.min(ranked.len())..], k, corpus_id)?;

        let response = SearchResponse {
            parsed: interpretation.parsed.clone(),
            debug: DebugInfo {
                mass_captured: (captured_mass * 10_000.0).round() / 10_000.0,
                num_seeds: seed_weights.len(),
                ..Default::default()
            },
            pagination: Pagination::new(offset, k, ranked.len()),
            query_interpretation: interpretation,
            results,
        };
        info!(
            corpus_id,
            query,
            total = response.pagination.total,
            seeds = response.debug.num_seeds,
            "search complete"
        );
        self.cache.put(key, Arc::new(response.clone()));
        Ok(response)
    }

    /// Min-max scale the top lexical scores to 0..100, then normalize into a
    /// seed distribution.
    fn pseudo_seed_weights(&self, lex: &[LexicalCandidate]) -> Vec<(String, f64)> {
        let top: Vec<&LexicalCandidate> = lex.iter().take(self.cfg.seed_top).collect();
        let scores: Vec<f64> = top.iter().map(|c| c.score as f64).collect();
        let scaled = min_max_scale(&scores);
        let total: f64 = scaled.iter().sum();
        top.iter()
            .zip(scaled)
            .filter(|(_, s)| *s > 0.0)
            .map(|(candidate, s)| {
                let weight = if total > 0.0 { s / total } else { 0.0 };
                (candidate.internal_id.clone(), weight)
            })
            .collect()
    }

    fn aggregate_fingerprints(
        &self,
        seed_weights: &[(String, f64)],
        version: u64,
        corpus_id: &str,
    ) -> Result<(HashMap<String, f64>, f64), SearchError> {
        let seed_ids: Vec<String> = seed_weights.iter().map(|(id, _)| id.clone()).collect();
        let (hits, misses) = self
            .relatedness
            .get_cached_fingerprints(&seed_ids, version, corpus_id)?;

        let mut related: HashMap<String, f64> = HashMap::new();
        let mut captured_mass = 0.0;
        let weight_of = |seed: &str| {
            seed_weights
                .iter()
                .find(|(id, _)| id == seed)
                .map(|(_, w)| *w)
                .unwrap_or(0.0)
        };

        for (seed, _) in seed_weights {
            let Some(fp) = hits.get(seed) else { continue };
            let weight = weight_of(seed);
            captured_mass += weight * fp.captured_mass;
            for (neighbor, mass) in &fp.neighbors {
                *related.entry(neighbor.clone()).or_insert(0.0) += weight * mass;
            }
        }

        if misses.len() > self.cfg.seed_multi_threshold {
            // One combined push across all missing seeds.
            let miss_weights: Vec<(String, f64)> = misses
                .iter()
                .map(|seed| (seed.clone(), weight_of(seed)))
                .collect();
            let miss_total: f64 = miss_weights.iter().map(|(_, w)| w).sum();
            if miss_total > 0.0 {
                let fp = self
                    .relatedness
                    .compute_fingerprint_multi(&miss_weights, corpus_id)?;
                captured_mass += miss_total * fp.captured_mass;
                for (neighbor, mass) in &fp.neighbors {
                    *related.entry(neighbor.clone()).or_insert(0.0) += miss_total * mass;
                }
            }
        } else {
            for seed in &misses {
                let weight = weight_of(seed);
                if weight <= 0.0 {
                    continue;
                }
                let fp = self.relatedness.get_or_compute_and_cache(seed, corpus_id)?;
                captured_mass += weight * fp.captured_mass;
                for (neighbor, mass) in &fp.neighbors {
                    *related.entry(neighbor.clone()).or_insert(0.0) += weight * mass;
                }
            }
        }

        Ok((related, captured_mass))
    }

    /// Rank the candidate pool: lift of normalized graph mass over the
    /// baseline, min-max blended with lexical scores, URS-mapped.
    fn score_candidates(
        &self,
        related: &HashMap<String, f64>,
        lex: &[LexicalCandidate],
        corpus_id: &str,
    ) -> Result<Vec<(String, u8)>, SearchError> {
        let graph_total: f64 = related.values().sum();
        if graph_total <= 0.0 {
            return Err(SearchError::InternalInvariantViolation(
                "aggregated graph mass is not positive".to_string(),
            ));
        }

        let mut candidates: Vec<String> = related
            .keys()
            .filter(|id| !self.policy.is_excluded(corpus_id, id))
            .cloned()
            .collect();
        candidates.sort();

        let baseline = self.store.get_baseline(&candidates)?;
        let lex_by_id: HashMap<&str, f64> = lex
            .iter()
            .map(|c| (c.internal_id.as_str(), c.score as f64))
            .collect();

        let graph_raw: Vec<f64> = candidates
            .iter()
            .map(|id| {
                let norm = related[id] / graph_total;
                let pi = baseline.get(id).copied().unwrap_or(1e-12).max(1e-12);
                (norm / pi).max(1e-12).log2()
            })
            .collect();
        let lex_raw: Vec<f64> = candidates
            .iter()
            .map(|id| lex_by_id.get(id.as_str()).copied().unwrap_or(0.0))
            .collect();

        let graph_scaled = min_max_scale(&graph_raw);
        let lex_scaled = min_max_scale(&lex_raw);

        let mut scored: Vec<(String, f64)> = candidates
            .into_iter()
            .enumerate()
            .map(|(i, id)| {
                let composite = self.cfg.w_graph * (graph_scaled[i] / 100.0)
                    + self.cfg.w_lex * (lex_scaled[i] / 100.0);
                (id, composite)
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let composites: Vec<f64> = scored.iter().map(|(_, s)| *s).collect();
        let urs = min_max_scale(&composites);
        Ok(scored
            .into_iter()
            .zip(urs)
            .map(|((id, _), u)| (id, u.round().clamp(0.0, 100.0) as u8))
            .collect())
    }

    /// Fill in titles, types, and snippets for one result window.
    fn enrich(
        &self,
        ranked_tail: &[(String, u8)],
        k: usize,
        corpus_id: &str,
    ) -> Result<Vec<ScoredResult>, SearchError> {
        let window: Vec<&(String, u8)> = ranked_tail.iter().take(k).collect();
        let ids: Vec<String> = window.iter().map(|(id, _)| id.clone()).collect();
        let rows = self.store.scan_candidates(corpus_id, &ids)?;
        let by_id: HashMap<&str, &store::ProvisionLite> =
            rows.iter().map(|r| (r.internal_id.as_str(), r)).collect();

        Ok(window
            .into_iter()
            .filter_map(|(id, urs)| {
                by_id.get(id.as_str()).map(|row| ScoredResult {
                    id: row.internal_id.clone(),
                    corpus_id: corpus_id.to_string(),
                    ref_id: row.ref_id.clone(),
                    title: row.title.clone(),
                    kind: row.kind,
                    score_urs: *urs,
                    content_snippet: build_snippet(
                        row.content_md.as_deref(),
                        self.cfg.snippet_limit,
                    ),
                })
            })
            .collect())
    }

    /// Serve the lexical slice directly when aggregation produced no graph
    /// signal: the first row gets the top fallback URS, the rest the lower
    /// one.
    fn lexical_fallback_page(
        &self,
        interpretation: QueryInterpretation,
        lex: &[LexicalCandidate],
        k: usize,
        offset: usize,
        corpus_id: &str,
        num_seeds: usize,
    ) -> Result<SearchResponse, SearchError> {
        let ranked: Vec<(String, u8)> = lex
            .iter()
            .skip(offset)
            .take(k)
            .enumerate()
            .map(|(i, c)| {
                let urs = if i == 0 {
                    self.cfg.fallback_top_urs
                } else {
                    self.cfg.fallback_rest_urs
                };
                (c.internal_id.clone(), urs)
            })
            .collect();
        let results = self.enrich(&ranked, k, corpus_id)?;
        Ok(SearchResponse {
            parsed: interpretation.parsed.clone(),
            debug: DebugInfo {
                mass_captured: 0.0,
                num_seeds,
                note: Some("Graph produced no neighbors; returning lexical candidates only".into()),
                ..Default::default()
            },
            pagination: Pagination::new(offset, k, lex.len()),
            query_interpretation: interpretation,
            results,
        })
    }

    fn empty_response(
        &self,
        interpretation: QueryInterpretation,
        k: usize,
        offset: usize,
        note: Option<&str>,
    ) -> SearchResponse {
        SearchResponse {
            parsed: interpretation.parsed.clone(),
            debug: DebugInfo {
                mass_captured: 0.0,
                num_seeds: 0,
                note: note.map(str::to_string),
                ..Default::default()
            },
            pagination: Pagination::new(offset, k, 0),
            query_interpretation: interpretation,
            results: Vec::new(),
        }
    }

    /// Fan out over every configured corpus, then merge by best URS.
    fn search_all(
        &self,
        raw_query: &str,
        k: usize,
        offset: usize,
    ) -> Result<SearchResponse, SearchError> {
        let corpora = self.registry.corpus_ids();
        let mut merged: Vec<ScoredResult> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut mass_captured = 0.0;
        let mut num_seeds = 0;
        let mut first_interpretation: Option<QueryInterpretation> = None;

        for corpus in &corpora {
            let response = self.search_single(raw_query, k + offset, 0, corpus)?;
            if first_interpretation.is_none() {
                first_interpretation = Some(response.query_interpretation.clone());
            }
            mass_captured += response.debug.mass_captured;
            num_seeds += response.debug.num_seeds;
            for result in response.results {
                match seen.get(&result.id) {
                    Some(&idx) => {
                        if result.score_urs > merged[idx].score_urs {
                            merged[idx] = result;
                        }
                    }
                    None => {
                        seen.insert(result.id.clone(), merged.len());
                        merged.push(result);
                    }
                }
            }
        }

        merged.sort_by(|a, b| {
            b.score_urs
                .cmp(&a.score_urs)
                .then_with(|| a.id.cmp(&b.id))
        });
        let total = merged.len();
        let results: Vec<ScoredResult> = merged.into_iter().skip(offset).take(k).collect();
        let interpretation = first_interpretation.unwrap_or_default();

        Ok(SearchResponse {
            parsed: interpretation.parsed.clone(),
            debug: DebugInfo {
                mass_captured,
                num_seeds,
                note: None,
                multi_corpus: Some(true),
                corpus_ids: Some(corpora),
            },
            pagination: Pagination::new(offset, k, total),
            query_interpretation: interpretation,
            results,
        })
    }
}

/// Scale values to `[0, 100]`. A degenerate spread maps everything to 100
/// when any value is positive and to 0 otherwise.
fn min_max_scale(values: &[f64]) -> Vec<f64> {
    if values.is_empty() {
        return Vec::new();
    }
    let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    if (max - min).abs() < 1e-12 {
        let fill = if max > 0.0 { 100.0 } else { 0.0 };
        return vec![fill; values.len()];
    }
    values
        .iter()
        .map(|v| (v - min) / (max - min) * 100.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_scale_spans_the_range() {
        let scaled = min_max_scale(&[1.0, 2.0, 3.0]);
        assert_eq!(scaled, vec![0.0, 50.0, 100.0]);
    }

    #[test]
    fn min_max_scale_degenerate_inputs() {
        assert_eq!(min_max_scale(&[]), Vec::<f64>::new());
        assert_eq!(min_max_scale(&[0.7, 0.7]), vec![100.0, 100.0]);
        assert_eq!(min_max_scale(&[0.0, 0.0]), vec![0.0, 0.0]);
        assert_eq!(min_max_scale(&[-2.0, -2.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn search_config_validation() {
        assert!(SearchConfig::default().validate().is_ok());
        let bad = SearchConfig {
            w_graph: 1.5,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }
}
