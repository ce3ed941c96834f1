//! # Query parsing
//!
//! Converts a raw search query into a structured interpretation: explicit
//! provision ids, definition ids, residual free-text keywords, and (when the
//! query leads with a citation token) the parsed `(corpus, section, terms)`
//! triple.
//!
//! Recognition runs in a fixed order, each successful match being stripped
//! from the keyword residue before the next rule sees it:
//!
//! 1. flexible citation token (`s 6-5 ordinary income`)
//! 2. explicit ref-ids (`CORPUS1:Section:6-5`)
//! 3. structural shorthands (`division 40`, `part IVA`)
//! 4. bare local ids (`83a-10`)
//! 5. definition terms (exact case-insensitive title match)
//!
//! The parser never fails on textual oddities: anything unrecognized simply
//! stays in `keywords`, and lookups that error are treated as non-matches.

mod token;

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use store::{CorpusRegistry, EntityStore, ProvisionKind};
use tracing::debug;

pub use token::{parse_flexible_token, ParsedToken};

/// Corpus id meaning "all configured corpora".
pub const ALL_CORPORA: &str = "*";

static REFID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\b([A-Z][A-Z0-9]{2,}:(?:Act|Chapter|Part|Division|Subdivision|Section|Definition|Guide|Schedule(?::[A-Z0-9]+)*):[^\s,;]+)",
    )
    .expect("regex")
});
static SECTION_SHORTHAND_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:s|sec|section)\s*\.?\s*([0-9]+[A-Za-z]*(?:-[0-9A-Za-z]+)?)\b")
        .expect("regex")
});
static SUBDIV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bsubdiv(?:ision)?\s*([0-9A-Za-z]+-[0-9A-Za-z]+)\b").expect("regex"));
static DIV_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bdiv(?:ision)?\s*([0-9]+[A-Za-z]?)\b").expect("regex"));
static PART_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpart\s*([IVXLCDM]+|[0-9A-Za-z-]+)\b").expect("regex"));
static BARE_LOCAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b([0-9]+[a-z]*-[0-9a-z]+)\b").expect("regex"));

/// Structured reading of a raw query.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct QueryInterpretation {
    /// Explicitly cited provisions, in recognition order, deduplicated.
    pub provisions: Vec<String>,
    /// Definition provisions matched by term text.
    pub definitions: Vec<String>,
    /// Residual free text after all recognized objects were stripped.
    pub keywords: String,
    /// Populated when the query led with a resolvable citation token.
    pub parsed: Option<ParsedToken>,
    /// Seeds synthesized from lexical retrieval when the query carried no
    /// explicit provisions or definitions. Filled by the search layer.
    #[serde(default)]
    pub pseudo_seeds: Vec<String>,
}

impl QueryInterpretation {
    pub fn has_explicit_seeds(&self) -> bool {
        !self.provisions.is_empty() || !self.definitions.is_empty()
    }
}

/// Normalize a raw query: `&` → ` and `, smart dashes/quotes to ASCII,
/// punctuation stripped except `- ( ) : . , ; +`, whitespace collapsed.
/// Case is preserved so ref-ids and corpus prefixes survive.
pub fn normalize_query(raw: &str) -> String {
    let mut t = raw.replace(['\u{2014}', '\u{2013}'], "-");
    t = t.replace('\u{2019}', "'").replace(['\u{201C}', '\u{201D}'], "\"");
    t = t.replace('&', " and ");
    let filtered: String = t
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric()
                || ch.is_whitespace()
                || matches!(ch, '-' | '(' | ')' | ':' | '.' | ',' | ';' | '+')
            {
                ch
            } else {
                ' '
            }
        })
        .collect();
    collapse_ws(&filtered)
}

fn collapse_ws(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses raw queries against one store and corpus registry.
pub struct QueryParser {
    store: Arc<EntityStore>,
    registry: Arc<CorpusRegistry>,
}

impl QueryParser {
    pub fn new(store: Arc<EntityStore>, registry: Arc<CorpusRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &CorpusRegistry {
        &self.registry
    }

    /// Resolve the effective corpus for lookups: a known id stays, anything
    /// else (including the `*` scope) becomes the registry default.
    fn effective_corpus(&self, corpus_id: &str) -> String {
        if self.registry.is_known(corpus_id) {
            corpus_id.to_string()
        } else {
            self.registry.default_corpus_id().to_string()
        }
    }

    /// Parse a raw query in the context of `corpus_id`.
    pub fn parse(&self, raw: &str, corpus_id: &str) -> QueryInterpretation {
        let normalized = normalize_query(raw);
        let corpus = self.effective_corpus(corpus_id);

        let mut provisions: Vec<String> = Vec::new();
        let mut parsed: Option<ParsedToken> = None;
        let mut working = normalized.clone();
        let mut term_candidates: Vec<String> = Vec::new();

        // 1) flexible citation token at the head of the query.
        if let Some(token) = parse_flexible_token(&working, &corpus, &self.registry) {
            if let Some(id) = self.resolve_local(&token.corpus, &token.section) {
                debug!(section = %token.section, corpus = %token.corpus, "flexible token resolved");
                provisions.push(id);
                term_candidates.extend(token.terms.iter().cloned());
                working = token.terms.join(" ");
                parsed = Some(token);
            }
        }

        // 2) explicit ref-ids, looked up verbatim.
        for caps in REFID_RE
            .captures_iter(&working.clone())
            .collect::<Vec<_>>()
        {
            let candidate = caps.get(1).expect("group 1").as_str();
            if let Ok(Some(p)) = self.store.find_provision_by_ref_id(candidate) {
                provisions.push(p.internal_id);
                working = working.replace(candidate, " ");
            }
        }

        // 3) structural shorthands.
        self.match_shorthand(&SECTION_SHORTHAND_RE, &mut working, &corpus, None, &mut provisions);
        self.match_shorthand(
            &SUBDIV_RE,
            &mut working,
            &corpus,
            Some(ProvisionKind::Subdivision),
            &mut provisions,
        );
        self.match_shorthand(
            &DIV_RE,
            &mut working,
            &corpus,
            Some(ProvisionKind::Division),
            &mut provisions,
        );
        self.match_shorthand(
            &PART_RE,
            &mut working,
            &corpus,
            Some(ProvisionKind::Part),
            &mut provisions,
        );

        // 4) bare local ids like `83a-10`.
        for caps in BARE_LOCAL_RE
            .captures_iter(&working.clone())
            .collect::<Vec<_>>()
        {
            let whole = caps.get(0).expect("match").as_str();
            let Some(local) = store::normalize_local_id(whole) else {
                continue;
            };
            if let Ok(Some(p)) = self.store.find_provision_by_local(&corpus, &local) {
                provisions.push(p.internal_id);
                working = working.replace(whole, " ");
            }
        }

        // 5) definition terms from the residue plus any flexible-token terms.
        term_candidates.extend(
            working
                .split(['+', ',', ';', '&'])
                .map(str::trim)
                .filter(|s| s.len() >= 3)
                .map(str::to_string),
        );
        let mut definitions: Vec<String> = Vec::new();
        for term in &term_candidates {
            if let Ok(defs) = self.store.definitions_by_title(&corpus, term) {
                for def in defs {
                    if !definitions.contains(&def.internal_id) {
                        definitions.push(def.internal_id);
                    }
                }
            }
        }

        let keywords = collapse_ws(&working.replace(['+', ',', ';'], " "));

        QueryInterpretation {
            provisions: dedup_stable(provisions),
            definitions,
            keywords,
            parsed,
            pseudo_seeds: Vec::new(),
        }
    }

    /// Resolve a normalized local id, preferring an exact `Section` ref and
    /// falling back to the cross-kind local lookup.
    fn resolve_local(&self, corpus: &str, local: &str) -> Option<String> {
        match self
            .store
            .find_provision_by_ref(corpus, ProvisionKind::Section, local)
        {
            Ok(Some(p)) => return Some(p.internal_id),
            Ok(None) => {}
            Err(err) => {
                debug!(error = %err, "section ref lookup failed");
                return None;
            }
        }
        match self.store.find_provision_by_local(corpus, local) {
            Ok(Some(p)) => Some(p.internal_id),
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, "local id lookup failed");
                None
            }
        }
    }

    fn match_shorthand(
        &self,
        pattern: &Regex,
        working: &mut String,
        corpus: &str,
        kind: Option<ProvisionKind>,
        provisions: &mut Vec<String>,
    ) {
        for caps in pattern.captures_iter(&working.clone()).collect::<Vec<_>>() {
            let whole = caps.get(0).expect("match").as_str();
            let ident = caps.get(1).expect("group 1").as_str();
            let Some(local) = store::normalize_local_id(ident) else {
                continue;
            };
            let resolved = match kind {
                Some(k) => match self.store.find_provision_by_ref(corpus, k, &local) {
                    Ok(found) => found.map(|p| p.internal_id),
                    Err(_) => None,
                },
                None => self.resolve_local(corpus, &local),
            };
            if let Some(id) = resolved {
                provisions.push(id);
                *working = working.replace(whole, " ");
            }
        }
    }
}

fn dedup_stable(ids: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::{
        BackendConfig, CorpusInfo, Provision, RefId, StoreConfig,
    };

    fn seed_store() -> (Arc<EntityStore>, Arc<CorpusRegistry>) {
        let store = EntityStore::new(StoreConfig::new().with_backend(BackendConfig::in_memory()))
            .expect("store init");
        let registry = CorpusRegistry::new(
            vec![
                CorpusInfo::new("CORPUS1", "First Act"),
                CorpusInfo::new("CORPUS2", "Second Act"),
            ],
            "CORPUS1",
        );

        let mut provisions = vec![
            provision("CORPUS1", ProvisionKind::Section, "6-5", "Ordinary income"),
            provision("CORPUS1", ProvisionKind::Section, "8-1", "General deductions"),
            provision("CORPUS1", ProvisionKind::Division, "40", "Capital allowances"),
            provision("CORPUS1", ProvisionKind::Subdivision, "40-B", "Depreciating assets"),
            provision("CORPUS1", ProvisionKind::Part, "IVA", "Schemes to reduce income tax"),
            provision("CORPUS1", ProvisionKind::Section, "83A-10", "ESS interests"),
        ];
        let mut def = provision(
            "CORPUS1",
            ProvisionKind::Definition,
            "ORDINARY-INCOME",
            "ordinary income",
        );
        def.title = "ordinary income".into();
        provisions.push(def);

        store
            .replace_corpus("CORPUS1", &provisions, &[], &[])
            .expect("seed corpus");
        store
            .replace_corpus(
                "CORPUS2",
                &[provision("CORPUS2", ProvisionKind::Section, "12-5", "Withholding")],
                &[],
                &[],
            )
            .expect("seed corpus 2");
        (Arc::new(store), Arc::new(registry))
    }

    fn provision(corpus: &str, kind: ProvisionKind, local: &str, title: &str) -> Provision {
        let ref_id = RefId::new(corpus, kind, local);
        Provision {
            internal_id: ref_id.internal_id(),
            corpus_id: corpus.to_string(),
            ref_id: ref_id.to_string(),
            local_id: Some(local.to_string()),
            kind,
            title: title.to_string(),
            content_md: Some(format!("{title}.")),
            level: 3,
            parent_internal_id: None,
            sibling_order: None,
            hierarchy_path: vec![corpus.to_string(), title.to_string()],
        }
    }

    fn parser() -> QueryParser {
        let (store, registry) = seed_store();
        QueryParser::new(store, registry)
    }

    #[test]
    fn flexible_token_with_trailing_terms() {
        let interp = parser().parse("s 6-5 ordinary income", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Section_6-5"]);
        assert_eq!(interp.keywords, "ordinary income");
        let parsed = interp.parsed.expect("parsed token");
        assert_eq!(parsed.corpus, "CORPUS1");
        assert_eq!(parsed.section, "6-5");
        assert_eq!(parsed.terms, vec!["ordinary income"]);
        // "ordinary income" matches a Definition title exactly.
        assert_eq!(interp.definitions, vec!["CORPUS1_Definition_ORDINARY-INCOME"]);
    }

    #[test]
    fn pure_free_text_keeps_keywords() {
        let interp = parser().parse("ordinary income termination payment", "CORPUS1");
        assert!(interp.provisions.is_empty());
        assert_eq!(interp.keywords, "ordinary income termination payment");
        assert!(interp.parsed.is_none());
    }

    #[test]
    fn explicit_ref_id_is_stripped() {
        let interp = parser().parse("compare CORPUS1:Section:8-1 with deductions", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Section_8-1"]);
        assert!(!interp.keywords.contains("CORPUS1:Section:8-1"));
        assert!(interp.keywords.contains("deductions"));
    }

    #[test]
    fn structural_shorthands_resolve_by_kind() {
        let interp = parser().parse("division 40 pooling", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Division_40"]);
        assert_eq!(interp.keywords, "pooling");

        let interp = parser().parse("subdivision 40-B", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Subdivision_40-B"]);

        let interp = parser().parse("part IVA schemes", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Part_IVA"]);
    }

    #[test]
    fn bare_local_id_resolves_mid_sentence() {
        let interp = parser().parse("the rule in 83a-10 about discounts", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Section_83A-10"]);
        assert!(!interp.keywords.contains("83a-10"));
    }

    #[test]
    fn unknown_citation_falls_through_to_keywords() {
        let interp = parser().parse("s 999-999 nonexistent", "CORPUS1");
        assert!(interp.provisions.is_empty());
        assert!(interp.parsed.is_none());
        assert!(interp.keywords.contains("999-999"));
    }

    #[test]
    fn corpus_prefix_reaches_other_corpus() {
        let interp = parser().parse("CORPUS2: s 12-5", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS2_Section_12-5"]);
        assert_eq!(interp.parsed.expect("parsed").corpus, "CORPUS2");
    }

    #[test]
    fn ampersand_becomes_and() {
        assert_eq!(normalize_query("R&D offsets"), "R and D offsets");
        assert_eq!(normalize_query("a   b\tc"), "a b c");
        assert_eq!(normalize_query("\"quoted\" #tag"), "quoted tag");
    }

    #[test]
    fn repeated_citations_dedupe() {
        let interp = parser().parse("s 6-5 and CORPUS1:Section:6-5", "CORPUS1");
        assert_eq!(interp.provisions, vec!["CORPUS1_Section_6-5"]);
    }

    #[test]
    fn empty_query_yields_empty_interpretation() {
        let interp = parser().parse("", "CORPUS1");
        assert!(interp.provisions.is_empty());
        assert!(interp.definitions.is_empty());
        assert_eq!(interp.keywords, "");
        assert!(interp.parsed.is_none());
    }
}
