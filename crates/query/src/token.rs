//! Flexible citation token parsing.
//!
//! A flexible token is the user-friendly citation shape typed into search
//! boxes: `s 6-5 ordinary income`, `CORPUS1: sec 83a.10`, `6 5, exempt
//! income`. It is an optional corpus prefix, an optional section marker,
//! a local identifier in loose punctuation, and trailing comma/semicolon
//! separated terms.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use store::{normalize_local_id, CorpusRegistry};

static CORPUS_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<corpus>[A-Z][A-Z0-9]{2,}):\s*(?P<body>.+)$").expect("regex"));
static SECTION_PREFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:s|sec|section)\.?\s*([0-9]+[0-9A-Za-z]*(?:[.\-][0-9A-Za-z]+)*)")
        .expect("regex")
});
static SECTION_WITH_GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+[0-9A-Za-z]*)\s+([0-9A-Za-z]+)").expect("regex"));
static BARE_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([0-9]+[0-9A-Za-z]*(?:[.\-][0-9A-Za-z]+)*)").expect("regex"));

/// A flexible token parsed into its structured parts. `section` is the
/// normalized local id (uppercased, `.`/space → `-`).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ParsedToken {
    pub corpus: String,
    pub section: String,
    pub terms: Vec<String>,
}

/// Parse a flexible token against the registry. `active_corpus` wins unless
/// the token carries a known corpus prefix; an unknown or wildcard active
/// corpus falls back to the registry default.
pub fn parse_flexible_token(
    text: &str,
    active_corpus: &str,
    registry: &CorpusRegistry,
) -> Option<ParsedToken> {
    let original = text.trim();
    if original.is_empty() {
        return None;
    }

    let mut resolved_corpus = if registry.is_known(active_corpus) {
        active_corpus.to_string()
    } else {
        registry.default_corpus_id().to_string()
    };
    let mut working = original.to_string();
    if let Some(caps) = CORPUS_PREFIX_RE.captures(original) {
        let candidate = caps.name("corpus").map(|m| m.as_str()).unwrap_or_default();
        if registry.is_known(candidate) {
            resolved_corpus = candidate.to_string();
            working = caps
                .name("body")
                .map(|m| m.as_str().trim().to_string())
                .unwrap_or_default();
        }
    }

    let (section_part, rest) = if let Some(caps) = SECTION_PREFIX_RE.captures(&working) {
        let m = caps.get(1).expect("group 1");
        let end = caps.get(0).expect("whole match").end();
        (m.as_str().to_string(), working[end..].trim().to_string())
    } else if let Some(caps) = SECTION_WITH_GAP_RE.captures(&working) {
        let end = caps.get(0).expect("whole match").end();
        let joined = format!(
            "{}-{}",
            caps.get(1).expect("group 1").as_str(),
            caps.get(2).expect("group 2").as_str()
        );
        (joined, working[end..].trim().to_string())
    } else if let Some(caps) = BARE_SECTION_RE.captures(&working) {
        let m = caps.get(1).expect("group 1");
        (m.as_str().to_string(), working[m.end()..].trim().to_string())
    } else {
        return None;
    };

    let section = normalize_local_id(&section_part)?;
    let terms: Vec<String> = rest
        .split([';', ','])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Some(ParsedToken {
        corpus: resolved_corpus,
        section,
        terms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::CorpusInfo;

    fn registry() -> CorpusRegistry {
        CorpusRegistry::new(
            vec![
                CorpusInfo::new("CORPUS1", "First Act"),
                CorpusInfo::new("CORPUS2", "Second Act"),
            ],
            "CORPUS1",
        )
    }

    #[test]
    fn section_prefix_with_terms() {
        let token = parse_flexible_token("s 6-5 ordinary income", "CORPUS1", &registry())
            .expect("parses");
        assert_eq!(token.corpus, "CORPUS1");
        assert_eq!(token.section, "6-5");
        assert_eq!(token.terms, vec!["ordinary income"]);
    }

    #[test]
    fn comma_separated_terms_split() {
        let token =
            parse_flexible_token("sec 83A-10 discount; startup concession", "CORPUS1", &registry())
                .expect("parses");
        assert_eq!(token.section, "83A-10");
        assert_eq!(token.terms, vec!["discount", "startup concession"]);
    }

    #[test]
    fn corpus_prefix_overrides_active_corpus() {
        let token =
            parse_flexible_token("CORPUS2: s 12-5", "CORPUS1", &registry()).expect("parses");
        assert_eq!(token.corpus, "CORPUS2");
        assert_eq!(token.section, "12-5");
    }

    #[test]
    fn unknown_corpus_prefix_is_ignored() {
        // NOPE1234 is not registered, so the prefix stays in the body and the
        // parse fails (the body does not start with a digit).
        assert!(parse_flexible_token("NOPE1234: s 6-5", "CORPUS1", &registry()).is_none());
    }

    #[test]
    fn dotted_and_gapped_locals_normalize() {
        let token = parse_flexible_token("s 6.5", "CORPUS1", &registry()).expect("parses");
        assert_eq!(token.section, "6-5");

        let token = parse_flexible_token("6 5 exempt income", "CORPUS1", &registry())
            .expect("parses");
        assert_eq!(token.section, "6-5");
        assert_eq!(token.terms, vec!["exempt income"]);
    }

    #[test]
    fn lowercase_local_uppercases() {
        let token = parse_flexible_token("s 83a-10", "CORPUS1", &registry()).expect("parses");
        assert_eq!(token.section, "83A-10");
    }

    #[test]
    fn wildcard_active_corpus_falls_back_to_default() {
        let token = parse_flexible_token("s 6-5", "*", &registry()).expect("parses");
        assert_eq!(token.corpus, "CORPUS1");
    }

    #[test]
    fn non_citation_text_does_not_parse() {
        assert!(parse_flexible_token("ordinary income", "CORPUS1", &registry()).is_none());
        assert!(parse_flexible_token("", "CORPUS1", &registry()).is_none());
        assert!(parse_flexible_token("   ", "CORPUS1", &registry()).is_none());
    }
}
