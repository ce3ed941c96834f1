//! In-process text ranking primitives backing [`EntityStore::lexical_query`].
//!
//! The store is embedded, so full-text rank and trigram similarity are
//! computed here rather than delegated to a database. Two tokenizations are
//! kept: `simple` (lowercased alphanumeric runs) and `english` (`simple`
//! minus stopwords, lightly stemmed). `ts_rank` is a frequency-weighted
//! AND-match rank over those lexemes; trigram similarity is set Jaccard over
//! word-padded character 3-grams, hashed the same way shingle pipelines hash
//! token windows.
//!
//! [`EntityStore::lexical_query`]: crate::EntityStore::lexical_query

use hashbrown::HashSet;
use xxhash_rust::xxh3::xxh3_64;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "if",
    "in", "into", "is", "it", "its", "not", "of", "on", "or", "such", "that", "the", "their",
    "then", "there", "these", "they", "this", "to", "was", "were", "will", "with",
];

/// Lowercased alphanumeric tokens; hyphens split words (`6-5` → `6`, `5`).
pub fn simple_tokens(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else if !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

/// `simple` tokens with stopwords removed and a light suffix stem applied.
pub fn english_tokens(text: &str) -> Vec<String> {
    simple_tokens(text)
        .into_iter()
        .filter(|tok| !STOPWORDS.contains(&tok.as_str()))
        .map(|tok| stem(&tok))
        .collect()
}

/// Light plural/participle stemming, enough to make `payments` rank against
/// `payment` the way a stemmed text-search dictionary would.
pub fn stem(token: &str) -> String {
    let t = token;
    if let Some(base) = t.strip_suffix("ies") {
        if base.len() >= 2 {
            return format!("{base}y");
        }
    }
    for suffix in ["ing", "ed"] {
        if let Some(base) = t.strip_suffix(suffix) {
            if base.len() >= 3 {
                return base.to_string();
            }
        }
    }
    // `es` only follows sibilants (classes, boxes); otherwise the plain `s`
    // rule keeps the final `e` (trustees → trustee).
    if let Some(base) = t.strip_suffix("es") {
        if base.len() >= 3 && (base.ends_with(['s', 'x', 'z']) || base.ends_with("ch") || base.ends_with("sh"))
        {
            return base.to_string();
        }
    }
    if let Some(base) = t.strip_suffix('s') {
        if base.len() >= 3 && !base.ends_with('s') {
            return base.to_string();
        }
    }
    t.to_string()
}

/// Frequency-weighted rank of `query_lexemes` against `doc_lexemes`.
///
/// Every query lexeme must be present for a non-zero rank (websearch AND
/// semantics); the rank rewards repeated occurrences and discounts long
/// documents logarithmically, which is the shape of `ts_rank`.
pub fn ts_rank(doc_lexemes: &[String], query_lexemes: &[String]) -> f32 {
    if query_lexemes.is_empty() || doc_lexemes.is_empty() {
        return 0.0;
    }
    let mut total_occurrences = 0usize;
    for q in query_lexemes {
        let occurrences = doc_lexemes.iter().filter(|d| *d == q).count();
        if occurrences == 0 {
            return 0.0;
        }
        total_occurrences += occurrences;
    }
    let raw = (1.0 + (total_occurrences as f32).ln()) * query_lexemes.len() as f32;
    raw / (1.0 + (doc_lexemes.len() as f32).ln())
}

/// Rank of an OR-query: the fraction of query lexemes present, weighted like
/// [`ts_rank`] by total occurrences and document length.
pub fn ts_rank_or(doc_lexemes: &[String], query_lexemes: &[String]) -> f32 {
    if query_lexemes.is_empty() || doc_lexemes.is_empty() {
        return 0.0;
    }
    let mut matched = 0usize;
    let mut total_occurrences = 0usize;
    for q in query_lexemes {
        let occurrences = doc_lexemes.iter().filter(|d| *d == q).count();
        if occurrences > 0 {
            matched += 1;
            total_occurrences += occurrences;
        }
    }
    if matched == 0 {
        return 0.0;
    }
    let coverage = matched as f32 / query_lexemes.len() as f32;
    let raw = (1.0 + (total_occurrences as f32).ln()) * coverage;
    raw / (1.0 + (doc_lexemes.len() as f32).ln())
}

/// True when every query lexeme occurs in the document (websearch match).
pub fn websearch_matches(doc_lexemes: &[String], query_lexemes: &[String]) -> bool {
    !query_lexemes.is_empty() && query_lexemes.iter().all(|q| doc_lexemes.contains(q))
}

/// True when at least one query lexeme occurs in the document.
pub fn or_matches(doc_lexemes: &[String], query_lexemes: &[String]) -> bool {
    query_lexemes.iter().any(|q| doc_lexemes.contains(q))
}

/// Hashed trigram set of a string, pg_trgm style: lowercase, split into
/// alphanumeric words, pad each word with two leading and one trailing space,
/// then take every character 3-gram.
pub fn trigram_set(text: &str) -> HashSet<u64> {
    let mut grams = HashSet::new();
    for word in simple_tokens(text) {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            let gram: String = window.iter().collect();
            grams.insert(xxh3_64(gram.as_bytes()));
        }
    }
    grams
}

/// Jaccard similarity of the two strings' trigram sets, in `[0, 1]`.
pub fn trigram_similarity(a: &str, b: &str) -> f32 {
    let set_a = trigram_set(a);
    let set_b = trigram_set(b);
    trigram_similarity_sets(&set_a, &set_b)
}

/// Jaccard similarity when one side's trigram set is precomputed.
pub fn trigram_similarity_sets(a: &HashSet<u64>, b: &HashSet<u64>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_tokens_split_on_non_alphanumerics() {
        assert_eq!(
            simple_tokens("Ordinary income: 6-5 (ITAA)"),
            vec!["ordinary", "income", "6", "5", "itaa"]
        );
        assert!(simple_tokens("  ,;  ").is_empty());
    }

    #[test]
    fn english_tokens_drop_stopwords_and_stem() {
        let toks = english_tokens("the payments of the trustees");
        assert_eq!(toks, vec!["payment", "trustee"]);
    }

    #[test]
    fn stem_keeps_short_words_intact() {
        assert_eq!(stem("is"), "is");
        assert_eq!(stem("gas"), "gas");
        assert_eq!(stem("loss"), "loss");
        assert_eq!(stem("categories"), "category");
    }

    #[test]
    fn ts_rank_requires_all_lexemes() {
        let doc = english_tokens("ordinary income includes income from personal exertion");
        let hit = english_tokens("ordinary income");
        let miss = english_tokens("ordinary termination");

        assert!(ts_rank(&doc, &hit) > 0.0);
        assert_eq!(ts_rank(&doc, &miss), 0.0);
    }

    #[test]
    fn ts_rank_rewards_repetition() {
        let doc_once = english_tokens("income assessable under this provision");
        let doc_twice = english_tokens("income from income producing assets");
        let query = english_tokens("income");

        assert!(ts_rank(&doc_twice, &query) > ts_rank(&doc_once, &query));
    }

    #[test]
    fn ts_rank_or_scores_partial_matches() {
        let doc = english_tokens("termination payment rules");
        let query = english_tokens("termination payment income");

        assert_eq!(ts_rank(&doc, &query), 0.0);
        assert!(ts_rank_or(&doc, &query) > 0.0);
        assert!(!websearch_matches(&doc, &query));
        assert!(or_matches(&doc, &query));
    }

    #[test]
    fn trigram_similarity_identical_and_disjoint() {
        assert!((trigram_similarity("ordinary income", "ordinary income") - 1.0).abs() < 1e-6);
        assert_eq!(trigram_similarity("abc", ""), 0.0);
        assert!(trigram_similarity("ordinary", "zzzz") < 0.05);
    }

    #[test]
    fn trigram_similarity_tolerates_small_edits() {
        let sim = trigram_similarity("ordinary income", "ordinery income");
        assert!(sim > 0.5, "one-letter typo should stay similar, got {sim}");
        let far = trigram_similarity("ordinary income", "capital gains");
        assert!(sim > far);
    }
}
