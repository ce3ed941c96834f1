//! Failure-path behavior: invalid requests error, missing provisions are
//! NotFound, excluded provisions never surface, and degraded queries return
//! empty pages rather than errors.

use lexgraph::{
    CorpusInfo, DetailOptions, LexGraph, LexGraphConfig, LexGraphError, Provision, ProvisionKind,
    Reference, RefId,
};

fn provision(corpus: &str, local: &str, title: &str, content: &str) -> Provision {
    let ref_id = RefId::new(corpus, ProvisionKind::Section, local);
    Provision {
        internal_id: ref_id.internal_id(),
        corpus_id: corpus.to_string(),
        ref_id: ref_id.to_string(),
        local_id: Some(local.to_string()),
        kind: ProvisionKind::Section,
        title: title.to_string(),
        content_md: Some(content.to_string()),
        level: 3,
        parent_internal_id: None,
        sibling_order: None,
        hierarchy_path: vec![corpus.to_string(), title.to_string()],
    }
}

/// CORPUS1 where section 995-1 (the dictionary) is excluded from search.
fn engine_with_exclusion() -> LexGraph {
    let corpus =
        CorpusInfo::new("CORPUS1", "First Act").with_exclusions(["CORPUS1:Section:995-1"]);
    let engine = LexGraph::open(LexGraphConfig::in_memory(corpus)).expect("open engine");

    let s1 = provision(
        "CORPUS1",
        "6-5",
        "Ordinary income",
        "Assessable income includes ordinary income.",
    );
    let s2 = provision(
        "CORPUS1",
        "8-1",
        "General deductions",
        "Deduct losses and outgoings from assessable income.",
    );
    let dict = provision(
        "CORPUS1",
        "995-1",
        "Definitions",
        "In this Act ordinary income has the meaning given by this section.",
    );
    let references = vec![Reference {
        source_internal_id: s1.internal_id.clone(),
        target_ref_id: dict.ref_id.clone(),
        target_internal_id: Some(dict.internal_id.clone()),
        snippet: None,
    }];
    engine
        .ingest_corpus("CORPUS1", &[s1, s2, dict], &references, &[])
        .expect("ingest");
    engine
}

#[test]
fn absurd_k_is_rejected() {
    let engine = engine_with_exclusion();
    for bad_k in [0usize, 101, 5000] {
        let err = engine
            .search("ordinary income", bad_k, 0, "CORPUS1")
            .expect_err("k out of range");
        assert!(
            matches!(err, LexGraphError::Search(_)),
            "unexpected error for k={bad_k}: {err}"
        );
    }
}

#[test]
fn empty_query_returns_empty_page() {
    let engine = engine_with_exclusion();
    let response = engine.search("", 10, 0, "CORPUS1").expect("search");
    assert!(response.results.is_empty());
    assert_eq!(response.pagination.total, 0);
    assert_eq!(response.pagination.next_offset, None);

    let response = engine.search("   ", 10, 0, "CORPUS1").expect("search");
    assert!(response.results.is_empty());
}

#[test]
fn nonsense_query_reports_no_seeds() {
    let engine = engine_with_exclusion();
    let response = engine
        .search("zzgrubblefrak qqyxwv", 10, 0, "CORPUS1")
        .expect("search");
    assert!(response.results.is_empty());
    assert_eq!(response.pagination.total, 0);
    assert_eq!(
        response.debug.note.as_deref(),
        Some("No lexical or exact seeds")
    );
}

#[test]
fn excluded_seed_is_reported_but_never_seeded() {
    let engine = engine_with_exclusion();
    let response = engine.search("s 995-1", 10, 0, "CORPUS1").expect("search");

    // The parser still reports the provision before filtering.
    assert_eq!(
        response.query_interpretation.provisions,
        vec!["CORPUS1_Section_995-1"]
    );
    // The citation consumed the whole query, so there are no lexical
    // candidates either: the page is empty.
    assert!(response.results.is_empty());
    assert_eq!(
        response.debug.note.as_deref(),
        Some("No lexical or exact seeds")
    );
}

#[test]
fn excluded_provisions_never_appear_in_results() {
    let engine = engine_with_exclusion();
    let response = engine
        .search("ordinary income", 50, 0, "CORPUS1")
        .expect("search");
    assert!(response
        .results
        .iter()
        .all(|r| r.id != "CORPUS1_Section_995-1"));
}

#[test]
fn detail_for_unknown_id_is_not_found() {
    let engine = engine_with_exclusion();
    let err = engine
        .provision_detail("CORPUS1_Section_999-999", "CORPUS1", &DetailOptions::default())
        .expect_err("unknown provision");
    assert!(matches!(
        err,
        LexGraphError::Search(search::SearchError::NotFound(_))
    ));

    let err = engine
        .provision_detail("complete gibberish", "CORPUS1", &DetailOptions::default())
        .expect_err("unparseable token");
    assert!(matches!(err, LexGraphError::Search(_)));
}

#[test]
fn unknown_corpus_returns_empty_rather_than_error() {
    let engine = engine_with_exclusion();
    let response = engine
        .search("ordinary income", 10, 0, "NOPE1936")
        .expect("search");
    assert!(response.results.is_empty());
    assert_eq!(response.pagination.total, 0);
}

#[test]
fn dangling_references_do_not_break_ingest_or_search() {
    let engine = LexGraph::open(LexGraphConfig::in_memory(CorpusInfo::new("C", "Corpus")))
        .expect("open engine");
    let s1 = provision("C", "1", "Base rule", "Refers to a repealed provision.");
    let dangling = Reference {
        source_internal_id: s1.internal_id.clone(),
        target_ref_id: "C:Section:OLD-99".into(),
        target_internal_id: None,
        snippet: None,
    };
    engine
        .ingest_corpus("C", &[s1], &[dangling], &[])
        .expect("ingest tolerates dangling references");

    let response = engine.search("base rule", 10, 0, "C").expect("search");
    assert!(response.pagination.total >= 1);
}
