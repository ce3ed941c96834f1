//! End-to-end tests over the assembled engine: ingest → index → search.

use lexgraph::{
    CorpusInfo, DefinedTermUsage, DetailOptions, LexGraph, LexGraphConfig, Provision,
    ProvisionKind, Reference, RefId,
};

fn provision(
    corpus: &str,
    kind: ProvisionKind,
    local: &str,
    title: &str,
    content: &str,
    parent: Option<&str>,
    order: Option<i32>,
) -> Provision {
    let ref_id = RefId::new(corpus, kind, local);
    Provision {
        internal_id: ref_id.internal_id(),
        corpus_id: corpus.to_string(),
        ref_id: ref_id.to_string(),
        local_id: Some(local.to_string()),
        kind,
        title: title.to_string(),
        content_md: Some(content.to_string()),
        level: if parent.is_some() { 3 } else { 2 },
        parent_internal_id: parent.map(str::to_string),
        sibling_order: order,
        hierarchy_path: vec![corpus.to_string(), title.to_string()],
    }
}

fn reference(source: &Provision, target: &Provision) -> Reference {
    Reference {
        source_internal_id: source.internal_id.clone(),
        target_ref_id: target.ref_id.clone(),
        target_internal_id: Some(target.internal_id.clone()),
        snippet: Some(format!("see {}", target.title)),
    }
}

/// CORPUS1: Division 6 containing section 6-5, which cites twelve further
/// sections. Mass from a 6-5 fingerprint spreads thin across the neighbors,
/// so the seed itself stays the strongest candidate.
fn corpus1_engine() -> LexGraph {
    let corpus = "CORPUS1";
    let engine = LexGraph::open(LexGraphConfig::in_memory(CorpusInfo::new(
        corpus,
        "First Assessment Act",
    )))
    .expect("open engine");

    let division = provision(
        corpus,
        ProvisionKind::Division,
        "6",
        "Assessable income",
        "Amounts included in assessable income.",
        None,
        None,
    );
    let section_6_5 = provision(
        corpus,
        ProvisionKind::Section,
        "6-5",
        "Ordinary income",
        "Your assessable income includes income according to ordinary concepts.",
        Some(&division.internal_id),
        Some(1),
    );
    let mut provisions = vec![division, section_6_5.clone()];
    let mut references = Vec::new();
    for i in 0..12 {
        let local = format!("{}-1", 10 + i * 5);
        let neighbor = provision(
            corpus,
            ProvisionKind::Section,
            &local,
            &format!("Related rule {local}"),
            &format!("Operative text of rule {local} about assessable amounts."),
            None,
            None,
        );
        references.push(reference(&section_6_5, &neighbor));
        provisions.push(neighbor);
    }
    let usages = vec![DefinedTermUsage {
        source_internal_id: section_6_5.internal_id.clone(),
        term_text: "assessable income".into(),
        definition_internal_id: None,
    }];

    engine
        .ingest_corpus(corpus, &provisions, &references, &usages)
        .expect("ingest corpus");
    engine
}

#[test]
fn explicit_section_lookup_ranks_the_seed_first() {
    let engine = corpus1_engine();
    let response = engine
        .search("s 6-5 ordinary income", 10, 0, "CORPUS1")
        .expect("search");

    let interp = &response.query_interpretation;
    assert_eq!(interp.provisions, vec!["CORPUS1_Section_6-5"]);
    assert!(interp.definitions.is_empty());
    assert_eq!(interp.keywords, "ordinary income");
    let parsed = response.parsed.as_ref().expect("parsed token");
    assert_eq!(parsed.corpus, "CORPUS1");
    assert_eq!(parsed.section, "6-5");
    assert_eq!(parsed.terms, vec!["ordinary income"]);

    assert!(!response.results.is_empty());
    assert_eq!(response.results[0].id, "CORPUS1_Section_6-5");
    assert_eq!(response.results[0].score_urs, 100);
    assert_eq!(response.debug.num_seeds, 1);
    assert!(response.debug.mass_captured >= 0.0);
}

#[test]
fn pure_free_text_builds_pseudo_seeds() {
    let engine = corpus1_engine();
    let response = engine
        .search("ordinary income assessable amounts", 10, 0, "CORPUS1")
        .expect("search");

    let interp = &response.query_interpretation;
    assert!(interp.provisions.is_empty());
    assert!(interp.definitions.is_empty());
    assert_eq!(interp.keywords, "ordinary income assessable amounts");
    assert!(!interp.pseudo_seeds.is_empty());
    assert!(response.debug.num_seeds >= 1);
    assert!(response.pagination.total >= 1);
}

#[test]
fn urs_scores_stay_in_range_and_sorted() {
    let engine = corpus1_engine();
    let response = engine
        .search("assessable amounts", 20, 0, "CORPUS1")
        .expect("search");
    assert!(response.results.len() <= 20);
    for pair in response.results.windows(2) {
        assert!(pair[0].score_urs >= pair[1].score_urs);
    }
    for result in &response.results {
        assert!(result.score_urs <= 100);
        assert!(!result.content_snippet.is_empty());
    }
    assert!(response.pagination.total >= response.results.len());
}

#[test]
fn pagination_windows_and_next_offset() {
    let engine = corpus1_engine();
    let first = engine
        .search("s 6-5 ordinary income", 3, 0, "CORPUS1")
        .expect("search");
    let total = first.pagination.total;
    assert!(total > 3, "fixture should produce more than one page");
    assert_eq!(first.pagination.next_offset, Some(3));
    assert_eq!(first.pagination.limit, 3);

    // Last page of size one: k=1, offset=total-1.
    let last = engine
        .search("s 6-5 ordinary income", 1, total - 1, "CORPUS1")
        .expect("search");
    assert_eq!(last.results.len(), 1);
    assert_eq!(last.pagination.next_offset, None);

    // Pages do not overlap.
    let second = engine
        .search("s 6-5 ordinary income", 3, 3, "CORPUS1")
        .expect("search");
    for r in &second.results {
        assert!(first.results.iter().all(|f| f.id != r.id));
    }
}

#[test]
fn baseline_masses_sum_to_one() {
    let engine = corpus1_engine();
    let ids: Vec<String> = engine
        .store()
        .list_provisions("CORPUS1")
        .expect("list")
        .into_iter()
        .map(|p| p.internal_id)
        .collect();
    let baseline = engine.store().get_baseline(&ids).expect("baseline");
    let total: f64 = baseline.values().sum();
    assert!((total - 1.0).abs() < 1e-6, "Σπ = {total}");
    assert!(baseline.values().all(|&pi| pi >= 0.0));
}

#[test]
fn multi_corpus_scope_merges_by_best_urs() {
    let engine = {
        let mut config = LexGraphConfig::in_memory(CorpusInfo::new("A", "Act A"));
        config.corpora.entries.push(CorpusInfo::new("B", "Act B"));
        LexGraph::open(config).expect("open engine")
    };

    for corpus in ["A", "B"] {
        let s1 = provision(
            corpus,
            ProvisionKind::Section,
            "6-5",
            "Ordinary income",
            "Ordinary income under ordinary concepts.",
            None,
            None,
        );
        let s2 = provision(
            corpus,
            ProvisionKind::Section,
            "8-1",
            "General deductions",
            "Deductions for losses and outgoings, including against ordinary income.",
            None,
            None,
        );
        let refs = vec![reference(&s1, &s2)];
        engine
            .ingest_corpus(corpus, &[s1, s2], &refs, &[])
            .expect("ingest corpus");
    }

    let response = engine.search("ordinary income", 10, 0, "*").expect("search");
    assert_eq!(response.debug.multi_corpus, Some(true));
    assert_eq!(
        response.debug.corpus_ids.as_deref(),
        Some(["A".to_string(), "B".to_string()].as_slice())
    );
    assert!(!response.results.is_empty());
    // Both corpora contribute, ids stay deduplicated, order is by URS.
    let corpora: Vec<&str> = response
        .results
        .iter()
        .map(|r| r.corpus_id.as_str())
        .collect();
    assert!(corpora.contains(&"A"));
    assert!(corpora.contains(&"B"));
    for pair in response.results.windows(2) {
        assert!(pair[0].score_urs >= pair[1].score_urs);
    }
    let mut ids: Vec<&str> = response.results.iter().map(|r| r.id.as_str()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), response.results.len());
}

#[test]
fn detail_view_assembles_relationships() {
    let engine = corpus1_engine();
    let detail = engine
        .provision_detail("CORPUS1_Section_6-5", "CORPUS1", &DetailOptions::default())
        .expect("detail");

    assert_eq!(detail.ref_id, "CORPUS1:Section:6-5");
    assert_eq!(detail.corpus_id, "CORPUS1");
    assert_eq!(detail.kind, ProvisionKind::Section);
    assert_eq!(detail.local_id.as_deref(), Some("6-5"));
    assert_eq!(detail.references_to.len(), 12);
    assert!(detail.referenced_by.is_empty());
    assert_eq!(detail.defined_terms_used.len(), 1);
    assert_eq!(detail.defined_terms_used[0].term_text, "assessable income");
    // Breadcrumbs run root → leaf.
    assert_eq!(detail.breadcrumbs.len(), 2);
    assert_eq!(detail.breadcrumbs[0].internal_id, "CORPUS1_Division_6");
    assert_eq!(detail.breadcrumbs[1].internal_id, "CORPUS1_Section_6-5");
    assert!(!detail.etag.is_empty());
    assert!(detail.size_bytes > 0);
}

#[test]
fn detail_resolves_flexible_tokens() {
    let engine = corpus1_engine();
    let detail = engine
        .provision_detail("s 6.5", "CORPUS1", &DetailOptions::default())
        .expect("detail");
    assert_eq!(detail.internal_id, "CORPUS1_Section_6-5");
    let parsed = detail.parsed.expect("parsed token");
    assert_eq!(parsed.section, "6-5");

    let children = engine
        .provision_detail("CORPUS1_Division_6", "CORPUS1", &DetailOptions::default())
        .expect("detail");
    assert_eq!(children.children.len(), 1);
    assert_eq!(children.children[0].internal_id, "CORPUS1_Section_6-5");
}

#[test]
fn detail_field_projection_limits_sections() {
    let engine = corpus1_engine();
    let opts = DetailOptions {
        fields: Some(vec!["references".to_string()]),
        ..Default::default()
    };
    let detail = engine
        .provision_detail("CORPUS1_Section_6-5", "CORPUS1", &opts)
        .expect("detail");
    assert!(!detail.references_to.is_empty());
    assert!(detail.breadcrumbs.is_empty());
    assert!(detail.children.is_empty());
    assert!(detail.content_md.is_none());
}
