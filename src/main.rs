//! Demo entry point: builds a miniature corpus in memory, runs the ingest
//! batch, and prints the ranked response for one citation query.

use std::error::Error;

use lexgraph::{
    CorpusInfo, DefinedTermUsage, LexGraph, LexGraphConfig, Provision, ProvisionKind, Reference,
    RefId,
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

fn reference(source: &str, target_ref: &str, target: &str) -> Reference {
    Reference {
        source_internal_id: source.to_string(),
        target_ref_id: target_ref.to_string(),
        target_internal_id: Some(target.to_string()),
        snippet: None,
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let corpus = "DEMO1997";
    let engine = LexGraph::open(LexGraphConfig::in_memory(CorpusInfo::new(
        corpus,
        "Demonstration Assessment Act 1997",
    )))?;

    let division = provision(
        corpus,
        ProvisionKind::Division,
        "6",
        "Assessable income",
        "What this Division is about: amounts included in assessable income.",
        None,
        None,
    );
    let provisions = vec![
        division.clone(),
        provision(
            corpus,
            ProvisionKind::Section,
            "6-5",
            "Ordinary income",
            "Your assessable income includes income according to ordinary concepts, \
             which is called ordinary income.",
            Some(&division.internal_id),
            Some(1),
        ),
        provision(
            corpus,
            ProvisionKind::Section,
            "6-10",
            "Statutory income",
            "Your assessable income also includes amounts that are statutory income.",
            Some(&division.internal_id),
            Some(2),
        ),
        provision(
            corpus,
            ProvisionKind::Section,
            "8-1",
            "General deductions",
            "You can deduct from your assessable income any loss or outgoing incurred \
             in gaining or producing it.",
            None,
            None,
        ),
    ];
    let references = vec![
        reference(
            &provisions[1].internal_id,
            &provisions[2].ref_id,
            &provisions[2].internal_id,
        ),
        reference(
            &provisions[3].internal_id,
            &provisions[1].ref_id,
            &provisions[1].internal_id,
        ),
    ];
    let usages = vec![
        DefinedTermUsage {
            source_internal_id: provisions[1].internal_id.clone(),
            term_text: "assessable income".into(),
            definition_internal_id: None,
        },
        DefinedTermUsage {
            source_internal_id: provisions[3].internal_id.clone(),
            term_text: "assessable income".into(),
            definition_internal_id: None,
        },
    ];

    let summary = engine.ingest_corpus(corpus, &provisions, &references, &usages)?;
    println!(
        "indexed {} provisions at graph version {}",
        summary.provisions, summary.graph_version
    );

    let response = engine.search("s 6-5 ordinary income", 10, 0, corpus)?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
