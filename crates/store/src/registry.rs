//! Corpus registry and exclusion policy.
//!
//! A deployment configures the set of corpora it serves (id, title, optional
//! description) together with per-corpus exclusion lists of `ref_id`s.
//! Exclusions apply uniformly at seed validation, subgraph expansion,
//! semantic-kNN filtering, fingerprint result filtering, and final ranking;
//! this module is the single place both identifier forms are derived.

use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};

use crate::ids::internal_id_from_ref;

/// Metadata for one configured corpus.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CorpusInfo {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Ref-ids excluded from seeding, neighborhoods, and ranking.
    #[serde(default)]
    pub excluded_ref_ids: Vec<String>,
}

impl CorpusInfo {
    pub fn new(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            excluded_ref_ids: Vec::new(),
        }
    }

    pub fn with_exclusions<I, S>(mut self, ref_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.excluded_ref_ids = ref_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// The configured corpora of a deployment, in declaration order.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CorpusRegistry {
    corpora: Vec<CorpusInfo>,
    default_corpus: String,
}

impl CorpusRegistry {
    pub fn new(corpora: Vec<CorpusInfo>, default_corpus: &str) -> Self {
        Self {
            corpora,
            default_corpus: default_corpus.to_string(),
        }
    }

    /// A registry with a single corpus, which is also the default.
    pub fn single(info: CorpusInfo) -> Self {
        let default = info.id.clone();
        Self {
            corpora: vec![info],
            default_corpus: default,
        }
    }

    pub fn default_corpus_id(&self) -> &str {
        &self.default_corpus
    }

    pub fn get(&self, corpus_id: &str) -> Option<&CorpusInfo> {
        self.corpora.iter().find(|c| c.id == corpus_id)
    }

    pub fn is_known(&self, corpus_id: &str) -> bool {
        self.get(corpus_id).is_some()
    }

    /// Corpus ids in declaration order; drives the "all corpora" scope.
    pub fn corpus_ids(&self) -> Vec<String> {
        self.corpora.iter().map(|c| c.id.clone()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CorpusInfo> {
        self.corpora.iter()
    }
}

#[derive(Default, Debug)]
struct ExclusionSet {
    ref_ids: HashSet<String>,
    internal_ids: HashSet<String>,
}

/// Answers "is this provision excluded?" for either identifier form.
#[derive(Debug, Default)]
pub struct ExclusionPolicy {
    by_corpus: HashMap<String, ExclusionSet>,
}

impl ExclusionPolicy {
    /// Build the policy from a registry, deriving the internal form of every
    /// configured ref-id exclusion.
    pub fn from_registry(registry: &CorpusRegistry) -> Self {
        let mut by_corpus = HashMap::new();
        for corpus in registry.iter() {
            let mut set = ExclusionSet::default();
            for ref_id in &corpus.excluded_ref_ids {
                set.internal_ids.insert(internal_id_from_ref(ref_id));
                set.ref_ids.insert(ref_id.clone());
            }
            by_corpus.insert(corpus.id.clone(), set);
        }
        Self { by_corpus }
    }

    /// `id` may be either an internal id or a ref-id; both forms are checked.
    pub fn is_excluded(&self, corpus_id: &str, id: &str) -> bool {
        match self.by_corpus.get(corpus_id) {
            Some(set) => set.ref_ids.contains(id) || set.internal_ids.contains(id),
            None => false,
        }
    }

    /// Retain only non-excluded ids, preserving order.
    pub fn filter_ids<'a>(
        &self,
        corpus_id: &str,
        ids: impl IntoIterator<Item = &'a String>,
    ) -> Vec<String> {
        ids.into_iter()
            .filter(|id| !self.is_excluded(corpus_id, id))
            .cloned()
            .collect()
    }
}
