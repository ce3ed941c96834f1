//! # Provision store
//!
//! Backend-agnostic typed storage for a legislative corpus: provisions,
//! citation references, defined-term usages, embeddings, baseline scores,
//! relatedness fingerprints, and the graph-version counter that ties the
//! computed artifacts to a corpus state.
//!
//! ## Core Features
//!
//! - **Pluggable backends** through the [`StoreBackend`] trait: an in-memory
//!   ordered-map backend (default, ideal for tests) and a redb backend for
//!   persistent, on-disk storage (`embedded` feature, enabled by default).
//! - **Typed records**: callers work with [`Provision`], [`Reference`],
//!   [`Fingerprint`] and friends; serialization (bincode) and compression
//!   (zstd) happen at this layer.
//! - **Search primitives**: an in-process lexical ranker
//!   ([`EntityStore::lexical_query`]) and a vector k-NN index
//!   ([`EntityStore::semantic_knn`]) with an HNSW fast path.
//! - **Versioned artifacts**: baseline scores and fingerprints carry the
//!   graph version they were computed at; reads at a different version
//!   report them as missing.
//!
//! Reads return empty on miss; writes are transactional per method;
//! [`EntityStore::bump_graph_version`] is serialized.

pub mod ann;
pub mod backend;
pub mod ids;
pub mod registry;
pub mod text;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bincode::config::standard;
use bincode::error::{DecodeError, EncodeError};
use bincode::serde::{decode_from_slice, encode_to_vec};
use chrono::{DateTime, Utc};
use hashbrown::{HashMap, HashSet};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use zstd::{decode_all, encode_all};

pub use ann::{AnnConfig, AnnHit, AnnIndex};
#[cfg(feature = "embedded")]
pub use backend::RedbBackend;
pub use backend::{BackendConfig, InMemoryBackend, StoreBackend, Table};
pub use ids::{internal_id_from_ref, normalize_local_id, ProvisionKind, RefId};
pub use registry::{CorpusInfo, CorpusRegistry, ExclusionPolicy};

/// Bump this value whenever the persisted record layout changes.
pub const STORE_SCHEMA_VERSION: u16 = 1;

/// Baseline mass assumed for provisions with no stored score.
pub const BASELINE_FLOOR: f64 = 1e-12;

const META_GRAPH_VERSION: &str = "graph_version";
const META_BASELINE_VERSION: &str = "baseline_version";

/// One provision of a corpus.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Provision {
    /// Stable key, unique across the corpus; equal to the escaped ref-id.
    pub internal_id: String,
    pub corpus_id: String,
    /// Canonical citation form `corpus:kind[:subkind]:local`.
    pub ref_id: String,
    /// Normalized alphanumeric tail of the ref-id, e.g. `6-5`.
    pub local_id: Option<String>,
    #[serde(rename = "type")]
    pub kind: ProvisionKind,
    pub title: String,
    pub content_md: Option<String>,
    pub level: i32,
    pub parent_internal_id: Option<String>,
    pub sibling_order: Option<i32>,
    /// Ordered label sequence, root → leaf.
    pub hierarchy_path: Vec<String>,
}

/// Slim projection used by candidate enrichment.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ProvisionLite {
    pub internal_id: String,
    pub ref_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ProvisionKind,
    pub content_md: Option<String>,
}

impl From<&Provision> for ProvisionLite {
    fn from(p: &Provision) -> Self {
        Self {
            internal_id: p.internal_id.clone(),
            ref_id: p.ref_id.clone(),
            title: p.title.clone(),
            kind: p.kind,
            content_md: p.content_md.clone(),
        }
    }
}

/// A citation edge. `target_internal_id` is `None` when the target is
/// external or unresolved.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Reference {
    pub source_internal_id: String,
    pub target_ref_id: String,
    pub target_internal_id: Option<String>,
    pub snippet: Option<String>,
}

/// A defined term used by a provision. Unique on `(source, term_text)`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DefinedTermUsage {
    pub source_internal_id: String,
    pub term_text: String,
    pub definition_internal_id: Option<String>,
}

/// A stored embedding vector. Vectors are L2-normalized at write time so that
/// dot product equals cosine similarity.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EmbeddingRecord {
    pub entity_kind: String,
    pub entity_id: String,
    pub model_id: String,
    pub dim: usize,
    pub vector: Vec<f32>,
    pub l2_norm: f32,
}

/// An APPR fingerprint: top neighbors by mass, valid only at `graph_version`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Fingerprint {
    /// `(neighbor_id, mass)`, sorted by mass descending (id ascending on
    /// ties). Never contains the seed itself.
    pub neighbors: Vec<(String, f64)>,
    /// Σ mass over `neighbors`, in `[0, 1]`.
    pub captured_mass: f64,
    pub graph_version: u64,
}

/// The current graph version and when it last changed.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct GraphVersionStamp {
    pub version: u64,
    pub updated_at: DateTime<Utc>,
}

/// One row of a lexical query: raw full-text and trigram scores for a
/// matching provision. Composite weighting happens in the retriever.
#[derive(Clone, Debug)]
pub struct LexicalRow {
    pub internal_id: String,
    pub kind: ProvisionKind,
    pub ts_score: f32,
    pub tri_score: f32,
}

/// Compression codec options for stored records.
#[derive(Clone, Debug, Default)]
pub enum CompressionCodec {
    None,
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug)]
pub struct CompressionConfig {
    pub codec: CompressionCodec,
    /// Zstd level (1-22, higher = smaller but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(encode_all(data, self.level)?),
        }
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>, StoreError> {
        match self.codec {
            CompressionCodec::None => Ok(data.to_vec()),
            CompressionCodec::Zstd => Ok(decode_all(data)?),
        }
    }
}

/// Config for initializing the store.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    pub backend: BackendConfig,
    pub compression: CompressionConfig,
    pub ann: AnnConfig,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: BackendConfig) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_ann(mut self, ann: AnnConfig) -> Self {
        self.ann = ann;
        self
    }
}

/// Store error taxonomy. `Unavailable` and `DeadlineExceeded` are the
/// transient cases callers may retry; the rest are terminal for the request.
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(String),
    #[error("serialization encode error: {0}")]
    Encode(String),
    #[error("serialization decode error: {0}")]
    Decode(String),
    #[error("compression error: {0}")]
    Compression(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("graph version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u64, found: u64 },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("deadline exceeded")]
    DeadlineExceeded,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        StoreError::Encode(e.to_string())
    }
}

impl From<DecodeError> for StoreError {
    fn from(e: DecodeError) -> Self {
        StoreError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Compression(e.to_string())
    }
}

impl StoreError {
    pub fn backend<E: std::fmt::Display>(err: E) -> Self {
        Self::Backend(err.to_string())
    }
}

struct AnnCacheEntry {
    index: AnnIndex,
    epoch: u64,
}

/// Typed access to every persisted entity family. Owns persistence
/// exclusively; all other components consume it through these methods.
pub struct EntityStore {
    backend: Box<dyn StoreBackend>,
    cfg: StoreConfig,
    /// Serializes read-modify-write of the graph version counter.
    version_lock: Mutex<()>,
    /// Bumped on every embedding write; stale ANN caches rebuild lazily.
    embed_epoch: AtomicU64,
    ann_cache: Mutex<HashMap<(String, String), AnnCacheEntry>>,
}

impl EntityStore {
    /// Initialize or open a store using the configured backend.
    pub fn new(cfg: StoreConfig) -> Result<Self, StoreError> {
        let backend = cfg.backend.build()?;
        Ok(Self::with_backend(cfg, backend))
    }

    /// Build a store around a custom backend (e.g. in-memory for tests).
    pub fn with_backend(cfg: StoreConfig, backend: Box<dyn StoreBackend>) -> Self {
        Self {
            backend,
            cfg,
            version_lock: Mutex::new(()),
            embed_epoch: AtomicU64::new(1),
            ann_cache: Mutex::new(HashMap::new()),
        }
    }

    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, StoreError> {
        let encoded = encode_to_vec(value, standard())?;
        self.cfg.compression.compress(&encoded)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, StoreError> {
        let decompressed = self.cfg.compression.decompress(data)?;
        let (value, _) = decode_from_slice(&decompressed, standard())?;
        Ok(value)
    }

    fn get_typed<T: DeserializeOwned>(
        &self,
        table: Table,
        key: &str,
    ) -> Result<Option<T>, StoreError> {
        match self.backend.get(table, key)? {
            Some(data) => Ok(Some(self.decode(&data)?)),
            None => Ok(None),
        }
    }

    // ---- provisions -----------------------------------------------------

    /// Replace one corpus's provisions, references, and term usages in a
    /// single logical operation (re-ingest semantics).
    pub fn replace_corpus(
        &self,
        corpus_id: &str,
        provisions: &[Provision],
        references: &[Reference],
        usages: &[DefinedTermUsage],
    ) -> Result<(), StoreError> {
        for p in provisions {
            if p.internal_id != internal_id_from_ref(&p.ref_id) {
                return Err(StoreError::InvariantViolation(format!(
                    "internal_id {} is not the escaped form of ref_id {}",
                    p.internal_id, p.ref_id
                )));
            }
            if p.corpus_id != corpus_id {
                return Err(StoreError::InvariantViolation(format!(
                    "provision {} does not belong to corpus {corpus_id}",
                    p.internal_id
                )));
            }
        }

        let prefix = format!("{corpus_id}_");
        self.backend.delete_prefix(Table::Provisions, &prefix)?;
        self.backend.delete_prefix(Table::References, &prefix)?;
        self.backend.delete_prefix(Table::TermUsage, &prefix)?;

        let mut entries = Vec::with_capacity(provisions.len());
        for p in provisions {
            entries.push((p.internal_id.clone(), self.encode(p)?));
        }
        self.backend.batch_put(Table::Provisions, entries)?;

        let mut by_source: HashMap<String, Vec<Reference>> = HashMap::new();
        for r in references {
            by_source
                .entry(r.source_internal_id.clone())
                .or_default()
                .push(r.clone());
        }
        let mut entries = Vec::with_capacity(by_source.len());
        for (source, refs) in by_source {
            entries.push((source.clone(), self.encode(&refs)?));
        }
        self.backend.batch_put(Table::References, entries)?;

        let mut by_source: HashMap<String, Vec<DefinedTermUsage>> = HashMap::new();
        for u in usages {
            by_source
                .entry(u.source_internal_id.clone())
                .or_default()
                .push(u.clone());
        }
        let mut entries = Vec::with_capacity(by_source.len());
        for (source, rows) in by_source {
            entries.push((source.clone(), self.encode(&rows)?));
        }
        self.backend.batch_put(Table::TermUsage, entries)?;

        debug!(
            corpus_id,
            provisions = provisions.len(),
            references = references.len(),
            usages = usages.len(),
            "corpus replaced"
        );
        Ok(())
    }

    pub fn get_provision(&self, internal_id: &str) -> Result<Option<Provision>, StoreError> {
        self.get_typed(Table::Provisions, internal_id)
    }

    /// Batched lookup; missing ids are skipped, input order is preserved.
    pub fn get_provisions(&self, ids: &[String]) -> Result<Vec<Provision>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.get_provision(id)? {
                out.push(p);
            }
        }
        Ok(out)
    }

    /// All provisions of a corpus, ordered by internal id.
    pub fn list_provisions(&self, corpus_id: &str) -> Result<Vec<Provision>, StoreError> {
        let prefix = format!("{corpus_id}_");
        let mut out = Vec::new();
        self.backend.scan(Table::Provisions, &mut |key, data| {
            if key.starts_with(&prefix) {
                let p: Provision = self.decode(data)?;
                out.push(p);
            }
            Ok(())
        })?;
        out.sort_by(|a, b| a.internal_id.cmp(&b.internal_id));
        Ok(out)
    }

    pub fn find_provision_by_ref(
        &self,
        corpus_id: &str,
        kind: ProvisionKind,
        local_id: &str,
    ) -> Result<Option<Provision>, StoreError> {
        let ref_id = RefId::new(corpus_id, kind, local_id);
        self.get_provision(&ref_id.internal_id())
    }

    /// Exact lookup by the full ref-id string (handles Schedule subkinds).
    pub fn find_provision_by_ref_id(&self, ref_id: &str) -> Result<Option<Provision>, StoreError> {
        match self.get_provision(&internal_id_from_ref(ref_id))? {
            Some(p) if p.ref_id == ref_id => Ok(Some(p)),
            _ => Ok(None),
        }
    }

    /// Lookup by bare local id. Ambiguity resolves by structural kind
    /// precedence (Section first), then internal id.
    pub fn find_provision_by_local(
        &self,
        corpus_id: &str,
        local_id: &str,
    ) -> Result<Option<Provision>, StoreError> {
        let mut matches: Vec<Provision> = self
            .list_provisions(corpus_id)?
            .into_iter()
            .filter(|p| p.local_id.as_deref() == Some(local_id))
            .collect();
        matches.sort_by_key(|p| {
            let precedence = ProvisionKind::LOOKUP_ORDER
                .iter()
                .position(|k| *k == p.kind)
                .unwrap_or(ProvisionKind::LOOKUP_ORDER.len());
            (precedence, p.internal_id.clone())
        });
        Ok(matches.into_iter().next())
    }

    /// Slim rows for the given candidate ids, restricted to one corpus.
    pub fn scan_candidates(
        &self,
        corpus_id: &str,
        ids: &[String],
    ) -> Result<Vec<ProvisionLite>, StoreError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(p) = self.get_provision(id)? {
                if p.corpus_id == corpus_id {
                    out.push(ProvisionLite::from(&p));
                }
            }
        }
        Ok(out)
    }

    /// Definition provisions whose title equals `title` case-insensitively.
    pub fn definitions_by_title(
        &self,
        corpus_id: &str,
        title: &str,
    ) -> Result<Vec<Provision>, StoreError> {
        let wanted = title.to_lowercase();
        Ok(self
            .list_provisions(corpus_id)?
            .into_iter()
            .filter(|p| p.kind == ProvisionKind::Definition && p.title.to_lowercase() == wanted)
            .collect())
    }

    /// Children of a provision ordered by `sibling_order` (nulls last) with
    /// internal id as tie-break.
    pub fn children_of(
        &self,
        corpus_id: &str,
        parent_internal_id: &str,
    ) -> Result<Vec<Provision>, StoreError> {
        let mut children: Vec<Provision> = self
            .list_provisions(corpus_id)?
            .into_iter()
            .filter(|p| p.parent_internal_id.as_deref() == Some(parent_internal_id))
            .collect();
        children.sort_by(|a, b| {
            order_key(a.sibling_order)
                .cmp(&order_key(b.sibling_order))
                .then_with(|| a.internal_id.cmp(&b.internal_id))
        });
        Ok(children)
    }

    // ---- references & terms ---------------------------------------------

    pub fn put_references(&self, source: &str, refs: &[Reference]) -> Result<(), StoreError> {
        self.backend
            .put(Table::References, source, &self.encode(&refs.to_vec())?)
    }

    /// Outbound references of the given provisions.
    pub fn references_from(&self, ids: &[String]) -> Result<Vec<Reference>, StoreError> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(mut refs) = self.get_typed::<Vec<Reference>>(Table::References, id)? {
                out.append(&mut refs);
            }
        }
        Ok(out)
    }

    /// Inbound references targeting any of the given provisions.
    pub fn references_to(&self, ids: &[String]) -> Result<Vec<Reference>, StoreError> {
        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let mut out = Vec::new();
        self.backend.scan(Table::References, &mut |_, data| {
            let refs: Vec<Reference> = self.decode(data)?;
            for r in refs {
                if let Some(target) = r.target_internal_id.as_deref() {
                    if wanted.contains(target) {
                        out.push(r);
                    }
                }
            }
            Ok(())
        })?;
        out.sort_by(|a, b| {
            a.source_internal_id
                .cmp(&b.source_internal_id)
                .then_with(|| a.target_ref_id.cmp(&b.target_ref_id))
        });
        Ok(out)
    }

    /// Every reference whose source belongs to the corpus.
    pub fn all_references(&self, corpus_id: &str) -> Result<Vec<Reference>, StoreError> {
        let prefix = format!("{corpus_id}_");
        let mut out = Vec::new();
        self.backend.scan(Table::References, &mut |key, data| {
            if key.starts_with(&prefix) {
                let mut refs: Vec<Reference> = self.decode(data)?;
                out.append(&mut refs);
            }
            Ok(())
        })?;
        out.sort_by(|a, b| {
            a.source_internal_id
                .cmp(&b.source_internal_id)
                .then_with(|| a.target_ref_id.cmp(&b.target_ref_id))
        });
        Ok(out)
    }

    pub fn put_term_usages(
        &self,
        source: &str,
        usages: &[DefinedTermUsage],
    ) -> Result<(), StoreError> {
        self.backend
            .put(Table::TermUsage, source, &self.encode(&usages.to_vec())?)
    }

    pub fn term_usages_from(&self, ids: &[String]) -> Result<Vec<DefinedTermUsage>, StoreError> {
        let mut out = Vec::new();
        for id in ids {
            if let Some(mut rows) = self.get_typed::<Vec<DefinedTermUsage>>(Table::TermUsage, id)? {
                out.append(&mut rows);
            }
        }
        Ok(out)
    }

    /// Distinct provisions of the corpus using `term` (case-insensitive),
    /// sorted by id and capped at `limit`.
    pub fn provisions_using_term(
        &self,
        corpus_id: &str,
        term: &str,
        limit: usize,
    ) -> Result<Vec<String>, StoreError> {
        let wanted = term.to_lowercase();
        let prefix = format!("{corpus_id}_");
        let mut ids = HashSet::new();
        self.backend.scan(Table::TermUsage, &mut |key, data| {
            if key.starts_with(&prefix) {
                let rows: Vec<DefinedTermUsage> = self.decode(data)?;
                for row in rows {
                    if row.term_text.to_lowercase() == wanted {
                        ids.insert(row.source_internal_id);
                    }
                }
            }
            Ok(())
        })?;
        let mut sorted: Vec<String> = ids.into_iter().collect();
        sorted.sort();
        sorted.truncate(limit);
        Ok(sorted)
    }

    pub fn all_term_usages(&self, corpus_id: &str) -> Result<Vec<DefinedTermUsage>, StoreError> {
        let prefix = format!("{corpus_id}_");
        let mut out = Vec::new();
        self.backend.scan(Table::TermUsage, &mut |key, data| {
            if key.starts_with(&prefix) {
                let mut rows: Vec<DefinedTermUsage> = self.decode(data)?;
                out.append(&mut rows);
            }
            Ok(())
        })?;
        out.sort_by(|a, b| {
            a.source_internal_id
                .cmp(&b.source_internal_id)
                .then_with(|| a.term_text.cmp(&b.term_text))
        });
        Ok(out)
    }

    // ---- embeddings ------------------------------------------------------

    fn embedding_key(kind: &str, model_id: &str, entity_id: &str) -> String {
        format!("{kind}|{model_id}|{entity_id}")
    }

    pub fn put_embedding(&self, record: &EmbeddingRecord) -> Result<(), StoreError> {
        let key = Self::embedding_key(&record.entity_kind, &record.model_id, &record.entity_id);
        self.backend
            .put(Table::Embeddings, &key, &self.encode(record)?)?;
        self.embed_epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn put_embeddings_bulk(&self, records: &[EmbeddingRecord]) -> Result<(), StoreError> {
        let mut entries = Vec::with_capacity(records.len());
        for record in records {
            let key = Self::embedding_key(&record.entity_kind, &record.model_id, &record.entity_id);
            entries.push((key, self.encode(record)?));
        }
        self.backend.batch_put(Table::Embeddings, entries)?;
        self.embed_epoch.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn get_embedding(
        &self,
        kind: &str,
        entity_id: &str,
        model_id: &str,
    ) -> Result<Option<Vec<f32>>, StoreError> {
        let key = Self::embedding_key(kind, model_id, entity_id);
        Ok(self
            .get_typed::<EmbeddingRecord>(Table::Embeddings, &key)?
            .map(|r| r.vector))
    }

    /// Nearest neighbors of `vector` among stored embeddings of the given
    /// kind and model. Similarity is `1 − d/2` for L2 distance `d`.
    pub fn semantic_knn(
        &self,
        kind: &str,
        model_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(String, f32)>, StoreError> {
        if vector.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let epoch = self.embed_epoch.load(Ordering::SeqCst);
        let cache_key = (kind.to_string(), model_id.to_string());

        let mut cache = self
            .ann_cache
            .lock()
            .map_err(|_| StoreError::backend("poisoned ann cache lock"))?;
        let stale = cache
            .get(&cache_key)
            .map(|entry| entry.epoch != epoch)
            .unwrap_or(true);
        if stale {
            let prefix = format!("{kind}|{model_id}|");
            let mut rows: Vec<EmbeddingRecord> = Vec::new();
            self.backend.scan(Table::Embeddings, &mut |key, data| {
                if key.starts_with(&prefix) {
                    rows.push(self.decode(data)?);
                }
                Ok(())
            })?;
            rows.sort_by(|a, b| a.entity_id.cmp(&b.entity_id));
            let mut index = AnnIndex::new(vector.len(), self.cfg.ann);
            for row in rows {
                if row.vector.len() == vector.len() {
                    index.insert(row.entity_id, row.vector);
                }
            }
            index.build();
            debug!(kind, model_id, vectors = index.len(), "ann index rebuilt");
            cache.insert(cache_key.clone(), AnnCacheEntry { index, epoch });
        }

        let entry = cache.get(&cache_key).expect("just inserted");
        Ok(entry
            .index
            .search(vector, limit)
            .into_iter()
            .map(|hit| (hit.id, ann::similarity_from_distance(hit.distance)))
            .collect())
    }

    // ---- baseline --------------------------------------------------------

    /// Baseline π for the given provisions, defaulting to [`BASELINE_FLOOR`]
    /// where no score is stored.
    pub fn get_baseline(&self, ids: &[String]) -> Result<HashMap<String, f64>, StoreError> {
        let mut out = HashMap::with_capacity(ids.len());
        for id in ids {
            let pi = self
                .get_typed::<f64>(Table::Baseline, id)?
                .unwrap_or(BASELINE_FLOOR);
            out.insert(id.clone(), pi);
        }
        Ok(out)
    }

    /// Install a corpus's baseline distribution in one batch, stamped with
    /// the graph version it was computed for.
    pub fn put_baseline_bulk(
        &self,
        scores: &[(String, f64)],
        version: u64,
    ) -> Result<(), StoreError> {
        let mut entries = Vec::with_capacity(scores.len());
        for (id, pi) in scores {
            entries.push((id.clone(), self.encode(pi)?));
        }
        self.backend.batch_put(Table::Baseline, entries)?;
        self.backend
            .put(Table::Meta, META_BASELINE_VERSION, &self.encode(&version)?)
    }

    pub fn baseline_version(&self) -> Result<Option<u64>, StoreError> {
        self.get_typed(Table::Meta, META_BASELINE_VERSION)
    }

    // ---- fingerprints ----------------------------------------------------

    /// Cached fingerprints for `ids` at `expected_version`. A stored
    /// fingerprint at any other version counts as missing.
    pub fn get_fingerprints(
        &self,
        ids: &[String],
        expected_version: u64,
    ) -> Result<(HashMap<String, Fingerprint>, Vec<String>), StoreError> {
        let mut hits = HashMap::new();
        let mut missing = Vec::new();
        for id in ids {
            match self.get_typed::<Fingerprint>(Table::Fingerprints, id)? {
                Some(fp) if fp.graph_version == expected_version => {
                    hits.insert(id.clone(), fp);
                }
                _ => missing.push(id.clone()),
            }
        }
        Ok((hits, missing))
    }

    pub fn put_fingerprint(&self, seed_id: &str, fp: &Fingerprint) -> Result<(), StoreError> {
        self.backend
            .put(Table::Fingerprints, seed_id, &self.encode(fp)?)
    }

    pub fn put_fingerprints_bulk(
        &self,
        fingerprints: &[(String, Fingerprint)],
    ) -> Result<(), StoreError> {
        let mut entries = Vec::with_capacity(fingerprints.len());
        for (id, fp) in fingerprints {
            entries.push((id.clone(), self.encode(fp)?));
        }
        self.backend.batch_put(Table::Fingerprints, entries)
    }

    // ---- graph version ---------------------------------------------------

    pub fn graph_version_stamp(&self) -> Result<GraphVersionStamp, StoreError> {
        Ok(self
            .get_typed::<GraphVersionStamp>(Table::Meta, META_GRAPH_VERSION)?
            .unwrap_or(GraphVersionStamp {
                version: 1,
                updated_at: DateTime::<Utc>::UNIX_EPOCH,
            }))
    }

    pub fn current_graph_version(&self) -> Result<u64, StoreError> {
        Ok(self.graph_version_stamp()?.version)
    }

    /// Atomically increment the graph version and return the new value.
    pub fn bump_graph_version(&self) -> Result<u64, StoreError> {
        let _guard = self
            .version_lock
            .lock()
            .map_err(|_| StoreError::backend("poisoned version lock"))?;
        let next = self.current_graph_version()? + 1;
        let stamp = GraphVersionStamp {
            version: next,
            updated_at: Utc::now(),
        };
        self.backend
            .put(Table::Meta, META_GRAPH_VERSION, &self.encode(&stamp)?)?;
        debug!(version = next, "graph version bumped");
        Ok(next)
    }

    // ---- lexical ---------------------------------------------------------

    /// Full-text plus trigram retrieval over one corpus.
    ///
    /// A row is kept when the websearch (AND) query matches, the relaxed
    /// OR-query over `or_terms` matches, or its trigram score reaches
    /// `trigram_floor`. Rows come back ordered by the composite
    /// `0.7·ts + 0.3·tri` (id tie-break) and truncated at `limit`.
    pub fn lexical_query(
        &self,
        corpus_id: &str,
        normalized: &str,
        raw: &str,
        or_terms: &[String],
        trigram_floor: f32,
        limit: usize,
    ) -> Result<Vec<LexicalRow>, StoreError> {
        let query_en = text::english_tokens(normalized);
        let query_simple = text::simple_tokens(normalized);
        if query_en.is_empty() && query_simple.is_empty() && or_terms.is_empty() {
            return Ok(Vec::new());
        }
        let or_en: Vec<String> = or_terms.iter().map(|t| text::stem(t)).collect();
        let tri_norm = text::trigram_set(normalized);
        let tri_raw = text::trigram_set(raw);

        let mut rows = Vec::new();
        for p in self.list_provisions(corpus_id)? {
            let content = p.content_md.as_deref().unwrap_or("");
            let doc = format!("{} {}", p.title, content);
            let doc_en = text::english_tokens(&doc);
            let doc_simple = text::simple_tokens(&doc);

            let ts_score = text::ts_rank(&doc_en, &query_en)
                .max(text::ts_rank(&doc_simple, &query_simple))
                .max(text::ts_rank_or(&doc_en, &or_en));
            let tri_score = text::trigram_similarity_sets(&text::trigram_set(&p.title), &tri_norm)
                .max(text::trigram_similarity_sets(
                    &text::trigram_set(content),
                    &tri_norm,
                ))
                .max(text::trigram_similarity_sets(
                    &text::trigram_set(&p.title),
                    &tri_raw,
                ))
                .max(text::trigram_similarity_sets(
                    &text::trigram_set(content),
                    &tri_raw,
                ));

            let websearch_hit = text::websearch_matches(&doc_en, &query_en)
                || text::websearch_matches(&doc_simple, &query_simple);
            let or_hit =
                text::or_matches(&doc_en, &or_en) || text::or_matches(&doc_simple, or_terms);

            if websearch_hit || or_hit || tri_score >= trigram_floor {
                rows.push(LexicalRow {
                    internal_id: p.internal_id,
                    kind: p.kind,
                    ts_score,
                    tri_score,
                });
            }
        }

        rows.sort_by(|a, b| {
            let ca = a.ts_score * 0.7 + a.tri_score * 0.3;
            let cb = b.ts_score * 0.7 + b.tri_score * 0.3;
            cb.partial_cmp(&ca)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.internal_id.cmp(&b.internal_id))
        });
        rows.truncate(limit);
        Ok(rows)
    }
}

fn order_key(sibling_order: Option<i32>) -> (bool, i32) {
    match sibling_order {
        Some(n) => (false, n),
        None => (true, 0),
    }
}
