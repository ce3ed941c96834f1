//! Embedding seam for provision text.
//!
//! The engine treats embedding computation as an opaque function
//! `embed(text) -> unit vector`. Real deployments plug a model-backed
//! [`Embedder`] in here; this crate ships only the trait, L2 normalization,
//! and a deterministic stub backend that is cheap enough for tests and
//! demos while still giving distinct texts distinct directions.

mod stub;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use stub::StubEmbedder;

/// Entity kind under which provision vectors are stored.
pub const PROVISION_ENTITY_KIND: &str = "provision";

#[derive(Error, Debug, Clone)]
pub enum SemanticError {
    #[error("embedding backend failure: {0}")]
    Backend(String),
}

/// Configuration shared by embedder backends.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct SemanticConfig {
    pub model_id: String,
    pub dim: usize,
    pub normalize: bool,
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model_id: "stub-384".to_string(),
            dim: 384,
            normalize: true,
        }
    }
}

impl SemanticConfig {
    pub fn with_dim(mut self, dim: usize) -> Self {
        self.dim = dim;
        self
    }

    pub fn with_model_id<S: Into<String>>(mut self, model_id: S) -> Self {
        self.model_id = model_id.into();
        self
    }
}

/// An embedding produced for one entity.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct SemanticEmbedding {
    pub entity_id: String,
    pub vector: Vec<f32>,
    pub model_id: String,
    pub dim: usize,
    pub normalized: bool,
}

impl SemanticEmbedding {
    pub fn l2_norm(&self) -> f32 {
        self.vector.iter().map(|x| x * x).sum::<f32>().sqrt()
    }
}

/// The opaque embedding collaborator.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed(&self, entity_id: &str, text: &str) -> Result<SemanticEmbedding, SemanticError>;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize_in_place(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in v.iter_mut() {
            *value /= norm;
        }
    }
}
