use fxhash::hash64;

use crate::{l2_normalize_in_place, Embedder, SemanticConfig, SemanticEmbedding, SemanticError};

/// Deterministic stub embedder used when no model backend is wired in.
/// Generates sinusoid values derived from a hash of the input text to
/// guarantee reproducible unit vectors with minimal CPU cost.
#[derive(Clone, Debug, Default)]
pub struct StubEmbedder {
    cfg: SemanticConfig,
}

impl StubEmbedder {
    pub fn new(cfg: SemanticConfig) -> Self {
        Self { cfg }
    }
}

impl Embedder for StubEmbedder {
    fn model_id(&self) -> &str {
        &self.cfg.model_id
    }

    fn dim(&self) -> usize {
        self.cfg.dim
    }

    fn embed(&self, entity_id: &str, text: &str) -> Result<SemanticEmbedding, SemanticError> {
        let mut v = vec![0f32; self.cfg.dim];
        let h = hash64(text.as_bytes());
        for (idx, value) in v.iter_mut().enumerate() {
            let rotated = h.rotate_left((idx % 64) as u32);
            *value = ((rotated as f32) * 1e-12 + idx as f32 * 0.001).sin();
        }
        if self.cfg.normalize {
            l2_normalize_in_place(&mut v);
        }
        Ok(SemanticEmbedding {
            entity_id: entity_id.to_string(),
            vector: v,
            model_id: self.cfg.model_id.clone(),
            dim: self.cfg.dim,
            normalized: self.cfg.normalize,
        })
    }
}
