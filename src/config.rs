//! YAML configuration for the whole engine.
//!
//! One file configures every stage: storage backend, embedding model,
//! graph weights and expansion limits, APPR parameters, lexical retrieval,
//! search ranking, the indexing batch, and the corpus registry with its
//! exclusion lists.
//!
//! ## Example
//!
//! ```yaml
//! version: "1.0"
//! name: "production"
//!
//! store:
//!   backend: "redb"
//!   path: "/data/lexgraph.redb"
//!
//! semantic:
//!   model_id: "stub-384"
//!   dim: 384
//!
//! graph:
//!   weights:
//!     alpha_citation: 0.45
//!     alpha_hierarchy: 0.20
//!     alpha_term: 0.20
//!     alpha_semantic: 0.05
//!   limits:
//!     radius: 2
//!     max_nodes: 5000
//!
//! appr:
//!   gamma: 0.55
//!   eps: 0.000001
//!   top_k: 200
//!
//! search:
//!   lex_top: 200
//!   seed_top: 12
//!
//! corpora:
//!   default: "ITAA1997"
//!   entries:
//!     - id: "ITAA1997"
//!       title: "Income Tax Assessment Act 1997"
//!       excluded_ref_ids: ["ITAA1997:Section:995-1"]
//! ```

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use graph::{ExpansionLimits, GraphWeights};
use indexer::IndexerConfig;
use lexical::LexicalConfig;
use relatedness::ApprConfig;
use search::SearchConfig;
use semantic::SemanticConfig;
use store::{BackendConfig, CorpusInfo, CorpusRegistry};

/// Errors raised while loading or validating a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),
}

/// Top-level configuration bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexGraphConfig {
    /// Configuration format version.
    pub version: String,

    /// Optional configuration name/description.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub store: StoreYamlConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub graph: GraphYamlConfig,

    #[serde(default)]
    pub appr: ApprConfig,

    #[serde(default)]
    pub lexical: LexicalConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub indexer: IndexerYamlConfig,

    pub corpora: CorporaYamlConfig,
}

impl LexGraphConfig {
    /// Load a YAML configuration file from the given path.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: LexGraphConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// An in-memory single-corpus configuration, handy for tests and demos.
    pub fn in_memory(corpus: CorpusInfo) -> Self {
        let default = corpus.id.clone();
        Self {
            version: "1.0".to_string(),
            name: None,
            store: StoreYamlConfig::default(),
            semantic: SemanticConfig::default(),
            graph: GraphYamlConfig::default(),
            appr: ApprConfig::default(),
            lexical: LexicalConfig::default(),
            search: SearchConfig::default(),
            indexer: IndexerYamlConfig::default(),
            corpora: CorporaYamlConfig {
                default,
                entries: vec![corpus],
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.version.as_str() {
            "1.0" | "1" => {}
            v => return Err(ConfigError::UnsupportedVersion(v.to_string())),
        }
        self.store.validate()?;
        if !(0.0 < self.appr.gamma && self.appr.gamma < 1.0) {
            return Err(ConfigError::Validation(
                "appr.gamma must lie strictly between 0 and 1".to_string(),
            ));
        }
        if self.appr.eps <= 0.0 {
            return Err(ConfigError::Validation(
                "appr.eps must be positive".to_string(),
            ));
        }
        if self.appr.top_k == 0 {
            return Err(ConfigError::Validation(
                "appr.top_k must be >= 1".to_string(),
            ));
        }
        if self.graph.limits.radius == 0 || self.graph.limits.max_nodes == 0 {
            return Err(ConfigError::Validation(
                "graph.limits.radius and max_nodes must be >= 1".to_string(),
            ));
        }
        self.search
            .validate()
            .map_err(|e| ConfigError::Validation(e.to_string()))?;
        if self.corpora.entries.is_empty() {
            return Err(ConfigError::Validation(
                "corpora.entries must not be empty".to_string(),
            ));
        }
        if !self
            .corpora
            .entries
            .iter()
            .any(|c| c.id == self.corpora.default)
        {
            return Err(ConfigError::Validation(format!(
                "corpora.default '{}' is not a configured corpus",
                self.corpora.default
            )));
        }
        Ok(())
    }

    pub fn registry(&self) -> CorpusRegistry {
        CorpusRegistry::new(self.corpora.entries.clone(), &self.corpora.default)
    }

    pub fn indexer_config(&self) -> IndexerConfig {
        IndexerConfig {
            weights: self.graph.weights,
            appr: self.appr,
            precompute_fingerprints: self.indexer.precompute_fingerprints,
            include_semantic: self.indexer.include_semantic,
            embed_model_id: self.semantic.model_id.clone(),
            sem_k: self.graph.limits.sem_k,
            baseline_iterations: self.indexer.baseline_iterations,
            parallel: self.indexer.parallel,
        }
    }
}

/// Storage backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreYamlConfig {
    /// `in_memory` or `redb`.
    pub backend: String,
    pub path: Option<String>,
}

impl Default for StoreYamlConfig {
    fn default() -> Self {
        Self {
            backend: "in_memory".to_string(),
            path: None,
        }
    }
}

impl StoreYamlConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.backend.as_str() {
            "in_memory" => Ok(()),
            "redb" => {
                if self.path.is_none() {
                    return Err(ConfigError::Validation(
                        "store.path is required when backend is 'redb'".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(ConfigError::Validation(format!(
                "store.backend must be 'in_memory' or 'redb', got '{other}'"
            ))),
        }
    }

    pub fn backend_config(&self) -> BackendConfig {
        match self.backend.as_str() {
            "redb" => BackendConfig::redb(self.path.clone().unwrap_or_default()),
            _ => BackendConfig::in_memory(),
        }
    }
}

/// Graph construction settings: view weights plus expansion limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphYamlConfig {
    pub weights: GraphWeights,
    pub limits: ExpansionLimits,
}

/// Indexing batch toggles; weights and APPR parameters are shared with the
/// query path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerYamlConfig {
    pub precompute_fingerprints: bool,
    pub include_semantic: bool,
    pub baseline_iterations: usize,
    pub parallel: bool,
}

impl Default for IndexerYamlConfig {
    fn default() -> Self {
        Self {
            precompute_fingerprints: true,
            include_semantic: true,
            baseline_iterations: relatedness::BASELINE_ITERATIONS,
            parallel: true,
        }
    }
}

/// The configured corpora and the default one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorporaYamlConfig {
    pub default: String,
    pub entries: Vec<CorpusInfo>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn load_minimal_yaml() {
        let yaml = r#"
version: "1.0"
corpora:
  default: "ITAA1997"
  entries:
    - id: "ITAA1997"
      title: "Income Tax Assessment Act 1997"
"#;
        let config = LexGraphConfig::from_yaml(yaml).expect("parse");
        assert_eq!(config.version, "1.0");
        assert_eq!(config.corpora.default, "ITAA1997");
        // Untouched sections fall back to defaults.
        assert_eq!(config.appr.gamma, 0.55);
        assert_eq!(config.search.lex_top, 200);
        assert_eq!(config.graph.limits.sem_k, 80);
    }

    #[test]
    fn load_from_file() {
        let yaml = r#"
version: "1.0"
corpora:
  default: "C"
  entries:
    - id: "C"
      title: "Corpus"
"#;
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml.as_bytes()).unwrap();
        let config = LexGraphConfig::from_file(temp_file.path()).expect("load");
        assert_eq!(config.corpora.entries.len(), 1);
    }

    #[test]
    fn partial_overrides_merge_with_defaults() {
        let yaml = r#"
version: "1.0"
appr:
  gamma: 0.5
graph:
  weights:
    alpha_semantic: 0.25
corpora:
  default: "C"
  entries:
    - id: "C"
      title: "Corpus"
      excluded_ref_ids: ["C:Section:995-1"]
"#;
        let config = LexGraphConfig::from_yaml(yaml).expect("parse");
        assert_eq!(config.appr.gamma, 0.5);
        assert_eq!(config.appr.top_k, 200);
        assert_eq!(config.graph.weights.alpha_semantic, 0.25);
        assert_eq!(config.graph.weights.alpha_citation, 0.45);
        assert_eq!(config.corpora.entries[0].excluded_ref_ids.len(), 1);
    }

    #[test]
    fn rejects_bad_version_and_bad_gamma() {
        let yaml = r#"
version: "7"
corpora:
  default: "C"
  entries:
    - id: "C"
      title: "Corpus"
"#;
        assert!(matches!(
            LexGraphConfig::from_yaml(yaml),
            Err(ConfigError::UnsupportedVersion(_))
        ));

        let yaml = r#"
version: "1.0"
appr:
  gamma: 1.5
corpora:
  default: "C"
  entries:
    - id: "C"
      title: "Corpus"
"#;
        assert!(matches!(
            LexGraphConfig::from_yaml(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn redb_backend_requires_path() {
        let yaml = r#"
version: "1.0"
store:
  backend: "redb"
corpora:
  default: "C"
  entries:
    - id: "C"
      title: "Corpus"
"#;
        assert!(matches!(
            LexGraphConfig::from_yaml(yaml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn unknown_default_corpus_is_rejected() {
        let yaml = r#"
version: "1.0"
corpora:
  default: "MISSING"
  entries:
    - id: "C"
      title: "Corpus"
"#;
        assert!(matches!(
            LexGraphConfig::from_yaml(yaml),
            Err(ConfigError::Validation(_))
        ));
    }
}
