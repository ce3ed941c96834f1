use crate::StoreError;
use std::sync::RwLock;

/// Logical tables of the entity store. Every backend keeps one keyspace per
/// table; keys are entity ids (or composite ids joined with `|`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Table {
    Provisions,
    References,
    TermUsage,
    Embeddings,
    Baseline,
    Fingerprints,
    Meta,
}

impl Table {
    pub const ALL: [Table; 7] = [
        Table::Provisions,
        Table::References,
        Table::TermUsage,
        Table::Embeddings,
        Table::Baseline,
        Table::Fingerprints,
        Table::Meta,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Table::Provisions => "provisions",
            Table::References => "references",
            Table::TermUsage => "term_usage",
            Table::Embeddings => "embeddings",
            Table::Baseline => "baseline",
            Table::Fingerprints => "fingerprints",
            Table::Meta => "meta",
        }
    }
}

/// Trait for a key-value storage backend of the entity store.
/// This allows for different storage implementations (e.g., in-memory, Redb).
pub trait StoreBackend: Send + Sync {
    /// Insert or update a key-value pair.
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), StoreError>;
    /// Retrieve a value by key.
    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    /// Delete a key-value pair.
    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError>;
    /// Insert or update multiple key-value pairs in one transaction.
    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError>;
    /// Scan all key-value pairs of a table, calling the visitor for each one.
    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError>;
    /// Delete every key with the given prefix. Used by per-corpus re-ingest.
    fn delete_prefix(&self, table: Table, prefix: &str) -> Result<(), StoreError>;
    /// Flush any buffered writes to the backend.
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Configuration for selecting and building a backend.
///
/// # Example
/// ```
/// use store::BackendConfig;
///
/// // In-memory (for testing)
/// let config = BackendConfig::in_memory();
///
/// // Redb (pure Rust, persistent)
/// let config = BackendConfig::redb("/data/lexgraph.redb");
/// ```
#[derive(Clone, Debug, Default)]
pub enum BackendConfig {
    /// Use Redb for storage. The `path` is the file path for the database.
    ///
    /// Requires the `embedded` feature to be enabled at compile time
    /// (enabled by default).
    Redb { path: String },
    /// Use in-memory hash maps for storage. This is useful for testing.
    #[default]
    InMemory,
}

impl BackendConfig {
    /// Create an in-memory backend configuration.
    pub fn in_memory() -> Self {
        BackendConfig::InMemory
    }

    /// Create a Redb backend configuration.
    pub fn redb<P: Into<String>>(path: P) -> Self {
        BackendConfig::Redb { path: path.into() }
    }

    /// Build the backend based on the configuration.
    pub fn build(&self) -> Result<Box<dyn StoreBackend>, StoreError> {
        match self {
            BackendConfig::InMemory => Ok(Box::new(InMemoryBackend::new())),
            BackendConfig::Redb { path } => {
                #[cfg(feature = "embedded")]
                {
                    Ok(Box::new(RedbBackend::open(path)?))
                }
                #[cfg(not(feature = "embedded"))]
                {
                    let _ = path;
                    Err(StoreError::backend("redb backend disabled at compile time"))
                }
            }
        }
    }
}

type KeySpace = std::collections::BTreeMap<String, Vec<u8>>;

/// An in-memory backend using a `RwLock` around one ordered map per table.
/// Ordered maps keep scans deterministic, which in turn keeps every ranking
/// downstream bit-stable.
pub struct InMemoryBackend {
    tables: [RwLock<KeySpace>; 7],
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: std::array::from_fn(|_| RwLock::new(KeySpace::new())),
        }
    }

    fn slot(&self, table: Table) -> &RwLock<KeySpace> {
        let idx = Table::ALL
            .iter()
            .position(|t| *t == table)
            .expect("table in ALL");
        &self.tables[idx]
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreBackend for InMemoryBackend {
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), StoreError> {
        self.slot(table)
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let guard = self
            .slot(table)
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        Ok(guard.get(key).cloned())
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        self.slot(table)
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?
            .remove(key);
        Ok(())
    }

    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        // A single write lock is held for the entire batch insert.
        let mut guard = self
            .slot(table)
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for (key, value) in entries {
            guard.insert(key, value);
        }
        Ok(())
    }

    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let guard = self
            .slot(table)
            .read()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        for (key, value) in guard.iter() {
            visitor(key, value)?;
        }
        Ok(())
    }

    fn delete_prefix(&self, table: Table, prefix: &str) -> Result<(), StoreError> {
        let mut guard = self
            .slot(table)
            .write()
            .map_err(|_| StoreError::backend("poisoned lock"))?;
        guard.retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

/// The Redb backend implementation.
///
/// Redb is a pure Rust ACID-compliant embedded database that serves as the
/// persistent storage backend.
#[cfg(feature = "embedded")]
pub mod redb;

#[cfg(feature = "embedded")]
pub use redb::RedbBackend;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_roundtrip_per_table() {
        let backend = InMemoryBackend::new();
        backend.put(Table::Provisions, "p1", b"alpha").unwrap();
        backend.put(Table::Baseline, "p1", b"beta").unwrap();

        assert_eq!(
            backend.get(Table::Provisions, "p1").unwrap(),
            Some(b"alpha".to_vec())
        );
        assert_eq!(
            backend.get(Table::Baseline, "p1").unwrap(),
            Some(b"beta".to_vec())
        );
        assert_eq!(backend.get(Table::Fingerprints, "p1").unwrap(), None);
    }

    #[test]
    fn scan_visits_keys_in_order() {
        let backend = InMemoryBackend::new();
        backend.put(Table::Provisions, "b", b"2").unwrap();
        backend.put(Table::Provisions, "a", b"1").unwrap();
        backend.put(Table::Provisions, "c", b"3").unwrap();

        let mut keys = Vec::new();
        backend
            .scan(Table::Provisions, &mut |key, _| {
                keys.push(key.to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn delete_prefix_removes_only_matching_keys() {
        let backend = InMemoryBackend::new();
        backend.put(Table::Provisions, "A_Section_1", b"1").unwrap();
        backend.put(Table::Provisions, "A_Section_2", b"2").unwrap();
        backend.put(Table::Provisions, "B_Section_1", b"3").unwrap();

        backend.delete_prefix(Table::Provisions, "A_").unwrap();

        assert_eq!(backend.get(Table::Provisions, "A_Section_1").unwrap(), None);
        assert!(backend
            .get(Table::Provisions, "B_Section_1")
            .unwrap()
            .is_some());
    }
}
