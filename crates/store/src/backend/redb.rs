//! Redb (Rust embedded database) backend for the entity store.
//!
//! Redb is a pure Rust embedded key-value store that provides ACID
//! transactions without external dependencies. One redb table is kept per
//! logical [`Table`], so a per-corpus re-ingest can clear one entity family
//! without touching the others.

use crate::backend::{StoreBackend, Table};
use crate::StoreError;
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

const PROVISIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("provisions");
const REFERENCES: TableDefinition<&str, &[u8]> = TableDefinition::new("references");
const TERM_USAGE: TableDefinition<&str, &[u8]> = TableDefinition::new("term_usage");
const EMBEDDINGS: TableDefinition<&str, &[u8]> = TableDefinition::new("embeddings");
const BASELINE: TableDefinition<&str, &[u8]> = TableDefinition::new("baseline");
const FINGERPRINTS: TableDefinition<&str, &[u8]> = TableDefinition::new("fingerprints");
const META: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

fn definition(table: Table) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match table {
        Table::Provisions => PROVISIONS,
        Table::References => REFERENCES,
        Table::TermUsage => TERM_USAGE,
        Table::Embeddings => EMBEDDINGS,
        Table::Baseline => BASELINE,
        Table::Fingerprints => FINGERPRINTS,
        Table::Meta => META,
    }
}

/// Redb backend implementation for persistent key-value storage.
///
/// All operations are atomic and durable by default; redb handles its own
/// internal locking and MVCC, so the `Arc<Database>` can be shared freely
/// across threads.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a redb database at the given path and make sure every
    /// logical table exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(|e| StoreError::backend(e.to_string()))?;

        let write_txn = db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            for table in Table::ALL {
                // Accessing the table creates it if it doesn't exist.
                let _table = write_txn
                    .open_table(definition(table))
                    .map_err(|e| StoreError::backend(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn put(&self, table: Table, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(|e| StoreError::backend(e.to_string()))?;
            t.insert(key, value)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn get(&self, table: Table, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let t = read_txn
            .open_table(definition(table))
            .map_err(|e| StoreError::backend(e.to_string()))?;

        match t.get(key).map_err(|e| StoreError::backend(e.to_string()))? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, table: Table, key: &str) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(|e| StoreError::backend(e.to_string()))?;
            t.remove(key)
                .map_err(|e| StoreError::backend(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn batch_put(&self, table: Table, entries: Vec<(String, Vec<u8>)>) -> Result<(), StoreError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(|e| StoreError::backend(e.to_string()))?;
            for (key, value) in entries {
                t.insert(key.as_str(), value.as_slice())
                    .map_err(|e| StoreError::backend(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn scan(
        &self,
        table: Table,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        let t = read_txn
            .open_table(definition(table))
            .map_err(|e| StoreError::backend(e.to_string()))?;

        for item in t.iter().map_err(|e| StoreError::backend(e.to_string()))? {
            let (key, value) = item.map_err(|e| StoreError::backend(e.to_string()))?;
            visitor(key.value(), value.value())?;
        }
        Ok(())
    }

    fn delete_prefix(&self, table: Table, prefix: &str) -> Result<(), StoreError> {
        // Collect matching keys under a read txn first; redb ranges cannot be
        // mutated while iterated.
        let mut doomed = Vec::new();
        self.scan(table, &mut |key, _| {
            if key.starts_with(prefix) {
                doomed.push(key.to_string());
            }
            Ok(())
        })?;
        if doomed.is_empty() {
            return Ok(());
        }

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        {
            let mut t = write_txn
                .open_table(definition(table))
                .map_err(|e| StoreError::backend(e.to_string()))?;
            for key in &doomed {
                t.remove(key.as_str())
                    .map_err(|e| StoreError::backend(e.to_string()))?;
            }
        }
        write_txn
            .commit()
            .map_err(|e| StoreError::backend(e.to_string()))?;
        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Redb commits are synchronous by default, so flush is a no-op.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn redb_backend_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put(Table::Provisions, "key1", b"value1").unwrap();
        assert_eq!(
            backend.get(Table::Provisions, "key1").unwrap(),
            Some(b"value1".to_vec())
        );
        assert_eq!(backend.get(Table::Provisions, "missing").unwrap(), None);
        // Tables are isolated keyspaces.
        assert_eq!(backend.get(Table::Baseline, "key1").unwrap(), None);
    }

    #[test]
    fn redb_backend_batch_and_scan() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        let entries = vec![
            ("a".to_string(), b"1".to_vec()),
            ("b".to_string(), b"2".to_vec()),
            ("c".to_string(), b"3".to_vec()),
        ];
        backend.batch_put(Table::Fingerprints, entries).unwrap();

        let mut seen = Vec::new();
        backend
            .scan(Table::Fingerprints, &mut |key, value| {
                seen.push((key.to_string(), value.to_vec()));
                Ok(())
            })
            .unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, "a");
    }

    #[test]
    fn redb_backend_delete_prefix() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put(Table::Provisions, "X_Section_1", b"1").unwrap();
        backend.put(Table::Provisions, "X_Section_2", b"2").unwrap();
        backend.put(Table::Provisions, "Y_Section_1", b"3").unwrap();

        backend.delete_prefix(Table::Provisions, "X_").unwrap();

        assert_eq!(backend.get(Table::Provisions, "X_Section_1").unwrap(), None);
        assert_eq!(backend.get(Table::Provisions, "X_Section_2").unwrap(), None);
        assert!(backend
            .get(Table::Provisions, "Y_Section_1")
            .unwrap()
            .is_some());
    }
}
