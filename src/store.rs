//! The keyed table-of-tables store backing the cache layer.
//!
//! The store is a deliberately thin abstraction: `insert` a row of named
//! fields into a namespace, `select` rows matching a filter. Structural
//! (nested) field values survive a JSON serialization round-trip. No
//! locking; the core assumes exclusive single-process access, and
//! concurrent runs sharing a file store may race.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StoreError;
use crate::value::Value;

/// One stored row: named fields in insertion order.
pub type StoredRow = Vec<(String, Value)>;

/// Keyed table-of-tables persistence used by the cache layer.
pub trait ObjStore {
    /// Appends a row of fields to the namespace, returning the stored row.
    fn insert(&self, namespace: &str, fields: &[(String, Value)]) -> Result<StoredRow, StoreError>;

    /// Rows of the namespace whose fields match every filter entry.
    fn select(&self, namespace: &str, filter: &[(String, Value)])
        -> Result<Vec<StoredRow>, StoreError>;
}

fn matches(row: &StoredRow, filter: &[(String, Value)]) -> bool {
    filter.iter().all(|(k, want)| {
        row.iter()
            .any(|(rk, rv)| rk == k && rv.to_json() == want.to_json())
    })
}

/// Volatile store for tests and cache-less runs.
#[derive(Default)]
pub struct MemoryStore {
    tables: RefCell<HashMap<String, Vec<StoredRow>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }
}

impl ObjStore for MemoryStore {
    fn insert(&self, namespace: &str, fields: &[(String, Value)]) -> Result<StoredRow, StoreError> {
        let row: StoredRow = fields.to_vec();
        self.tables
            .borrow_mut()
            .entry(namespace.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn select(
        &self,
        namespace: &str,
        filter: &[(String, Value)],
    ) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .get(namespace)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[derive(Serialize, Deserialize)]
struct FileRecord {
    table: String,
    fields: serde_json::Map<String, serde_json::Value>,
}

/// Append-only JSON-lines file store. The whole file is loaded at open and
/// every insert is written through, so a restarted run replays its cache.
pub struct JsonFileStore {
    path: PathBuf,
    tables: RefCell<HashMap<String, Vec<StoredRow>>>,
}

impl JsonFileStore {
    pub fn open(path: &Path) -> Result<JsonFileStore, StoreError> {
        let mut tables: HashMap<String, Vec<StoredRow>> = HashMap::new();
        if path.exists() {
            let reader = BufReader::new(File::open(path)?);
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let rec: FileRecord = serde_json::from_str(&line)?;
                let row = rec
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect();
                tables.entry(rec.table).or_default().push(row);
            }
        }
        debug!(path = %path.display(), namespaces = tables.len(), "store opened");
        Ok(JsonFileStore {
            path: path.to_path_buf(),
            tables: RefCell::new(tables),
        })
    }
}

impl ObjStore for JsonFileStore {
    fn insert(&self, namespace: &str, fields: &[(String, Value)]) -> Result<StoredRow, StoreError> {
        let mut obj = serde_json::Map::new();
        for (k, v) in fields {
            obj.insert(k.clone(), v.to_json());
        }
        let rec = FileRecord {
            table: namespace.to_string(),
            fields: obj,
        };
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        serde_json::to_writer(&mut f, &rec)?;
        f.write_all(b"\n")?;

        let row: StoredRow = fields.to_vec();
        self.tables
            .borrow_mut()
            .entry(namespace.to_string())
            .or_default()
            .push(row.clone());
        Ok(row)
    }

    fn select(
        &self,
        namespace: &str,
        filter: &[(String, Value)],
    ) -> Result<Vec<StoredRow>, StoreError> {
        Ok(self
            .tables
            .borrow()
            .get(namespace)
            .map(|rows| {
                rows.iter()
                    .filter(|r| matches(r, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fields(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn memory_insert_select_filter() {
        let store = MemoryStore::new();
        store
            .insert("people", &fields(&[("id", Value::Int(10)), ("name", "James".into())]))
            .expect("insert");
        store
            .insert("people", &fields(&[("id", Value::Int(11)), ("name", "Maria".into())]))
            .expect("insert");

        let all = store.select("people", &[]).expect("select");
        assert_eq!(all.len(), 2);

        let maria = store
            .select("people", &fields(&[("id", Value::Int(11))]))
            .expect("select");
        assert_eq!(maria.len(), 1);
        assert_eq!(maria[0][1].1, Value::Str("Maria".into()));

        let none = store.select("nothing", &[]).expect("select");
        assert!(none.is_empty());
    }

    #[test]
    fn file_store_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cache.jsonl");

        {
            let store = JsonFileStore::open(&path).expect("open");
            store
                .insert("cached_llm", &fields(&[("key", "k1".into()), ("output", "v1".into())]))
                .expect("insert");
        }

        let store = JsonFileStore::open(&path).expect("reopen");
        let rows = store
            .select("cached_llm", &fields(&[("key", "k1".into())]))
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], ("output".to_string(), Value::Str("v1".into())));
    }
}
