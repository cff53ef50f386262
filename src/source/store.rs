//! Record stores: in-memory and JSON-file backed
use crate::error::{Result, RfsrError};
use crate::source::records::{Record, RecordFilter, RecordStore};
use log::debug;
use parking_lot::RwLock;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Records keyed by id behind a lock, shared by both stores.
#[derive(Debug, Default)]
struct RecordTable(RwLock<BTreeMap<u64, Record>>);

impl RecordTable {
    fn new(records: impl IntoIterator<Item = Record>) -> Self {
        Self(RwLock::new(records.into_iter().map(|r| (r.id, r)).collect()))
    }

    /// Most recently modified first, ties broken by descending id.
    fn list(&self, filter: &RecordFilter, limit: usize) -> Vec<Record> {
        let records = self.0.read();
        let mut selected: Vec<&Record> = records.values().filter(|r| filter.matches(r)).collect();
        selected.sort_by_key(|r| (Reverse(r.modified), Reverse(r.id)));
        selected.into_iter().take(limit).cloned().collect()
    }

    fn get(&self, id: u64) -> Option<Record> {
        self.0.read().get(&id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RecordTable,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: impl IntoIterator<Item = Record>) -> Self {
        Self {
            records: RecordTable::new(records),
        }
    }

    pub fn insert(&self, record: Record) {
        self.records.0.write().insert(record.id, record);
    }

    pub fn snapshot(&self) -> Vec<Record> {
        self.records.0.read().values().cloned().collect()
    }

    pub fn field(&self, id: u64, field: &str) -> Option<String> {
        self.records.get(id).and_then(|mut r| r.fields.remove(field))
    }
}

impl RecordStore for MemoryStore {
    fn list(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>> {
        Ok(self.records.list(filter, limit))
    }

    fn get(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.records.get(id))
    }

    fn update_field(&self, id: u64, field: &str, value: &str) -> Result<()> {
        let mut records = self.records.0.write();
        let record = records
            .get_mut(&id)
            .ok_or_else(|| RfsrError::NotFound(format!("record #{id}")))?;
        record.fields.insert(field.to_string(), value.to_string());
        Ok(())
    }
}

/// A JSON array of records on disk, rewritten on every update.
#[derive(Debug)]
pub struct JsonStore {
    path: PathBuf,
    records: RecordTable,
}

impl JsonStore {
    /// Opens `path`; a missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let records: Vec<Record> = if path.exists() {
            let content = fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            Vec::new()
        };
        debug!("Loaded {} records from {}", records.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            records: RecordTable::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the new content is written to before it replaces the store.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// Writes the staging file, then renames it over the store so readers
    /// never see a partial file.
    fn persist(&self, records: &BTreeMap<u64, Record>) -> Result<()> {
        let all: Vec<&Record> = records.values().collect();
        let content = serde_json::to_string_pretty(&all)?;
        let staging = self.staging_path();
        fs::write(&staging, content)?;
        if let Err(e) = fs::rename(&staging, &self.path) {
            let _ = fs::remove_file(&staging);
            return Err(e.into());
        }
        Ok(())
    }
}

impl RecordStore for JsonStore {
    fn list(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>> {
        Ok(self.records.list(filter, limit))
    }

    fn get(&self, id: u64) -> Result<Option<Record>> {
        Ok(self.records.get(id))
    }

    fn update_field(&self, id: u64, field: &str, value: &str) -> Result<()> {
        let mut records = self.records.0.write();
        let mut updated = records
            .get(&id)
            .cloned()
            .ok_or_else(|| RfsrError::NotFound(format!("record #{id}")))?;
        updated.fields.insert(field.to_string(), value.to_string());

        let previous = records.insert(id, updated);
        if let Err(e) = self.persist(&records) {
            if let Some(previous) = previous {
                records.insert(id, previous);
            }
            return Err(e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::records::{RecordKind, RecordStatus};
    use crate::query::Scope;

    fn filter() -> RecordFilter {
        RecordFilter {
            scopes: vec![Scope::Posts],
            statuses: vec![RecordStatus::Publish],
            include_internal_meta: false,
        }
    }

    #[test]
    fn json_store_persists_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        fs::write(
            &path,
            r#"[{"id": 1, "type": "post", "fields": {"title": "Old"}}]"#,
        )
        .unwrap();

        let store = JsonStore::open(&path).unwrap();
        store.update_field(1, "title", "New").unwrap();
        store.update_field(1, "title", "New").unwrap();

        let reopened = JsonStore::open(&path).unwrap();
        let record = reopened.get(1).unwrap().unwrap();
        assert_eq!(record.fields["title"], "New");
        assert_eq!(reopened.list(&filter(), 10).unwrap().len(), 1);
        assert!(!dir.path().join("records.json.tmp").exists());
    }

    #[test]
    fn failed_persist_keeps_file_and_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.json");
        let original = r#"[{"id": 1, "type": "post", "fields": {"title": "Old"}}]"#;
        fs::write(&path, original).unwrap();
        let store = JsonStore::open(&path).unwrap();

        // A directory in the staging file's place makes the write fail.
        fs::create_dir(dir.path().join("records.json.tmp")).unwrap();
        assert!(store.update_field(1, "title", "New").is_err());

        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert_eq!(store.get(1).unwrap().unwrap().fields["title"], "Old");
    }

    #[test]
    fn missing_record_is_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(
            store.update_field(3, "title", "x"),
            Err(RfsrError::NotFound(_))
        ));
    }

    #[test]
    fn missing_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::open(&dir.path().join("absent.json")).unwrap();
        assert!(store.list(&filter(), 10).unwrap().is_empty());
    }

    #[test]
    fn list_orders_by_modified_then_id() {
        let store = MemoryStore::from_records([
            Record::new(1, RecordKind::Post).with_modified(5),
            Record::new(2, RecordKind::Post).with_modified(5),
            Record::new(3, RecordKind::Post).with_modified(1),
        ]);
        let ids: Vec<u64> = store
            .list(&filter(), 10)
            .unwrap()
            .iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }
}
