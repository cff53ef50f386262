//! Structured-record source: posts, pages, custom types, custom fields, comments
use crate::config::RecordsConfig;
use crate::error::{Result, RfsrError};
use crate::query::{ResolvedScope, Scope};
use crate::source::store::JsonStore;
use crate::source::{Field, Links};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

const POST_FIELDS: &[&str] = &["title", "content", "excerpt"];
const META_FIELDS: &[&str] = &["value"];
const COMMENT_FIELDS: &[&str] = &["content", "author"];

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    #[default]
    Publish,
    Private,
    Draft,
    Pending,
    Future,
    Trash,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RecordKind {
    Post,
    Page,
    Custom { post_type: String },
    Meta { key: String, parent: u64 },
    Comment { parent: u64 },
}

impl RecordKind {
    /// Searchable fields, primary field first.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            RecordKind::Post | RecordKind::Page | RecordKind::Custom { .. } => POST_FIELDS,
            RecordKind::Meta { .. } => META_FIELDS,
            RecordKind::Comment { .. } => COMMENT_FIELDS,
        }
    }

    pub fn in_scope(&self, scope: &Scope) -> bool {
        match (self, scope) {
            (RecordKind::Post, Scope::Posts)
            | (RecordKind::Page, Scope::Pages)
            | (RecordKind::Meta { .. }, Scope::Meta)
            | (RecordKind::Comment { .. }, Scope::Comments) => true,
            (RecordKind::Custom { post_type }, Scope::CustomType(wanted)) => post_type == wanted,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: u64,
    #[serde(flatten)]
    pub kind: RecordKind,
    #[serde(default)]
    pub status: RecordStatus,
    /// Unix timestamp of the last modification.
    #[serde(default)]
    pub modified: i64,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new(id: u64, kind: RecordKind) -> Self {
        Self {
            id,
            kind,
            status: RecordStatus::Publish,
            modified: 0,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: &str) -> Self {
        self.fields.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_status(mut self, status: RecordStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_modified(mut self, modified: i64) -> Self {
        self.modified = modified;
        self
    }

    pub fn display_title(&self) -> String {
        match &self.kind {
            RecordKind::Meta { key, .. } => format!("Custom field {key}"),
            RecordKind::Comment { .. } => format!(
                "Comment by {}",
                self.fields.get("author").map_or("anonymous", String::as_str)
            ),
            _ => match self.fields.get("title") {
                Some(title) if !title.trim().is_empty() => title.clone(),
                _ => "(no title)".to_string(),
            },
        }
    }

    fn is_internal_meta(&self) -> bool {
        matches!(&self.kind, RecordKind::Meta { key, .. } if key.starts_with('_'))
    }
}

/// Which records an enumeration or lookup may see.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub scopes: Vec<Scope>,
    pub statuses: Vec<RecordStatus>,
    pub include_internal_meta: bool,
}

impl RecordFilter {
    pub fn matches(&self, record: &Record) -> bool {
        if !self.include_internal_meta && record.is_internal_meta() {
            return false;
        }
        self.statuses.contains(&record.status)
            && self.scopes.iter().any(|s| record.kind.in_scope(s))
    }
}

/// Persistence behind the record source.
#[cfg_attr(test, mockall::automock)]
pub trait RecordStore: Send + Sync {
    /// Records accepted by `filter`, most recently modified first (ties by
    /// descending id), at most `limit`.
    fn list(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>>;

    fn get(&self, id: u64) -> Result<Option<Record>>;

    /// Sets one field. Writing the same value twice leaves the same state.
    fn update_field(&self, id: u64, field: &str, value: &str) -> Result<()>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn list(&self, filter: &RecordFilter, limit: usize) -> Result<Vec<Record>> {
        (**self).list(filter, limit)
    }

    fn get(&self, id: u64) -> Result<Option<Record>> {
        (**self).get(id)
    }

    fn update_field(&self, id: u64, field: &str, value: &str) -> Result<()> {
        (**self).update_field(id, field, value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordCandidate {
    pub id: u64,
    pub kind: RecordKind,
    pub title: String,
}

impl From<&Record> for RecordCandidate {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id,
            kind: record.kind.clone(),
            title: record.display_title(),
        }
    }
}

pub struct RecordSource {
    store: Box<dyn RecordStore>,
    config: RecordsConfig,
}

impl RecordSource {
    pub fn new(store: impl RecordStore + 'static, config: RecordsConfig) -> Self {
        Self {
            store: Box::new(store),
            config,
        }
    }

    /// Builds a JSON-backed source when a store path is configured.
    pub fn from_config(config: &RecordsConfig) -> Result<Option<Self>> {
        match &config.store {
            Some(path) => Ok(Some(Self::new(JsonStore::open(path)?, config.clone()))),
            None => Ok(None),
        }
    }

    fn filter(&self, scope: &ResolvedScope) -> RecordFilter {
        RecordFilter {
            scopes: scope.record_scopes().cloned().collect(),
            statuses: self.config.statuses.clone(),
            include_internal_meta: self.config.include_internal_meta,
        }
    }

    pub fn enumerate(
        &self,
        scope: &ResolvedScope,
        cap: usize,
    ) -> Result<impl Iterator<Item = RecordCandidate>> {
        let filter = self.filter(scope);
        if filter.scopes.is_empty() || cap == 0 {
            return Ok(Vec::new().into_iter());
        }
        let records = self.store.list(&filter, cap)?;
        let candidates: Vec<RecordCandidate> =
            records.iter().take(cap).map(RecordCandidate::from).collect();
        Ok(candidates.into_iter())
    }

    /// Current values of the record's searchable fields. Oversized values
    /// are left out.
    pub fn read_fields(&self, candidate: &RecordCandidate) -> Result<Vec<Field>> {
        let record = self
            .store
            .get(candidate.id)?
            .ok_or_else(|| RfsrError::NotFound(format!("record #{}", candidate.id)))?;

        let mut fields = Vec::new();
        for &name in record.kind.fields() {
            let Some(value) = record.fields.get(name) else {
                continue;
            };
            if value.len() > self.config.max_field_bytes {
                debug!(
                    "Skipping oversized field '{}' of record #{} ({} bytes)",
                    name,
                    record.id,
                    value.len()
                );
                continue;
            }
            fields.push(Field::text(name, value.as_str()));
        }
        Ok(fields)
    }

    pub fn write(&self, candidate: &RecordCandidate, field: &str, text: &str) -> Result<()> {
        if !candidate.kind.fields().contains(&field) {
            return Err(RfsrError::Other(format!(
                "record #{} has no writable field '{field}'",
                candidate.id
            )));
        }
        self.store.update_field(candidate.id, field, text)
    }

    pub fn locate(&self, id: u64, scope: &ResolvedScope) -> Result<RecordCandidate> {
        let record = self
            .store
            .get(id)?
            .ok_or_else(|| RfsrError::NotFound(format!("record #{id}")))?;
        if !self.filter(scope).matches(&record) {
            return Err(RfsrError::NotFound(format!(
                "record #{id} is outside the selected scope"
            )));
        }
        Ok(RecordCandidate::from(&record))
    }

    pub fn links(&self, id: u64) -> Links {
        let render = |template: &Option<String>| {
            template
                .as_ref()
                .map(|t| t.replace("{id}", &id.to_string()))
        };
        Links {
            edit: render(&self.config.edit_url),
            view: render(&self.config.view_url),
        }
    }
}
