//! Entry point tying query validation, scanning and replacing together
use crate::config::{Config, LimitsConfig, PreviewConfig};
use crate::error::{Result, ValidationError};
use crate::matcher::Matcher;
use crate::metrics::Metrics;
use crate::query::{SearchMode, SearchQuery};
use crate::replace::{
    replace_warnings, ReplaceItem, ReplaceOrchestrator, ReplaceOutcome, ReplacePreview,
};
use crate::scanner::{as_millis, MatchResult, Scanner, SourceReport, SourceWarning};
use crate::source::backup::{BackupLedger, BackupRecord, SharedLedger};
use crate::source::files::FileSource;
use crate::source::records::RecordSource;
use crate::source::ContentSource;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one search produced.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub pattern: String,
    pub mode: SearchMode,
    pub case_sensitive: bool,
    pub sources: Vec<SourceReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<SourceWarning>,
    pub total_containers: usize,
    pub total_occurrences: usize,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl SearchReport {
    /// Results across sources, records first.
    pub fn results(&self) -> impl Iterator<Item = &MatchResult> {
        self.sources.iter().flat_map(|s| s.results.iter())
    }

    pub fn truncated(&self) -> bool {
        self.sources.iter().any(|s| s.truncated)
    }
}

pub struct Engine {
    sources: Vec<ContentSource>,
    limits: LimitsConfig,
    preview: PreviewConfig,
    backups: Option<SharedLedger>,
    metrics: Arc<Metrics>,
}

impl Engine {
    pub fn new(limits: LimitsConfig, preview: PreviewConfig) -> Self {
        Self {
            sources: Vec::new(),
            limits,
            preview,
            backups: None,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Registers a source, replacing any earlier one of the same kind.
    pub fn with_source(mut self, source: ContentSource) -> Self {
        self.sources.retain(|s| s.kind() != source.kind());
        self.sources.push(source);
        self
    }

    /// Builds the file source when roots are configured and the record
    /// source when a store is configured.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut engine = Self::new(config.limits.clone(), config.preview.clone());

        if !config.files.roots.is_empty() {
            let mut files = FileSource::new(config.files.clone())?;
            if let Some(base) = &config.files.backup_dir {
                let ledger = BackupLedger::new(base).shared();
                files = files.with_backups(ledger.clone());
                engine.backups = Some(ledger);
            }
            engine = engine.with_source(ContentSource::Files(files));
        }
        if let Some(records) = RecordSource::from_config(&config.records)? {
            engine = engine.with_source(ContentSource::Records(records));
        }

        debug!("Engine configured with {} source(s)", engine.sources.len());
        Ok(engine)
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn sources(&self) -> &[ContentSource] {
        &self.sources
    }

    /// Backups taken so far by file writes.
    pub fn backups(&self) -> Vec<BackupRecord> {
        self.backups
            .as_ref()
            .map(|ledger| ledger.lock().records().to_vec())
            .unwrap_or_default()
    }

    pub fn search(&self, query: &SearchQuery) -> Result<SearchReport> {
        let start = Instant::now();
        let scope = query.resolve_scope()?;
        let matcher = Matcher::compile(query)?;
        info!(
            "Searching for '{}' ({} mode, case {}) in {}",
            query.pattern,
            matcher.mode(),
            if matcher.is_case_sensitive() {
                "sensitive"
            } else {
                "insensitive"
            },
            query.scope.join(", ")
        );

        let scanner = Scanner::new(&matcher, &self.limits, &self.preview, &self.metrics);
        let (sources, warnings) = scanner.scan(&self.sources, &scope);

        let total_containers = sources.iter().map(|s| s.matched).sum();
        let total_occurrences = sources.iter().map(|s| s.occurrences).sum();
        Ok(SearchReport {
            pattern: query.pattern.clone(),
            mode: query.mode,
            case_sensitive: query.case_sensitive,
            sources,
            warnings,
            total_containers,
            total_occurrences,
            elapsed: start.elapsed(),
        })
    }

    /// Replaces in the given items, each re-read and re-matched first.
    pub fn replace(
        &self,
        query: &SearchQuery,
        replacement: &str,
        items: &[ReplaceItem],
    ) -> Result<ReplaceOutcome> {
        let scope = query.resolve_scope()?;
        let matcher = Matcher::compile(query)?;
        if items.is_empty() {
            return Err(ValidationError::NoItems.into());
        }
        info!(
            "Replacing '{}' with '{}' in {} item(s)",
            query.pattern,
            replacement,
            items.len()
        );
        for warning in replace_warnings(&query.pattern, &matcher, replacement) {
            warn!("{warning}");
        }
        let orchestrator =
            ReplaceOrchestrator::new(&self.sources, &scope, &matcher, replacement, &self.metrics);
        Ok(orchestrator.run(items))
    }

    /// Computes what [`Engine::replace`] would write for the same arguments,
    /// without writing.
    pub fn preview_replace(
        &self,
        query: &SearchQuery,
        replacement: &str,
        items: &[ReplaceItem],
    ) -> Result<ReplacePreview> {
        let scope = query.resolve_scope()?;
        let matcher = Matcher::compile(query)?;
        if items.is_empty() {
            return Err(ValidationError::NoItems.into());
        }
        debug!(
            "Previewing replace of '{}' with '{}' in {} item(s)",
            query.pattern,
            replacement,
            items.len()
        );
        let orchestrator =
            ReplaceOrchestrator::new(&self.sources, &scope, &matcher, replacement, &self.metrics);
        Ok(ReplacePreview {
            replacement: replacement.to_string(),
            warnings: replace_warnings(&query.pattern, &matcher, replacement),
            items: orchestrator.preview(items),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilesConfig, RecordsConfig, RootConfig};
    use crate::error::RfsrError;
    use crate::source::records::{MockRecordStore, Record, RecordKind};
    use crate::source::store::MemoryStore;
    use std::fs;
    use tempfile::tempdir;

    fn record_engine() -> Engine {
        let store = MemoryStore::from_records([
            Record::new(1, RecordKind::Post)
                .with_field("title", "Greeting")
                .with_field("content", "hello world, hello again")
                .with_modified(5),
            Record::new(2, RecordKind::Page)
                .with_field("title", "About")
                .with_field("content", "nothing to see")
                .with_modified(9),
        ]);
        Engine::new(LimitsConfig::default(), PreviewConfig::default()).with_source(
            ContentSource::Records(RecordSource::new(store, RecordsConfig::default())),
        )
    }

    #[test]
    fn search_totals_add_up() {
        let engine = record_engine();
        let report = engine
            .search(&SearchQuery::new("hello").scope(["posts", "pages"]))
            .unwrap();
        assert_eq!(report.total_containers, 1);
        assert_eq!(report.total_occurrences, 2);
        assert!(report.warnings.is_empty());
        let ids: Vec<String> = report.results().map(|r| r.container_id.to_string()).collect();
        assert_eq!(ids, vec!["#1"]);
    }

    #[test]
    fn missing_source_is_a_warning() {
        let engine = record_engine();
        let report = engine
            .search(&SearchQuery::new("hello").scope(["posts", "files"]))
            .unwrap();
        assert_eq!(report.total_containers, 1);
        assert_eq!(report.warnings.len(), 1);
        assert_eq!(report.warnings[0].kind, crate::query::SourceKind::Files);
    }

    #[test]
    fn invalid_queries_never_reach_a_source() {
        let mut store = MockRecordStore::new();
        store.expect_list().never();
        store.expect_get().never();
        store.expect_update_field().never();
        let engine = Engine::new(LimitsConfig::default(), PreviewConfig::default()).with_source(
            ContentSource::Records(RecordSource::new(store, RecordsConfig::default())),
        );

        let bad_regex = SearchQuery::new("(unclosed")
            .mode(SearchMode::Regex)
            .scope(["posts"]);
        assert!(engine.search(&bad_regex).unwrap_err().is_validation());

        let empty = SearchQuery::new("").scope(["posts"]);
        assert!(engine.search(&empty).unwrap_err().is_validation());

        let no_scope = SearchQuery::new("x").scope(Vec::<String>::new());
        assert!(engine.search(&no_scope).unwrap_err().is_validation());

        let err = engine
            .replace(
                &bad_regex,
                "y",
                &[ReplaceItem::new(crate::source::ContainerId::Record { id: 1 })],
            )
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn replace_requires_items() {
        let engine = record_engine();
        let err = engine
            .replace(&SearchQuery::new("hello").scope(["posts"]), "bye", &[])
            .unwrap_err();
        assert!(matches!(
            err,
            RfsrError::Validation(ValidationError::NoItems)
        ));
    }

    #[test]
    fn search_then_replace_then_search_again() {
        let engine = record_engine();
        let query = SearchQuery::new("hello").scope(["posts"]);
        let report = engine.search(&query).unwrap();
        let items: Vec<ReplaceItem> = report.results().map(ReplaceItem::from).collect();

        let outcome = engine.replace(&query, "goodbye", &items).unwrap();
        assert_eq!(outcome.items_changed, 1);
        assert_eq!(outcome.occurrences_replaced, 2);

        let again = engine.search(&query).unwrap();
        assert_eq!(again.total_containers, 0);
        let after = engine
            .search(&SearchQuery::new("goodbye").scope(["posts"]))
            .unwrap();
        assert_eq!(after.total_occurrences, 2);
    }

    #[test]
    fn preview_matches_the_replace_that_follows() {
        let engine = record_engine();
        let query = SearchQuery::new("hello").scope(["posts"]);
        let report = engine.search(&query).unwrap();
        let items: Vec<ReplaceItem> = report.results().map(ReplaceItem::from).collect();

        let preview = engine.preview_replace(&query, "", &items).unwrap();
        assert_eq!(preview.items_changing(), 1);
        assert_eq!(preview.occurrences(), 2);
        assert_eq!(
            preview.warnings,
            vec![crate::replace::ReplaceWarning::DeletesText]
        );
        assert_eq!(engine.search(&query).unwrap().total_occurrences, 2);

        let outcome = engine.replace(&query, "", &items).unwrap();
        assert_eq!(outcome.occurrences_replaced, preview.occurrences());
        assert!(matches!(
            engine.preview_replace(&query, "", &[]),
            Err(RfsrError::Validation(ValidationError::NoItems))
        ));
    }

    #[test]
    fn from_config_builds_sources_and_backups() {
        let dir = tempdir().unwrap();
        let theme = dir.path().join("theme");
        fs::create_dir(&theme).unwrap();
        fs::write(theme.join("header.php"), "<h1>Old Site</h1>\n").unwrap();

        let config = Config {
            files: FilesConfig {
                roots: vec![RootConfig {
                    name: "theme".into(),
                    path: theme.clone(),
                }],
                backup_dir: Some(dir.path().join("backups")),
                ..FilesConfig::default()
            },
            ..Config::default()
        };
        let engine = Engine::from_config(&config).unwrap();
        assert_eq!(engine.sources().len(), 1);

        let query = SearchQuery::new("Old Site").scope(["files"]);
        let report = engine.search(&query).unwrap();
        let items: Vec<ReplaceItem> = report.results().map(ReplaceItem::from).collect();
        let outcome = engine.replace(&query, "New Site", &items).unwrap();

        assert_eq!(outcome.items_changed, 1);
        assert_eq!(
            fs::read_to_string(theme.join("header.php")).unwrap(),
            "<h1>New Site</h1>\n"
        );
        let backups = engine.backups();
        assert_eq!(backups.len(), 1);
        assert_eq!(
            fs::read_to_string(&backups[0].backup).unwrap(),
            "<h1>Old Site</h1>\n"
        );
    }
}
