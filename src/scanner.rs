//! Drives enumeration and matching across content sources
use crate::config::{LimitsConfig, PreviewConfig};
use crate::error::Result;
use crate::matcher::Matcher;
use crate::metrics::Metrics;
use crate::preview::{field_window, LineCollector, LinePreview};
use crate::query::{ResolvedScope, SourceKind};
use crate::source::{CandidateRef, ContainerId, ContentSource, Field, FieldBody, Links};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Serialize, Serializer};
use std::time::{Duration, Instant};

pub(crate) fn as_millis<S: Serializer>(
    d: &Duration,
    s: S,
) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Matches within one field of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMatch {
    pub field: String,
    pub preview: String,
    pub occurrences: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<LinePreview>,
}

/// One container with at least one match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchResult {
    pub source_kind: SourceKind,
    pub container_id: ContainerId,
    pub title: String,
    pub fields: Vec<FieldMatch>,
    pub total_occurrences: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Links>,
}

impl MatchResult {
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceReport {
    pub kind: SourceKind,
    pub results: Vec<MatchResult>,
    pub scanned: usize,
    pub matched: usize,
    pub skipped: usize,
    pub occurrences: usize,
    /// More candidates existed beyond the cap.
    pub truncated: bool,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl SourceReport {
    fn empty(kind: SourceKind) -> Self {
        Self {
            kind,
            results: Vec::new(),
            scanned: 0,
            matched: 0,
            skipped: 0,
            occurrences: 0,
            truncated: false,
            elapsed: Duration::ZERO,
        }
    }
}

/// A source that contributed nothing because it could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceWarning {
    pub kind: SourceKind,
    pub message: String,
}

pub struct Scanner<'a> {
    matcher: &'a Matcher,
    limits: &'a LimitsConfig,
    preview: &'a PreviewConfig,
    metrics: &'a Metrics,
}

impl<'a> Scanner<'a> {
    pub fn new(
        matcher: &'a Matcher,
        limits: &'a LimitsConfig,
        preview: &'a PreviewConfig,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            matcher,
            limits,
            preview,
            metrics,
        }
    }

    fn cap_for(&self, kind: SourceKind) -> usize {
        match kind {
            SourceKind::Records => self.limits.max_records,
            SourceKind::Files => self.limits.max_files,
        }
    }

    /// Scans every source the scope selects. A failing source yields an
    /// empty report and a warning; the others are unaffected.
    pub fn scan(
        &self,
        sources: &[ContentSource],
        scope: &ResolvedScope,
    ) -> (Vec<SourceReport>, Vec<SourceWarning>) {
        let mut reports = Vec::new();
        let mut warnings = Vec::new();

        for kind in [SourceKind::Records, SourceKind::Files] {
            if !scope.selects(kind) {
                debug!("Skipping {kind} search - not in scope");
                continue;
            }
            let Some(source) = sources.iter().find(|s| s.kind() == kind) else {
                warn!("No {kind} source configured");
                warnings.push(SourceWarning {
                    kind,
                    message: format!("no {kind} source configured"),
                });
                reports.push(SourceReport::empty(kind));
                continue;
            };

            match self.scan_source(source, scope) {
                Ok(report) => {
                    info!(
                        "Scanned {} {} in {}ms: {} matching, {} skipped{}",
                        report.scanned,
                        kind,
                        report.elapsed.as_millis(),
                        report.matched,
                        report.skipped,
                        if report.truncated { " (truncated)" } else { "" }
                    );
                    reports.push(report);
                }
                Err(e) => {
                    warn!("{kind} search failed: {e}");
                    self.metrics.record_source_failure(kind);
                    warnings.push(SourceWarning {
                        kind,
                        message: e.to_string(),
                    });
                    reports.push(SourceReport::empty(kind));
                }
            }
        }

        (reports, warnings)
    }

    pub fn scan_source(
        &self,
        source: &ContentSource,
        scope: &ResolvedScope,
    ) -> Result<SourceReport> {
        let start = Instant::now();
        let kind = source.kind();
        let cap = self.cap_for(kind);

        let mut candidates_iter = source.enumerate(scope, cap.saturating_add(1))?;
        let candidates: Vec<CandidateRef> = candidates_iter.by_ref().take(cap).collect();
        let truncated = candidates_iter.next().is_some();
        drop(candidates_iter);

        let outcomes: Vec<(CandidateRef, Result<Option<MatchResult>>)> =
            if self.limits.parallel && kind == SourceKind::Files {
                candidates
                    .into_par_iter()
                    .map(|c| {
                        let outcome = self.match_candidate(source, &c);
                        (c, outcome)
                    })
                    .collect()
            } else {
                candidates
                    .into_iter()
                    .map(|c| {
                        let outcome = self.match_candidate(source, &c);
                        (c, outcome)
                    })
                    .collect()
            };

        let mut report = SourceReport::empty(kind);
        report.scanned = outcomes.len();
        report.truncated = truncated;
        for (candidate, outcome) in outcomes {
            match outcome {
                Ok(Some(result)) => {
                    report.matched += 1;
                    report.occurrences += result.total_occurrences;
                    report.results.push(result);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!("Skipping {}: {e}", candidate.container_id());
                    report.skipped += 1;
                }
            }
        }

        report.elapsed = start.elapsed();
        self.metrics.record_scan(&report);
        Ok(report)
    }

    fn match_candidate(
        &self,
        source: &ContentSource,
        candidate: &CandidateRef,
    ) -> Result<Option<MatchResult>> {
        let mut fields = Vec::new();
        for field in source.read_fields(candidate)? {
            if let Some(m) = self.match_field(field)? {
                fields.push(m);
            }
        }
        if fields.is_empty() {
            return Ok(None);
        }

        let container_id = candidate.container_id();
        let total_occurrences = fields.iter().map(|f| f.occurrences).sum();
        debug!("Match in {container_id} ({total_occurrences} occurrences)");
        Ok(Some(MatchResult {
            source_kind: source.kind(),
            container_id,
            title: candidate.title(),
            fields,
            total_occurrences,
            links: source.links(candidate),
        }))
    }

    /// Matches one field. Free text is matched whole; line-oriented text
    /// one line at a time.
    pub fn match_field(&self, field: Field) -> Result<Option<FieldMatch>> {
        match field.body {
            FieldBody::Text(text) => {
                let occurrences = self.matcher.count_matches(&text);
                if occurrences == 0 {
                    return Ok(None);
                }
                Ok(Some(FieldMatch {
                    field: field.name,
                    preview: field_window(&text, self.matcher, self.preview),
                    occurrences,
                    lines: Vec::new(),
                }))
            }
            FieldBody::Lines(reader) => {
                let mut collector = LineCollector::from_config(self.preview);
                reader.for_each_line(|n, line| {
                    collector.push(n, line, self.matcher.count_matches(line))
                })?;
                let scan = collector.finish();
                if scan.occurrences == 0 {
                    return Ok(None);
                }
                let preview = scan
                    .previews
                    .first()
                    .map(|p| format!("{}: {}", p.line_number, p.content))
                    .unwrap_or_default();
                Ok(Some(FieldMatch {
                    field: field.name,
                    preview,
                    occurrences: scan.occurrences,
                    lines: scan.previews,
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecordsConfig;
    use crate::error::RfsrError;
    use crate::query::{SearchMode, SearchQuery};
    use crate::source::records::{MockRecordStore, Record, RecordKind, RecordSource};
    use crate::source::store::MemoryStore;
    use crate::source::LineReader;

    fn fixtures() -> (LimitsConfig, PreviewConfig, Metrics) {
        (
            LimitsConfig::default(),
            PreviewConfig::default(),
            Metrics::new(),
        )
    }

    #[test]
    fn text_and_line_fields_are_matched_differently() {
        let (limits, preview, metrics) = fixtures();
        let matcher = Matcher::new("foo", SearchMode::Literal, false).unwrap();
        let scanner = Scanner::new(&matcher, &limits, &preview, &metrics);

        let text = scanner
            .match_field(Field::text("content", "foo and FOO"))
            .unwrap()
            .unwrap();
        assert_eq!(text.occurrences, 2);
        assert!(text.lines.is_empty());

        let lines = scanner
            .match_field(Field {
                name: "a.php".into(),
                body: FieldBody::Lines(LineReader::Loaded("x\nfoo foo\n".into())),
            })
            .unwrap()
            .unwrap();
        assert_eq!(lines.occurrences, 2);
        assert_eq!(lines.lines.len(), 1);
        assert_eq!(lines.preview, "2: foo foo");
    }

    #[test]
    fn records_keep_field_order_and_totals() {
        let (limits, preview, metrics) = fixtures();
        let store = MemoryStore::from_records([Record::new(1, RecordKind::Post)
            .with_field("title", "cat")
            .with_field("content", "cat cat")
            .with_field("excerpt", "dog")]);
        let sources = vec![ContentSource::Records(RecordSource::new(
            store,
            RecordsConfig::default(),
        ))];
        let query = SearchQuery::new("cat").scope(["posts"]);
        let matcher = Matcher::compile(&query).unwrap();
        let scanner = Scanner::new(&matcher, &limits, &preview, &metrics);

        let (reports, warnings) = scanner.scan(&sources, &query.resolve_scope().unwrap());
        assert!(warnings.is_empty());
        let result = &reports[0].results[0];
        assert_eq!(result.field_names().collect::<Vec<_>>(), vec!["title", "content"]);
        assert_eq!(result.total_occurrences, 3);
        assert_eq!(result.title, "cat");
    }

    #[test]
    fn failing_source_becomes_a_warning() {
        let (limits, preview, metrics) = fixtures();
        let mut store = MockRecordStore::new();
        store
            .expect_list()
            .returning(|_, _| Err(RfsrError::Other("database is gone".into())));
        let sources = vec![ContentSource::Records(RecordSource::new(
            store,
            RecordsConfig::default(),
        ))];
        let query = SearchQuery::new("x").scope(["posts", "files"]);
        let matcher = Matcher::compile(&query).unwrap();
        let scanner = Scanner::new(&matcher, &limits, &preview, &metrics);

        let (reports, warnings) = scanner.scan(&sources, &query.resolve_scope().unwrap());
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().all(|r| r.results.is_empty()));
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("database is gone"));
        assert_eq!(warnings[1].kind, SourceKind::Files);
        assert_eq!(metrics.source_failures(SourceKind::Records), 1);
    }

    #[test]
    fn unreadable_items_are_skipped() {
        let (limits, preview, metrics) = fixtures();
        let mut store = MockRecordStore::new();
        store.expect_list().returning(|_, _| {
            Ok(vec![
                Record::new(1, RecordKind::Post).with_field("title", "x"),
                Record::new(2, RecordKind::Post).with_field("title", "x"),
            ])
        });
        store.expect_get().returning(|id| {
            if id == 1 {
                Err(RfsrError::Other("row locked".into()))
            } else {
                Ok(Some(Record::new(2, RecordKind::Post).with_field("title", "x")))
            }
        });
        let sources = vec![ContentSource::Records(RecordSource::new(
            store,
            RecordsConfig::default(),
        ))];
        let query = SearchQuery::new("x").scope(["posts"]);
        let matcher = Matcher::compile(&query).unwrap();
        let scanner = Scanner::new(&matcher, &limits, &preview, &metrics);

        let (reports, _) = scanner.scan(&sources, &query.resolve_scope().unwrap());
        assert_eq!(reports[0].scanned, 2);
        assert_eq!(reports[0].skipped, 1);
        assert_eq!(reports[0].matched, 1);
    }
}
