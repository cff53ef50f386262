//! Best-effort replace across previously found containers
//!
//! Every item is re-read and re-matched before anything is written. A
//! failing item is recorded and the next one is attempted; nothing already
//! written is rolled back.
use crate::error::{Result, RfsrError};
use crate::matcher::{strip_terminator, Matcher};
use crate::metrics::Metrics;
use crate::query::{ResolvedScope, SourceKind};
use crate::scanner::{as_millis, MatchResult};
use crate::source::{CandidateRef, ContainerId, ContentSource, FieldBody};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// A container the caller wants rewritten.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceItem {
    pub source_kind: SourceKind,
    pub container_id: ContainerId,
    /// Fields selected by the caller. Empty means every field.
    #[serde(default)]
    pub fields: Vec<String>,
}

impl ReplaceItem {
    pub fn new(container_id: ContainerId) -> Self {
        Self {
            source_kind: container_id.source_kind(),
            container_id,
            fields: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }
}

impl From<&MatchResult> for ReplaceItem {
    fn from(result: &MatchResult) -> Self {
        Self {
            source_kind: result.source_kind,
            container_id: result.container_id.clone(),
            fields: result.field_names().map(str::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Changed {
        fields: Vec<String>,
        occurrences: usize,
    },
    /// Nothing matched on re-read; the content moved on since the search.
    Unchanged,
    Failed {
        reason: String,
        /// Fields written before the failure. They stay written.
        written: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemReport {
    pub container_id: ContainerId,
    #[serde(flatten)]
    pub status: ItemStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub container_id: ContainerId,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplaceOutcome {
    pub items_attempted: usize,
    pub items_changed: usize,
    pub items_unchanged: usize,
    pub failures: Vec<ItemFailure>,
    pub occurrences_replaced: usize,
    pub reports: Vec<ItemReport>,
    #[serde(rename = "elapsed_ms", serialize_with = "as_millis")]
    pub elapsed: Duration,
}

impl ReplaceOutcome {
    pub fn items_failed(&self) -> usize {
        self.failures.len()
    }

    /// Every attempted item is counted exactly once.
    pub fn is_consistent(&self) -> bool {
        self.items_changed + self.items_unchanged + self.items_failed() == self.items_attempted
    }

    fn record(&mut self, container_id: ContainerId, status: ItemStatus) {
        self.items_attempted += 1;
        match &status {
            ItemStatus::Changed { occurrences, .. } => {
                self.items_changed += 1;
                self.occurrences_replaced += occurrences;
            }
            ItemStatus::Unchanged => self.items_unchanged += 1,
            ItemStatus::Failed { reason, .. } => self.failures.push(ItemFailure {
                container_id: container_id.clone(),
                reason: reason.clone(),
            }),
        }
        self.reports.push(ItemReport {
            container_id,
            status,
        });
    }
}

/// Substrings that suggest a pattern touches links, markup or admin paths.
const SENSITIVE_MARKERS: &[&str] = &[
    "http", "www", "wp-", "admin", "login", "class=", "id=", "<div", "</div>", "<html",
    "</html>",
];

/// Something about a replace worth confirming before it runs. Never blocks it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum ReplaceWarning {
    /// The replacement is empty, so matched text is deleted.
    DeletesText,
    SensitivePattern { marker: String },
    /// The pattern matches the empty string and would insert text everywhere.
    MatchesEmpty,
}

impl fmt::Display for ReplaceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplaceWarning::DeletesText => {
                write!(f, "replacement is empty, matched text will be deleted")
            }
            ReplaceWarning::SensitivePattern { marker } => write!(
                f,
                "pattern contains '{marker}' and may affect critical content"
            ),
            ReplaceWarning::MatchesEmpty => {
                write!(f, "pattern matches empty text and would insert at every position")
            }
        }
    }
}

/// Checks a replace before it runs.
pub fn replace_warnings(
    pattern: &str,
    matcher: &Matcher,
    replacement: &str,
) -> Vec<ReplaceWarning> {
    let mut warnings = Vec::new();
    let lowered = pattern.to_lowercase();
    if let Some(marker) = SENSITIVE_MARKERS.iter().find(|m| lowered.contains(*m)) {
        warnings.push(ReplaceWarning::SensitivePattern {
            marker: marker.to_string(),
        });
    }
    if replacement.is_empty() {
        warnings.push(ReplaceWarning::DeletesText);
    }
    if matcher.contains("") {
        warnings.push(ReplaceWarning::MatchesEmpty);
    }
    warnings
}

/// Current and replaced text of one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldPreview {
    pub field: String,
    pub before: String,
    pub after: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreviewStatus {
    WouldChange { fields: Vec<FieldPreview> },
    Unchanged,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemPreview {
    pub container_id: ContainerId,
    #[serde(flatten)]
    pub status: PreviewStatus,
}

/// What a replace would do, computed without writing anything.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplacePreview {
    pub replacement: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<ReplaceWarning>,
    pub items: Vec<ItemPreview>,
}

impl ReplacePreview {
    pub fn items_changing(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.status, PreviewStatus::WouldChange { .. }))
            .count()
    }

    pub fn occurrences(&self) -> usize {
        self.items
            .iter()
            .map(|i| match &i.status {
                PreviewStatus::WouldChange { fields } => {
                    fields.iter().map(|f| f.occurrences).sum()
                }
                _ => 0,
            })
            .sum()
    }
}

struct PendingWrite {
    field: String,
    before: String,
    after: String,
    occurrences: usize,
}

pub struct ReplaceOrchestrator<'a> {
    sources: &'a [ContentSource],
    scope: &'a ResolvedScope,
    matcher: &'a Matcher,
    replacement: &'a str,
    metrics: &'a Metrics,
}

impl<'a> ReplaceOrchestrator<'a> {
    pub fn new(
        sources: &'a [ContentSource],
        scope: &'a ResolvedScope,
        matcher: &'a Matcher,
        replacement: &'a str,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            sources,
            scope,
            matcher,
            replacement,
            metrics,
        }
    }

    pub fn run(&self, items: &[ReplaceItem]) -> ReplaceOutcome {
        let start = Instant::now();
        let mut outcome = ReplaceOutcome::default();

        for item in items {
            let status = self.replace_item(item);
            match &status {
                ItemStatus::Changed {
                    fields,
                    occurrences,
                } => {
                    info!(
                        "Replaced {} occurrence(s) in {} ({})",
                        occurrences,
                        item.container_id,
                        fields.join(", ")
                    );
                }
                ItemStatus::Unchanged => {
                    debug!("No current match in {}, left unchanged", item.container_id);
                }
                ItemStatus::Failed { reason, .. } => {
                    warn!("Replace failed for {}: {}", item.container_id, reason);
                }
            }
            self.metrics.record_item(&status);
            outcome.record(item.container_id.clone(), status);
        }

        outcome.elapsed = start.elapsed();
        info!(
            "Replace finished: {} attempted, {} changed, {} unchanged, {} failed",
            outcome.items_attempted,
            outcome.items_changed,
            outcome.items_unchanged,
            outcome.items_failed()
        );
        outcome
    }

    /// Runs every item up to the write and reports the text it would produce.
    pub fn preview(&self, items: &[ReplaceItem]) -> Vec<ItemPreview> {
        items
            .iter()
            .map(|item| {
                let status = match self
                    .resolve(item)
                    .and_then(|(source, candidate)| self.prepare(source, &candidate, item))
                {
                    Ok(pending) if pending.is_empty() => PreviewStatus::Unchanged,
                    Ok(pending) => PreviewStatus::WouldChange {
                        fields: pending
                            .into_iter()
                            .map(|p| FieldPreview {
                                field: p.field,
                                before: p.before,
                                after: p.after,
                                occurrences: p.occurrences,
                            })
                            .collect(),
                    },
                    Err(e) => PreviewStatus::Failed {
                        reason: e.to_string(),
                    },
                };
                debug!("Previewed {}", item.container_id);
                ItemPreview {
                    container_id: item.container_id.clone(),
                    status,
                }
            })
            .collect()
    }

    fn replace_item(&self, item: &ReplaceItem) -> ItemStatus {
        let (source, candidate) = match self.resolve(item) {
            Ok(found) => found,
            Err(e) => {
                return ItemStatus::Failed {
                    reason: e.to_string(),
                    written: Vec::new(),
                }
            }
        };

        let pending = match self.prepare(source, &candidate, item) {
            Ok(pending) => pending,
            Err(e) => {
                return ItemStatus::Failed {
                    reason: e.to_string(),
                    written: Vec::new(),
                }
            }
        };
        if pending.is_empty() {
            return ItemStatus::Unchanged;
        }

        let mut written = Vec::with_capacity(pending.len());
        let mut occurrences = 0;
        for write in pending {
            if let Err(e) = source.write(&candidate, &write.field, &write.after) {
                let err = RfsrError::ItemWrite {
                    container: format!("{} ({})", item.container_id, write.field),
                    source: Box::new(e),
                };
                return ItemStatus::Failed {
                    reason: err.to_string(),
                    written,
                };
            }
            occurrences += write.occurrences;
            written.push(write.field);
        }

        ItemStatus::Changed {
            fields: written,
            occurrences,
        }
    }

    fn resolve(&self, item: &ReplaceItem) -> Result<(&'a ContentSource, CandidateRef)> {
        if item.container_id.source_kind() != item.source_kind {
            return Err(RfsrError::Other(format!(
                "{} is not a {} container",
                item.container_id, item.source_kind
            )));
        }
        if !self.scope.selects(item.source_kind) {
            return Err(RfsrError::NotFound(format!(
                "{} is outside the selected scope",
                item.container_id
            )));
        }
        let source = self
            .sources
            .iter()
            .find(|s| s.kind() == item.source_kind)
            .ok_or_else(|| RfsrError::SourceUnavailable {
                kind: item.source_kind,
                reason: "not configured".to_string(),
            })?;
        let candidate = source.locate(&item.container_id, self.scope)?;
        Ok((source, candidate))
    }

    /// Re-reads the container and computes new text for every field that
    /// still matches.
    fn prepare(
        &self,
        source: &ContentSource,
        candidate: &CandidateRef,
        item: &ReplaceItem,
    ) -> Result<Vec<PendingWrite>> {
        let mut pending = Vec::new();
        for field in source.read_fields(candidate)? {
            if !item.fields.is_empty() && !item.fields.iter().any(|f| *f == field.name) {
                continue;
            }
            let by_line = field.body.is_lines();
            let current = field.body.into_text()?;

            let (replaced, occurrences) = if by_line {
                let occurrences = current
                    .split_inclusive('\n')
                    .map(|l| self.matcher.count_matches(strip_terminator(l).0))
                    .sum();
                (self.matcher.replace_by_line(&current, self.replacement), occurrences)
            } else {
                (
                    self.matcher.replace_all(&current, self.replacement),
                    self.matcher.count_matches(&current),
                )
            };

            if occurrences == 0 || replaced == current {
                continue;
            }
            let after = replaced.into_owned();
            pending.push(PendingWrite {
                field: field.name,
                before: current,
                after,
                occurrences,
            });
        }
        Ok(pending)
    }
}
