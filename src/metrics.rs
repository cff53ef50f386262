//! Prometheus counters for scans and replaces, labelled by source and outcome
use crate::query::SourceKind;
use crate::replace::ItemStatus;
use crate::scanner::SourceReport;
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::Arc;

const SOURCES: [SourceKind; 2] = [SourceKind::Records, SourceKind::Files];
const STAGES: [&str; 3] = ["scanned", "matched", "skipped"];
const STATUSES: [&str; 3] = ["changed", "unchanged", "failed"];

#[derive(Clone)]
pub struct Metrics {
    /// Containers per source and stage (`scanned`, `matched`, `skipped`).
    containers: IntCounterVec,
    occurrences_found: IntCounterVec,
    source_failures: IntCounterVec,
    /// Replace items per final status.
    replace_items: IntCounterVec,
    occurrences_replaced: IntCounter,
    registry: Arc<Registry>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn source_label(kind: SourceKind) -> &'static str {
    match kind {
        SourceKind::Records => "records",
        SourceKind::Files => "files",
    }
}

fn status_label(status: &ItemStatus) -> &'static str {
    match status {
        ItemStatus::Changed { .. } => "changed",
        ItemStatus::Unchanged => "unchanged",
        ItemStatus::Failed { .. } => "failed",
    }
}

fn counter_vec(name: &str, help: &str, labels: &[&str]) -> IntCounterVec {
    IntCounterVec::new(Opts::new(name, help).namespace("rfsr"), labels)
        .expect("metric names and labels are static and valid")
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        let containers = counter_vec(
            "containers_total",
            "Containers seen by searches",
            &["source", "stage"],
        );
        let occurrences_found = counter_vec(
            "occurrences_found_total",
            "Occurrences found by searches",
            &["source"],
        );
        let source_failures = counter_vec(
            "source_failures_total",
            "Searches in which a source could not be used at all",
            &["source"],
        );
        let replace_items = counter_vec(
            "replace_items_total",
            "Replace items by final status",
            &["status"],
        );
        let occurrences_replaced = IntCounter::with_opts(
            Opts::new("occurrences_replaced_total", "Occurrences rewritten").namespace("rfsr"),
        )
        .expect("metric names are static and valid");

        // Touch every label set so a run that never hits one still reports zero.
        for kind in SOURCES {
            let source = source_label(kind);
            for stage in STAGES {
                containers.with_label_values(&[source, stage]);
            }
            occurrences_found.with_label_values(&[source]);
            source_failures.with_label_values(&[source]);
        }
        for status in STATUSES {
            replace_items.with_label_values(&[status]);
        }

        registry.register(Box::new(containers.clone())).ok();
        registry.register(Box::new(occurrences_found.clone())).ok();
        registry.register(Box::new(source_failures.clone())).ok();
        registry.register(Box::new(replace_items.clone())).ok();
        registry.register(Box::new(occurrences_replaced.clone())).ok();

        Metrics {
            containers,
            occurrences_found,
            source_failures,
            replace_items,
            occurrences_replaced,
            registry: Arc::new(registry),
        }
    }

    /// Adds one finished source scan.
    pub fn record_scan(&self, report: &SourceReport) {
        let source = source_label(report.kind);
        for (stage, count) in [
            ("scanned", report.scanned),
            ("matched", report.matched),
            ("skipped", report.skipped),
        ] {
            self.containers
                .with_label_values(&[source, stage])
                .inc_by(count as u64);
        }
        self.occurrences_found
            .with_label_values(&[source])
            .inc_by(report.occurrences as u64);
    }

    pub fn record_source_failure(&self, kind: SourceKind) {
        self.source_failures
            .with_label_values(&[source_label(kind)])
            .inc();
    }

    /// Adds one attempted replace item.
    pub fn record_item(&self, status: &ItemStatus) {
        self.replace_items
            .with_label_values(&[status_label(status)])
            .inc();
        if let ItemStatus::Changed { occurrences, .. } = status {
            self.occurrences_replaced.inc_by(*occurrences as u64);
        }
    }

    pub fn containers(&self, kind: SourceKind, stage: &str) -> u64 {
        self.containers
            .with_label_values(&[source_label(kind), stage])
            .get()
    }

    pub fn source_failures(&self, kind: SourceKind) -> u64 {
        self.source_failures
            .with_label_values(&[source_label(kind)])
            .get()
    }

    pub fn replace_items(&self, status: &str) -> u64 {
        self.replace_items.with_label_values(&[status]).get()
    }

    pub fn occurrences_replaced(&self) -> u64 {
        self.occurrences_replaced.get()
    }

    /// Prometheus text exposition of every counter.
    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
