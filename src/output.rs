use crate::engine::SearchReport;
use crate::error::Result;
use crate::replace::{
    FieldPreview, ItemStatus, PreviewStatus, ReplaceOutcome, ReplacePreview,
};
use crate::scanner::{FieldMatch, MatchResult};
use clap::ValueEnum;
use colored::Colorize;
use std::fmt::Write;

/// Output format types
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Renders search reports and replace outcomes
pub struct OutputFormatter {
    format: OutputFormat,
    include_context: bool,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            include_context: true,
        }
    }

    pub fn with_context(mut self, include: bool) -> Self {
        self.include_context = include;
        self
    }

    pub fn format_report(&self, report: &SearchReport) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(self.report_text(report)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(report)?),
        }
    }

    pub fn format_outcome(&self, outcome: &ReplaceOutcome) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(outcome_text(outcome)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(outcome)?),
        }
    }

    pub fn format_preview(&self, preview: &ReplacePreview) -> Result<String> {
        match self.format {
            OutputFormat::Text => Ok(preview_text(preview)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(preview)?),
        }
    }

    fn report_text(&self, report: &SearchReport) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} '{}' ({} mode, case {})",
            "Search:".bold(),
            report.pattern,
            report.mode,
            if report.case_sensitive {
                "sensitive"
            } else {
                "insensitive"
            }
        );

        for warning in &report.warnings {
            let _ = writeln!(
                out,
                "{} {}: {}",
                "warning:".yellow().bold(),
                warning.kind,
                warning.message
            );
        }

        for source in &report.sources {
            let _ = writeln!(
                out,
                "\n{} {} scanned, {} matching, {} skipped{}",
                format!("[{}]", source.kind).cyan().bold(),
                source.scanned,
                source.matched,
                source.skipped,
                if source.truncated {
                    " (limit reached, more exist)".yellow().to_string()
                } else {
                    String::new()
                }
            );
            for result in &source.results {
                self.result_text(&mut out, result);
            }
        }

        if report.total_containers == 0 {
            let _ = writeln!(out, "\n{}", "No matches found".yellow());
        } else {
            let _ = writeln!(
                out,
                "\n{} {} occurrence(s) in {} container(s) ({}ms)",
                "Found".green(),
                report.total_occurrences,
                report.total_containers,
                report.elapsed.as_millis()
            );
        }
        out
    }

    fn result_text(&self, out: &mut String, result: &MatchResult) {
        let _ = writeln!(
            out,
            "{} {} ({} occurrence(s))",
            result.container_id.to_string().green(),
            result.title.bold(),
            result.total_occurrences
        );
        if let Some(links) = &result.links {
            if let Some(edit) = &links.edit {
                let _ = writeln!(out, "  edit: {edit}");
            }
            if let Some(view) = &links.view {
                let _ = writeln!(out, "  view: {view}");
            }
        }
        for field in &result.fields {
            self.field_text(out, field);
        }
    }

    fn field_text(&self, out: &mut String, field: &FieldMatch) {
        let _ = writeln!(
            out,
            "  {} ({})",
            field.field.as_str().cyan(),
            field.occurrences
        );
        if field.lines.is_empty() {
            let _ = writeln!(out, "    {}", field.preview);
            return;
        }
        for line in &field.lines {
            if self.include_context {
                for ctx in &line.context_before {
                    let _ = writeln!(out, "      {} │ {}", ctx.line_number, ctx.content);
                }
            }
            let _ = writeln!(
                out,
                "    {} {} │ {}",
                "→".green(),
                line.line_number,
                line.content
            );
            if self.include_context {
                for ctx in &line.context_after {
                    let _ = writeln!(out, "      {} │ {}", ctx.line_number, ctx.content);
                }
            }
        }
    }
}

fn outcome_text(outcome: &ReplaceOutcome) -> String {
    let mut out = String::new();
    for report in &outcome.reports {
        match &report.status {
            ItemStatus::Changed {
                fields,
                occurrences,
            } => {
                let _ = writeln!(
                    out,
                    "{} {} ({} occurrence(s) in {})",
                    "changed".green(),
                    report.container_id,
                    occurrences,
                    fields.join(", ")
                );
            }
            ItemStatus::Unchanged => {
                let _ = writeln!(
                    out,
                    "{} {} (no longer matches)",
                    "unchanged".yellow(),
                    report.container_id
                );
            }
            ItemStatus::Failed { reason, written } => {
                let _ = writeln!(
                    out,
                    "{} {}: {}",
                    "failed".red().bold(),
                    report.container_id,
                    reason
                );
                if !written.is_empty() {
                    let _ = writeln!(out, "  already written: {}", written.join(", "));
                }
            }
        }
    }
    let _ = writeln!(
        out,
        "\n{}: {} attempted, {} changed, {} unchanged, {} failed, {} occurrence(s) replaced",
        "Summary".bold(),
        outcome.items_attempted,
        outcome.items_changed,
        outcome.items_unchanged,
        outcome.items_failed(),
        outcome.occurrences_replaced
    );
    out
}

fn preview_text(preview: &ReplacePreview) -> String {
    let mut out = String::new();
    for warning in &preview.warnings {
        let _ = writeln!(out, "{} {}", "warning:".yellow().bold(), warning);
    }
    for item in &preview.items {
        match &item.status {
            PreviewStatus::WouldChange { fields } => {
                let _ = writeln!(out, "{} {}", "would change".green(), item.container_id);
                for field in fields {
                    field_diff_text(&mut out, field);
                }
            }
            PreviewStatus::Unchanged => {
                let _ = writeln!(
                    out,
                    "{} {} (no longer matches)",
                    "unchanged".yellow(),
                    item.container_id
                );
            }
            PreviewStatus::Failed { reason } => {
                let _ = writeln!(
                    out,
                    "{} {}: {}",
                    "would fail".red().bold(),
                    item.container_id,
                    reason
                );
            }
        }
    }
    let _ = writeln!(
        out,
        "\n{} {} item(s) would change, {} occurrence(s) replaced by '{}', nothing was written",
        "Dry run:".yellow().bold(),
        preview.items_changing(),
        preview.occurrences(),
        preview.replacement
    );
    out
}

/// Changed lines only when the line count is kept, the whole text otherwise.
fn field_diff_text(out: &mut String, field: &FieldPreview) {
    let _ = writeln!(
        out,
        "  {} ({})",
        field.field.as_str().cyan(),
        field.occurrences
    );
    if field.before.lines().count() != field.after.lines().count() {
        let _ = writeln!(out, "    {} {}", "-".red(), field.before);
        let _ = writeln!(out, "    {} {}", "+".green(), field.after);
        return;
    }
    for (i, (before, after)) in field.before.lines().zip(field.after.lines()).enumerate() {
        if before != after {
            let _ = writeln!(out, "    {} {} │ {}", "-".red(), i + 1, before);
            let _ = writeln!(out, "    {} {} │ {}", "+".green(), i + 1, after);
        }
    }
}
