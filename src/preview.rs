//! Display-only excerpts around matches
//!
//! Previews are never written back. The replace path always re-reads the
//! source, so nothing here needs to be exact beyond being readable.
use crate::config::PreviewConfig;
use crate::matcher::Matcher;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

const ELLIPSIS: &str = "...";

/// Bounded excerpt of a record field around its first match.
pub fn field_window(text: &str, matcher: &Matcher, config: &PreviewConfig) -> String {
    let total_chars = text.chars().count();
    if total_chars <= config.whole_below {
        return text.to_string();
    }

    let width = config.half_width * 2;
    let Some(first) = matcher.first_offset(text) else {
        let head: String = text.chars().take(width).collect();
        return format!("{head}{ELLIPSIS}");
    };

    let match_char = text[..first].chars().count();
    let start = match_char.saturating_sub(config.half_width);
    let end = (start + width).min(total_chars);

    let mut preview = String::with_capacity(width + 2 * ELLIPSIS.len());
    if start > 0 {
        preview.push_str(ELLIPSIS);
    }
    preview.extend(text.chars().skip(start).take(end - start));
    if end < total_chars {
        preview.push_str(ELLIPSIS);
    }
    preview
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextLine {
    pub line_number: usize,
    pub content: String,
}

/// A matching file line with its surrounding lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinePreview {
    pub line_number: usize,
    pub content: String,
    pub occurrences: usize,
    pub context_before: Vec<ContextLine>,
    pub context_after: Vec<ContextLine>,
}

/// Result of feeding every line of a file through a [`LineCollector`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineScan {
    pub occurrences: usize,
    pub matched_lines: usize,
    pub previews: Vec<LinePreview>,
}

/// Builds line previews in a single forward pass.
///
/// After-context is filled as later lines arrive, so the collector works
/// the same whether lines come from a loaded string or a buffered reader.
pub struct LineCollector {
    context_lines: usize,
    max_previews: usize,
    recent: VecDeque<ContextLine>,
    open: VecDeque<usize>,
    scan: LineScan,
}

impl LineCollector {
    pub fn new(context_lines: usize, max_previews: usize) -> Self {
        Self {
            context_lines,
            max_previews,
            recent: VecDeque::with_capacity(context_lines + 1),
            open: VecDeque::new(),
            scan: LineScan::default(),
        }
    }

    pub fn from_config(config: &PreviewConfig) -> Self {
        Self::new(config.context_lines, config.max_line_previews)
    }

    /// Records one line. `hits` is the number of matches on it.
    pub fn push(&mut self, line_number: usize, line: &str, hits: usize) {
        let content = line.trim();

        if !self.open.is_empty() {
            let previews = &mut self.scan.previews;
            for &idx in &self.open {
                previews[idx].context_after.push(ContextLine {
                    line_number,
                    content: content.to_string(),
                });
            }
            let wanted = self.context_lines;
            self.open
                .retain(|&idx| previews[idx].context_after.len() < wanted);
        }

        if hits > 0 {
            self.scan.occurrences += hits;
            self.scan.matched_lines += 1;
            if self.scan.previews.len() < self.max_previews {
                self.scan.previews.push(LinePreview {
                    line_number,
                    content: content.to_string(),
                    occurrences: hits,
                    context_before: self.recent.iter().cloned().collect(),
                    context_after: Vec::new(),
                });
                if self.context_lines > 0 {
                    self.open.push_back(self.scan.previews.len() - 1);
                }
            }
        }

        if self.context_lines > 0 {
            if self.recent.len() == self.context_lines {
                self.recent.pop_front();
            }
            self.recent.push_back(ContextLine {
                line_number,
                content: content.to_string(),
            });
        }
    }

    pub fn finish(self) -> LineScan {
        self.scan
    }
}
