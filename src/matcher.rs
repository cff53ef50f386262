//! Pattern compiler: turns a query into a reusable matcher
//!
//! Four behaviours are supported:
//!
//! * literal, case-sensitive: byte-exact substring search via `memchr::memmem`
//! * literal, case-insensitive: Unicode case folding through an escaped regex
//! * whole word: escaped literal bounded by `\b` on both sides
//! * regex: the caller's pattern is used verbatim. Metacharacters are live,
//!   so `a.c` matches `abc`. This is the power-user mode and is intentional.
//!
//! All offsets are byte offsets into UTF-8 text and always fall on char
//! boundaries.
use crate::error::{Result, ValidationError};
use crate::query::{SearchMode, SearchQuery};
use memchr::memmem;
use regex::{NoExpand, Regex, RegexBuilder};
use std::borrow::Cow;

enum Engine {
    Exact {
        finder: memmem::Finder<'static>,
        needle: String,
    },
    Pattern(Regex),
}

/// Compiled, immutable form of a [`SearchQuery`].
pub struct Matcher {
    mode: SearchMode,
    case_sensitive: bool,
    engine: Engine,
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("mode", &self.mode)
            .field("case_sensitive", &self.case_sensitive)
            .field("pattern", &self.pattern_source())
            .finish()
    }
}

impl Matcher {
    /// Compiles the query. Fails before any I/O on an empty pattern or an
    /// invalid regular expression.
    pub fn compile(query: &SearchQuery) -> Result<Self> {
        Self::new(&query.pattern, query.mode, query.case_sensitive)
    }

    pub fn new(pattern: &str, mode: SearchMode, case_sensitive: bool) -> Result<Self> {
        if pattern.is_empty() {
            return Err(ValidationError::EmptyPattern.into());
        }

        let engine = match (mode, case_sensitive) {
            (SearchMode::Literal, true) => Engine::Exact {
                finder: memmem::Finder::new(pattern.as_bytes()).into_owned(),
                needle: pattern.to_string(),
            },
            (SearchMode::Literal, false) => Engine::Pattern(build(&regex::escape(pattern), false)?),
            (SearchMode::Word, _) => Engine::Pattern(build(
                &format!(r"\b{}\b", regex::escape(pattern)),
                case_sensitive,
            )?),
            (SearchMode::Regex, _) => Engine::Pattern(build(pattern, case_sensitive)?),
        };

        Ok(Self {
            mode,
            case_sensitive,
            engine,
        })
    }

    pub fn mode(&self) -> SearchMode {
        self.mode
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    fn pattern_source(&self) -> &str {
        match &self.engine {
            Engine::Exact { needle, .. } => needle,
            Engine::Pattern(re) => re.as_str(),
        }
    }

    pub fn contains(&self, text: &str) -> bool {
        match &self.engine {
            Engine::Exact { finder, .. } => finder.find(text.as_bytes()).is_some(),
            Engine::Pattern(re) => re.is_match(text),
        }
    }

    /// Number of non-overlapping occurrences.
    pub fn count_matches(&self, text: &str) -> usize {
        self.find_offsets(text).count()
    }

    /// Lazily yields `(offset, length)` pairs in ascending order.
    pub fn find_offsets<'m, 't>(&'m self, text: &'t str) -> Offsets<'m, 't> {
        match &self.engine {
            Engine::Exact { finder, needle } => Offsets::Exact {
                inner: finder.find_iter(text.as_bytes()),
                len: needle.len(),
            },
            Engine::Pattern(re) => Offsets::Pattern(re.find_iter(text)),
        }
    }

    /// Offset of the first occurrence, if any.
    pub fn first_offset(&self, text: &str) -> Option<usize> {
        self.find_offsets(text).next().map(|(start, _)| start)
    }

    /// Substitutes every occurrence.
    ///
    /// Literal and whole-word replacements are inserted verbatim. In regex
    /// mode the replacement is handed to the regex engine unchanged, so
    /// `$1` and `${name}` expand to capture groups.
    pub fn replace_all<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        match &self.engine {
            Engine::Exact { finder, needle } => {
                if finder.find(text.as_bytes()).is_some() {
                    Cow::Owned(text.replace(needle.as_str(), replacement))
                } else {
                    Cow::Borrowed(text)
                }
            }
            Engine::Pattern(re) if self.mode == SearchMode::Regex => re.replace_all(text, replacement),
            Engine::Pattern(re) => re.replace_all(text, NoExpand(replacement)),
        }
    }

    /// Substitutes line by line, leaving line terminators untouched.
    ///
    /// File scans match one line at a time, so file replaces do the same;
    /// a pattern can never reach across a newline in either direction.
    pub fn replace_by_line<'t>(&self, text: &'t str, replacement: &str) -> Cow<'t, str> {
        if !text.split_inclusive('\n').any(|l| self.contains(strip_terminator(l).0)) {
            return Cow::Borrowed(text);
        }

        let mut out = String::with_capacity(text.len());
        for line in text.split_inclusive('\n') {
            let (content, terminator) = strip_terminator(line);
            out.push_str(&self.replace_all(content, replacement));
            out.push_str(terminator);
        }
        Cow::Owned(out)
    }
}

fn build(pattern: &str, case_sensitive: bool) -> Result<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(!case_sensitive)
        .unicode(true)
        .build()
        .map_err(|e| ValidationError::InvalidRegex(e).into())
}

/// Splits a line into its content and its `\n` or `\r\n` terminator.
pub fn strip_terminator(line: &str) -> (&str, &str) {
    if let Some(content) = line.strip_suffix("\r\n") {
        (content, "\r\n")
    } else if let Some(content) = line.strip_suffix('\n') {
        (content, "\n")
    } else {
        (line, "")
    }
}

/// Iterator returned by [`Matcher::find_offsets`].
pub enum Offsets<'m, 't> {
    Exact {
        inner: memmem::FindIter<'t, 'm>,
        len: usize,
    },
    Pattern(regex::Matches<'m, 't>),
}

impl Iterator for Offsets<'_, '_> {
    type Item = (usize, usize);

    fn next(&mut self) -> Option<Self::Item> {
        match self {
            Offsets::Exact { inner, len } => inner.next().map(|start| (start, *len)),
            Offsets::Pattern(inner) => inner.next().map(|m| (m.start(), m.len())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RfsrError;

    fn matcher(pattern: &str, mode: SearchMode, case_sensitive: bool) -> Matcher {
        Matcher::new(pattern, mode, case_sensitive).unwrap()
    }

    #[test]
    fn literal_counts_respect_case() {
        assert_eq!(matcher("a", SearchMode::Literal, false).count_matches("AAaa"), 4);
        assert_eq!(matcher("a", SearchMode::Literal, true).count_matches("AAaa"), 2);
    }

    #[test]
    fn literal_counts_do_not_overlap() {
        assert_eq!(matcher("aa", SearchMode::Literal, true).count_matches("aaaa"), 2);
        assert_eq!(matcher("AA", SearchMode::Literal, false).count_matches("aaaaa"), 2);
    }

    #[test]
    fn literal_escapes_metacharacters() {
        let m = matcher("a.c", SearchMode::Literal, false);
        assert!(!m.contains("abc"));
        assert!(m.contains("xa.cx"));
    }

    #[test]
    fn whole_word_respects_boundaries() {
        let m = matcher("cat", SearchMode::Word, false);
        assert!(!m.contains("category"));
        assert!(m.contains("the cat sat"));
        assert!(m.contains("The CAT sat"));
        assert!(!matcher("cat", SearchMode::Word, true).contains("The CAT sat"));
    }

    #[test]
    fn regex_is_raw() {
        let m = matcher("a.c", SearchMode::Regex, true);
        assert!(m.contains("abc"));
        assert!(!m.contains("ABC"));
        assert!(matcher("a.c", SearchMode::Regex, false).contains("ABC"));
    }

    #[test]
    fn invalid_regex_is_a_validation_error() {
        let err = Matcher::new("(unclosed", SearchMode::Regex, false).unwrap_err();
        assert!(matches!(
            err,
            RfsrError::Validation(ValidationError::InvalidRegex(_))
        ));
    }

    #[test]
    fn offsets_are_char_boundaries() {
        let text = "héllo wörld, hÉllo";
        let m = matcher("héllo", SearchMode::Literal, false);
        let offsets: Vec<_> = m.find_offsets(text).collect();
        assert_eq!(offsets.len(), 2);
        for (start, len) in offsets {
            assert!(text.is_char_boundary(start));
            assert!(text.is_char_boundary(start + len));
        }
    }

    #[test]
    fn exact_offsets_report_needle_length() {
        let m = matcher("ö", SearchMode::Literal, true);
        let offsets: Vec<_> = m.find_offsets("aöbö").collect();
        assert_eq!(offsets, vec![(1, 2), (4, 2)]);
    }

    #[test]
    fn replacement_expansion_depends_on_mode() {
        let literal = matcher("cat", SearchMode::Literal, false);
        assert_eq!(literal.replace_all("Cat cat", "$1 dog"), "$1 dog $1 dog");

        let regex = matcher(r"(\w+)@example", SearchMode::Regex, true);
        assert_eq!(regex.replace_all("bob@example", "$1@test"), "bob@test");
    }

    #[test]
    fn replace_without_match_borrows() {
        let m = matcher("zzz", SearchMode::Literal, true);
        assert!(matches!(m.replace_all("abc", "y"), Cow::Borrowed(_)));
        assert!(matches!(m.replace_by_line("abc\n", "y"), Cow::Borrowed(_)));
    }

    #[test]
    fn replace_by_line_keeps_terminators() {
        let m = matcher("foo$", SearchMode::Regex, true);
        let out = m.replace_by_line("a foo\r\nfoo b\nfoo", "bar");
        assert_eq!(out, "a bar\r\nfoo b\nbar");
    }
}
