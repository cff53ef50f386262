//! Search query model and scope resolution
use crate::error::{Result, ValidationError};
use clap::ValueEnum;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// How the pattern text is interpreted.
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    #[default]
    Literal,
    Word,
    Regex,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchMode::Literal => write!(f, "literal"),
            SearchMode::Word => write!(f, "word"),
            SearchMode::Regex => write!(f, "regex"),
        }
    }
}

/// Variant tag of a content source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Records,
    Files,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Records => write!(f, "records"),
            SourceKind::Files => write!(f, "files"),
        }
    }
}

/// One selectable scope entry.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Posts,
    Pages,
    CustomType(String),
    Meta,
    Comments,
    Files,
}

impl Scope {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            Scope::Files => SourceKind::Files,
            _ => SourceKind::Records,
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "posts" | "post" => Ok(Scope::Posts),
            "pages" | "page" => Ok(Scope::Pages),
            "meta" | "custom_fields" => Ok(Scope::Meta),
            "comments" | "comment" => Ok(Scope::Comments),
            "files" | "theme" => Ok(Scope::Files),
            _ => match s.strip_prefix("cpt_") {
                Some(name) if !name.is_empty() => Ok(Scope::CustomType(name.to_string())),
                _ => Err(format!("unknown scope '{s}'")),
            },
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Posts => write!(f, "posts"),
            Scope::Pages => write!(f, "pages"),
            Scope::CustomType(name) => write!(f, "cpt_{name}"),
            Scope::Meta => write!(f, "meta"),
            Scope::Comments => write!(f, "comments"),
            Scope::Files => write!(f, "files"),
        }
    }
}

/// The validated subset of a query's scope.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResolvedScope {
    entries: BTreeSet<Scope>,
}

impl ResolvedScope {
    pub fn contains(&self, scope: &Scope) -> bool {
        self.entries.contains(scope)
    }

    pub fn selects(&self, kind: SourceKind) -> bool {
        self.entries.iter().any(|s| s.source_kind() == kind)
    }

    pub fn entries(&self) -> impl Iterator<Item = &Scope> {
        self.entries.iter()
    }

    pub fn record_scopes(&self) -> impl Iterator<Item = &Scope> {
        self.entries
            .iter()
            .filter(|s| s.source_kind() == SourceKind::Records)
    }
}

impl FromIterator<Scope> for ResolvedScope {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Pattern text, mode flags and scope as submitted by the caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub pattern: String,
    #[serde(default)]
    pub mode: SearchMode,
    #[serde(default)]
    pub case_sensitive: bool,
    pub scope: Vec<String>,
}

impl SearchQuery {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            mode: SearchMode::Literal,
            case_sensitive: false,
            scope: Vec::new(),
        }
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    pub fn scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope = scope.into_iter().map(Into::into).collect();
        self
    }

    /// Checks the query shape and resolves its scope.
    ///
    /// Unknown scope identifiers are dropped with a warning. The query is
    /// rejected when nothing known remains.
    pub fn resolve_scope(&self) -> Result<ResolvedScope> {
        if self.pattern.is_empty() {
            return Err(ValidationError::EmptyPattern.into());
        }
        if self.scope.iter().all(|s| s.trim().is_empty()) {
            return Err(ValidationError::EmptyScope.into());
        }

        let mut resolved = BTreeSet::new();
        for raw in self.scope.iter().filter(|s| !s.trim().is_empty()) {
            match raw.parse::<Scope>() {
                Ok(scope) => {
                    resolved.insert(scope);
                }
                Err(e) => warn!("Ignoring scope entry: {e}"),
            }
        }

        if resolved.is_empty() {
            return Err(ValidationError::NoKnownScope(self.scope.join(", ")).into());
        }
        Ok(ResolvedScope { entries: resolved })
    }
}
