//! Content sources: where searchable text lives and how it is written back
//!
//! The set of sources is closed. [`ContentSource`] is a tagged enum and every
//! operation dispatches on the tag.
pub mod backup;
pub mod files;
pub mod records;
pub mod store;

use crate::error::{Result, RfsrError};
use crate::matcher::strip_terminator;
use crate::query::{ResolvedScope, SourceKind};
use files::{FileCandidate, FileSource};
use records::{RecordCandidate, RecordSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::str::FromStr;

/// Source-defined identity of a container, stable across search and replace.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContainerId {
    Record { id: u64 },
    File { root: String, path: String },
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContainerId::Record { id } => write!(f, "#{id}"),
            ContainerId::File { root, path } => write!(f, "{root}:{path}"),
        }
    }
}

impl FromStr for ContainerId {
    type Err = String;

    /// Parses the display form: `#42` for records, `root:relative/path` for files.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if let Some(id) = s.strip_prefix('#') {
            return id
                .parse()
                .map(|id| ContainerId::Record { id })
                .map_err(|_| format!("invalid record id '{s}'"));
        }
        match s.split_once(':') {
            Some((root, path)) if !root.is_empty() && !path.is_empty() => Ok(ContainerId::File {
                root: root.to_string(),
                path: path.to_string(),
            }),
            _ => Err(format!("invalid container id '{s}'")),
        }
    }
}

impl ContainerId {
    pub fn source_kind(&self) -> SourceKind {
        match self {
            ContainerId::Record { .. } => SourceKind::Records,
            ContainerId::File { .. } => SourceKind::Files,
        }
    }
}

/// Navigation links a source can offer for a container.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view: Option<String>,
}

impl Links {
    pub fn is_empty(&self) -> bool {
        self.edit.is_none() && self.view.is_none()
    }
}

/// One enumerated container, not yet read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CandidateRef {
    Record(RecordCandidate),
    File(FileCandidate),
}

impl CandidateRef {
    pub fn container_id(&self) -> ContainerId {
        match self {
            CandidateRef::Record(r) => ContainerId::Record { id: r.id },
            CandidateRef::File(f) => ContainerId::File {
                root: f.root.clone(),
                path: f.relative.clone(),
            },
        }
    }

    pub fn title(&self) -> String {
        match self {
            CandidateRef::Record(r) => r.title.clone(),
            CandidateRef::File(f) => f.file_name().to_string(),
        }
    }
}

/// Text of one field as handed out by a source.
pub enum FieldBody {
    /// Free text matched as a whole.
    Text(String),
    /// Line-oriented text; matched one line at a time.
    Lines(LineReader),
}

pub enum LineReader {
    /// Raw bytes of a file read in one piece.
    Loaded(Vec<u8>),
    Streamed(BufReader<File>),
}

impl LineReader {
    /// Calls `f` with each 1-based line number and the line without its
    /// terminator. Invalid UTF-8 is replaced lossily on both paths.
    pub fn for_each_line<F>(self, mut f: F) -> io::Result<()>
    where
        F: FnMut(usize, &str),
    {
        match self {
            LineReader::Loaded(bytes) => {
                for (i, line) in bytes.split_inclusive(|b| *b == b'\n').enumerate() {
                    let line = String::from_utf8_lossy(line);
                    f(i + 1, strip_terminator(&line).0);
                }
            }
            LineReader::Streamed(mut reader) => {
                let mut buf = Vec::with_capacity(8192);
                let mut line_number = 0;
                loop {
                    buf.clear();
                    if reader.read_until(b'\n', &mut buf)? == 0 {
                        break;
                    }
                    line_number += 1;
                    let line = String::from_utf8_lossy(&buf);
                    f(line_number, strip_terminator(&line).0);
                }
            }
        }
        Ok(())
    }
}

impl FieldBody {
    pub fn is_lines(&self) -> bool {
        matches!(self, FieldBody::Lines(_))
    }

    /// Full current text, for rewriting. Line content must be valid UTF-8
    /// whichever way it was read.
    pub fn into_text(self) -> io::Result<String> {
        match self {
            FieldBody::Text(text) => Ok(text),
            FieldBody::Lines(LineReader::Loaded(bytes)) => String::from_utf8(bytes)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e)),
            FieldBody::Lines(LineReader::Streamed(mut reader)) => {
                let mut text = String::new();
                io::Read::read_to_string(&mut reader, &mut text)?;
                Ok(text)
            }
        }
    }
}

pub struct Field {
    pub name: String,
    pub body: FieldBody,
}

impl Field {
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            body: FieldBody::Text(text.into()),
        }
    }
}

pub enum ContentSource {
    Records(RecordSource),
    Files(FileSource),
}

impl ContentSource {
    pub fn kind(&self) -> SourceKind {
        match self {
            ContentSource::Records(_) => SourceKind::Records,
            ContentSource::Files(_) => SourceKind::Files,
        }
    }

    /// Candidates in scope, in a stable order, at most `cap` of them.
    pub fn enumerate<'a>(
        &'a self,
        scope: &ResolvedScope,
        cap: usize,
    ) -> Result<Box<dyn Iterator<Item = CandidateRef> + 'a>> {
        match self {
            ContentSource::Records(source) => Ok(Box::new(
                source.enumerate(scope, cap)?.map(CandidateRef::Record),
            )),
            ContentSource::Files(source) => Ok(Box::new(
                source.enumerate(cap)?.map(CandidateRef::File),
            )),
        }
    }

    pub fn read_fields(&self, candidate: &CandidateRef) -> Result<Vec<Field>> {
        match (self, candidate) {
            (ContentSource::Records(source), CandidateRef::Record(c)) => source.read_fields(c),
            (ContentSource::Files(source), CandidateRef::File(c)) => source.read_fields(c),
            _ => Err(self.foreign(candidate)),
        }
    }

    pub fn write(&self, candidate: &CandidateRef, field: &str, text: &str) -> Result<()> {
        match (self, candidate) {
            (ContentSource::Records(source), CandidateRef::Record(c)) => {
                source.write(c, field, text)
            }
            (ContentSource::Files(source), CandidateRef::File(c)) => source.write(c, field, text),
            _ => Err(self.foreign(candidate)),
        }
    }

    /// Resolves a caller-submitted id. Ids this source would never have
    /// produced for `scope` are rejected.
    pub fn locate(&self, id: &ContainerId, scope: &ResolvedScope) -> Result<CandidateRef> {
        match (self, id) {
            (ContentSource::Records(source), ContainerId::Record { id }) => {
                source.locate(*id, scope).map(CandidateRef::Record)
            }
            (ContentSource::Files(source), ContainerId::File { root, path }) => {
                source.locate(root, path).map(CandidateRef::File)
            }
            _ => Err(RfsrError::NotFound(format!(
                "{id} does not belong to the {} source",
                self.kind()
            ))),
        }
    }

    pub fn links(&self, candidate: &CandidateRef) -> Option<Links> {
        let links = match (self, candidate) {
            (ContentSource::Records(source), CandidateRef::Record(c)) => source.links(c.id),
            (ContentSource::Files(source), CandidateRef::File(c)) => source.links(c),
            _ => return None,
        };
        (!links.is_empty()).then_some(links)
    }

    fn foreign(&self, candidate: &CandidateRef) -> RfsrError {
        RfsrError::Other(format!(
            "candidate {} does not belong to the {} source",
            candidate.container_id(),
            self.kind()
        ))
    }
}
