//! File source: template files under one or more named roots
use crate::config::{FilesConfig, RootConfig};
use crate::error::{Result, RfsrError};
use crate::source::backup::SharedLedger;
use crate::source::{Field, FieldBody, LineReader, Links};
use crate::walker::walk_dir;
use log::{debug, warn};
use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Component, Path, PathBuf};

const BINARY_CHECK_SIZE: usize = 8000;

/// Checks the first few kilobytes for NUL bytes.
pub fn is_binary(file: &Path) -> bool {
    if let Ok(mut file) = File::open(file) {
        let mut buffer = vec![0u8; BINARY_CHECK_SIZE];
        if let Ok(n) = file.read(&mut buffer) {
            return memchr::memchr(0, &buffer[..n]).is_some();
        }
    }
    false
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileCandidate {
    pub root: String,
    /// Path below the root, `/`-separated.
    pub relative: String,
    pub path: PathBuf,
    pub size: u64,
}

impl FileCandidate {
    pub fn file_name(&self) -> &str {
        self.relative.rsplit('/').next().unwrap_or(&self.relative)
    }
}

/// How a file's content will be read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadStrategy {
    Whole,
    Streaming,
    Skip,
}

pub struct FileSource {
    config: FilesConfig,
    backups: Option<SharedLedger>,
}

impl FileSource {
    pub fn new(config: FilesConfig) -> Result<Self> {
        if config.streaming_threshold >= config.max_file_size {
            return Err(RfsrError::Config(format!(
                "streaming threshold ({} bytes) must be below the maximum file size ({} bytes)",
                config.streaming_threshold, config.max_file_size
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for root in &config.roots {
            if root.name.is_empty() || root.name.contains(':') || !seen.insert(&root.name) {
                return Err(RfsrError::Config(format!(
                    "invalid or duplicate root name '{}'",
                    root.name
                )));
            }
        }
        Ok(Self {
            config,
            backups: None,
        })
    }

    /// Takes a copy of each file before its first rewrite.
    pub fn with_backups(mut self, ledger: SharedLedger) -> Self {
        self.backups = Some(ledger);
        self
    }

    pub fn roots(&self) -> &[RootConfig] {
        &self.config.roots
    }

    pub fn strategy(&self, size: u64) -> ReadStrategy {
        if size > self.config.max_file_size {
            ReadStrategy::Skip
        } else if size >= self.config.streaming_threshold {
            ReadStrategy::Streaming
        } else {
            ReadStrategy::Whole
        }
    }

    /// Files under every root, root by root, in file-name order.
    pub fn enumerate(&self, cap: usize) -> Result<impl Iterator<Item = FileCandidate> + '_> {
        let available: Vec<&RootConfig> = self
            .config
            .roots
            .iter()
            .filter(|root| {
                let ok = root.path.is_dir();
                if !ok {
                    warn!(
                        "File root '{}' is not a readable directory: {}",
                        root.name,
                        root.path.display()
                    );
                }
                ok
            })
            .collect();

        if available.is_empty() && !self.config.roots.is_empty() {
            return Err(RfsrError::SourceUnavailable {
                kind: crate::query::SourceKind::Files,
                reason: "no file root is readable".to_string(),
            });
        }

        Ok(available
            .into_iter()
            .flat_map(move |root| {
                walk_dir(
                    &root.path,
                    self.config.include_hidden,
                    &self.config.excluded_dirs,
                )
                .filter_map(move |entry| self.candidate(root, entry.path()))
            })
            .take(cap))
    }

    fn candidate(&self, root: &RootConfig, path: &Path) -> Option<FileCandidate> {
        let metadata = fs::symlink_metadata(path).ok()?;
        if metadata.file_type().is_symlink() {
            debug!("Skipping symbolic link {}", path.display());
            return None;
        }
        if !metadata.is_file() {
            return None;
        }
        let relative = relative_path(&root.path, path)?;
        if !self.accepts(&relative) {
            return None;
        }
        if metadata.len() > self.config.max_file_size {
            debug!(
                "Skipping {} ({} bytes exceeds the size limit)",
                path.display(),
                metadata.len()
            );
            return None;
        }
        Some(FileCandidate {
            root: root.name.clone(),
            relative,
            path: path.to_path_buf(),
            size: metadata.len(),
        })
    }

    /// Extension allow-list, backup suffixes, excluded directories and
    /// hidden components.
    fn accepts(&self, relative: &str) -> bool {
        let mut segments = relative.split('/').peekable();
        while let Some(segment) = segments.next() {
            let is_last = segments.peek().is_none();
            if segment.starts_with('.') && !self.config.include_hidden {
                return false;
            }
            if !is_last && self.config.excluded_dirs.iter().any(|d| d == segment) {
                return false;
            }
        }

        let file_name = relative.rsplit('/').next().unwrap_or(relative);
        let Some((_, extension)) = file_name.rsplit_once('.') else {
            return false;
        };
        let extension = extension.to_ascii_lowercase();
        if self
            .config
            .excluded_suffixes
            .iter()
            .any(|s| s.eq_ignore_ascii_case(&extension))
        {
            return false;
        }
        self.config
            .extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(&extension))
    }

    /// A single field named after the relative path. Large files are
    /// handed out as a buffered reader and never loaded whole.
    pub fn read_fields(&self, candidate: &FileCandidate) -> Result<Vec<Field>> {
        let size = fs::metadata(&candidate.path)?.len();
        let body = match self.strategy(size) {
            ReadStrategy::Skip => {
                debug!("Skipping {} ({} bytes)", candidate.path.display(), size);
                return Ok(Vec::new());
            }
            _ if self.config.skip_binary && is_binary(&candidate.path) => {
                debug!("Skipping binary file {}", candidate.path.display());
                return Ok(Vec::new());
            }
            ReadStrategy::Streaming => {
                LineReader::Streamed(BufReader::new(File::open(&candidate.path)?))
            }
            ReadStrategy::Whole => LineReader::Loaded(fs::read(&candidate.path)?),
        };
        Ok(vec![Field {
            name: candidate.relative.clone(),
            body: FieldBody::Lines(body),
        }])
    }

    /// Replaces the whole file content.
    pub fn write(&self, candidate: &FileCandidate, field: &str, text: &str) -> Result<()> {
        if field != candidate.relative {
            return Err(RfsrError::Other(format!(
                "file {} has no field '{field}'",
                candidate.relative
            )));
        }
        if let Some(ledger) = &self.backups {
            ledger
                .lock()
                .backup(&candidate.root, &candidate.relative, &candidate.path)?;
        }
        fs::write(&candidate.path, text)?;
        Ok(())
    }

    /// Resolves `root:path` back into a candidate, refusing anything the
    /// enumeration would not have produced. Links, and paths whose real
    /// location is outside the root, are rejected.
    pub fn locate(&self, root: &str, relative: &str) -> Result<FileCandidate> {
        let root_config = self
            .config
            .roots
            .iter()
            .find(|r| r.name == root)
            .ok_or_else(|| RfsrError::NotFound(format!("file root '{root}'")))?;

        let rel = Path::new(relative);
        if rel
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(RfsrError::PathRejected(rel.to_path_buf()));
        }
        let normalized = relative_path(Path::new(""), rel)
            .ok_or_else(|| RfsrError::PathRejected(rel.to_path_buf()))?;
        if !self.accepts(&normalized) {
            return Err(RfsrError::PathRejected(rel.to_path_buf()));
        }

        let path = root_config.path.join(rel);
        let not_found = || RfsrError::NotFound(format!("{root}:{normalized}"));
        let metadata = fs::symlink_metadata(&path).map_err(|_| not_found())?;
        if metadata.file_type().is_symlink() {
            return Err(RfsrError::PathRejected(path));
        }
        if !metadata.is_file() {
            return Err(not_found());
        }
        let canonical_root = fs::canonicalize(&root_config.path).map_err(|_| not_found())?;
        let canonical = fs::canonicalize(&path).map_err(|_| not_found())?;
        if !canonical.starts_with(&canonical_root) {
            warn!(
                "{} resolves outside root '{}' ({})",
                path.display(),
                root,
                canonical.display()
            );
            return Err(RfsrError::PathRejected(path));
        }
        Ok(FileCandidate {
            root: root.to_string(),
            relative: normalized,
            path,
            size: metadata.len(),
        })
    }

    pub fn links(&self, candidate: &FileCandidate) -> Links {
        Links {
            edit: self.config.edit_url.as_ref().map(|t| {
                t.replace("{root}", &candidate.root)
                    .replace("{path}", &candidate.relative)
            }),
            view: None,
        }
    }
}

/// `path` relative to `base` with `/` separators.
fn relative_path(base: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(base).ok()?;
    let parts: Option<Vec<&str>> = rel
        .components()
        .map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();
    let parts = parts?;
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_for(dir: &Path) -> FileSource {
        FileSource::new(FilesConfig {
            roots: vec![RootConfig {
                name: "theme".into(),
                path: dir.to_path_buf(),
            }],
            ..FilesConfig::default()
        })
        .unwrap()
    }

    fn touch(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn rejects_threshold_at_or_above_max() {
        let config = FilesConfig {
            streaming_threshold: 10,
            max_file_size: 10,
            ..FilesConfig::default()
        };
        assert!(matches!(FileSource::new(config), Err(RfsrError::Config(_))));
    }

    #[test]
    fn strategy_boundaries() {
        let source = FileSource::new(FilesConfig {
            streaming_threshold: 100,
            max_file_size: 200,
            ..FilesConfig::default()
        })
        .unwrap();
        assert_eq!(source.strategy(99), ReadStrategy::Whole);
        assert_eq!(source.strategy(100), ReadStrategy::Streaming);
        assert_eq!(source.strategy(200), ReadStrategy::Streaming);
        assert_eq!(source.strategy(201), ReadStrategy::Skip);
    }

    #[test]
    fn enumeration_filters_and_orders() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "b.php", "x");
        touch(dir.path(), "a.php", "x");
        touch(dir.path(), "notes.bak", "x");
        touch(dir.path(), "image.png", "x");
        touch(dir.path(), "node_modules/lib.js", "x");
        touch(dir.path(), ".hidden/secret.php", "x");
        touch(dir.path(), "parts/footer.php", "x");

        let source = source_for(dir.path());
        let found: Vec<String> = source
            .enumerate(usize::MAX)
            .unwrap()
            .map(|c| c.relative)
            .collect();
        assert_eq!(found, vec!["a.php", "b.php", "parts/footer.php"]);
    }

    #[test]
    fn missing_roots_make_the_source_unavailable() {
        let source = FileSource::new(FilesConfig {
            roots: vec![RootConfig {
                name: "theme".into(),
                path: PathBuf::from("/definitely/not/here"),
            }],
            ..FilesConfig::default()
        })
        .unwrap();
        assert!(matches!(
            source.enumerate(10).map(|it| it.count()),
            Err(RfsrError::SourceUnavailable { .. })
        ));
    }

    #[test]
    fn locate_refuses_escapes_and_filtered_paths() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "index.php", "x");
        touch(dir.path(), "vendor/lib.php", "x");
        let source = source_for(dir.path());

        assert!(source.locate("theme", "index.php").is_ok());
        assert!(matches!(
            source.locate("theme", "../index.php"),
            Err(RfsrError::PathRejected(_))
        ));
        assert!(matches!(
            source.locate("theme", "/etc/passwd"),
            Err(RfsrError::PathRejected(_))
        ));
        assert!(matches!(
            source.locate("theme", "vendor/lib.php"),
            Err(RfsrError::PathRejected(_))
        ));
        assert!(matches!(
            source.locate("plugins", "index.php"),
            Err(RfsrError::NotFound(_))
        ));
        assert!(matches!(
            source.locate("theme", "missing.php"),
            Err(RfsrError::NotFound(_))
        ));
    }

    #[test]
    fn binary_files_yield_no_fields() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("blob.php"), b"<?php \x00\x01\x02").unwrap();
        let source = source_for(dir.path());
        let candidate = source.locate("theme", "blob.php").unwrap();
        assert!(source.read_fields(&candidate).unwrap().is_empty());
    }

    #[test]
    fn write_checks_field_name() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "index.php", "old");
        let source = source_for(dir.path());
        let candidate = source.locate("theme", "index.php").unwrap();
        assert!(source.write(&candidate, "other.php", "new").is_err());
        source.write(&candidate, "index.php", "new").unwrap();
        assert_eq!(fs::read_to_string(dir.path().join("index.php")).unwrap(), "new");
    }

    #[cfg(unix)]
    #[test]
    fn links_are_neither_enumerated_nor_located() {
        use std::os::unix::fs::symlink;

        let dir = tempfile::tempdir().unwrap();
        let theme = dir.path().join("theme");
        let outside = dir.path().join("outside");
        touch(&theme, "index.php", "x");
        touch(&outside, "secret.php", "x");
        symlink(outside.join("secret.php"), theme.join("link.php")).unwrap();
        symlink(&outside, theme.join("shared")).unwrap();
        let source = source_for(&theme);

        let found: Vec<String> = source
            .enumerate(usize::MAX)
            .unwrap()
            .map(|c| c.relative)
            .collect();
        assert_eq!(found, vec!["index.php"]);

        assert!(matches!(
            source.locate("theme", "link.php"),
            Err(RfsrError::PathRejected(_))
        ));
        assert!(matches!(
            source.locate("theme", "shared/secret.php"),
            Err(RfsrError::PathRejected(_))
        ));
    }
}
