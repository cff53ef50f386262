//! Copies of files taken before they are rewritten
use chrono::Local;
use log::info;
use parking_lot::Mutex;
use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupRecord {
    pub root: String,
    pub relative: String,
    pub original: PathBuf,
    pub backup: PathBuf,
    pub created_at: String,
}

/// Backups taken during one session, owned by the caller.
///
/// Each file is copied at most once per ledger so the copy always holds the
/// content from before the first rewrite.
#[derive(Debug)]
pub struct BackupLedger {
    dir: PathBuf,
    records: Vec<BackupRecord>,
}

pub type SharedLedger = Arc<Mutex<BackupLedger>>;

impl BackupLedger {
    /// A ledger writing into a timestamped directory below `base`.
    pub fn new(base: &Path) -> Self {
        let session = Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::with_dir(base.join(session))
    }

    pub fn with_dir(dir: PathBuf) -> Self {
        Self {
            dir,
            records: Vec::new(),
        }
    }

    pub fn shared(self) -> SharedLedger {
        Arc::new(Mutex::new(self))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn records(&self) -> &[BackupRecord] {
        &self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copies `original` unless this ledger already holds a copy of it.
    pub fn backup(&mut self, root: &str, relative: &str, original: &Path) -> io::Result<PathBuf> {
        if let Some(existing) = self
            .records
            .iter()
            .find(|r| r.root == root && r.relative == relative)
        {
            return Ok(existing.backup.clone());
        }

        let target = self.dir.join(root).join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(original, &target)?;
        info!("Backed up {} to {}", original.display(), target.display());

        self.records.push(BackupRecord {
            root: root.to_string(),
            relative: relative.to_string(),
            original: original.to_path_buf(),
            backup: target.clone(),
            created_at: Local::now().to_rfc3339(),
        });
        Ok(target)
    }
}
