use ignore::{DirEntry, WalkBuilder};
use log::warn;
use std::ffi::OsStr;
use std::path::Path;

/// Walks `path` in file-name order, pruning excluded directory names.
///
/// Ignore files are not consulted: template trees often ignore the very
/// files one wants to edit.
pub fn walk_dir(
    path: &Path,
    show_hidden: bool,
    excluded_dirs: &[String],
) -> impl Iterator<Item = DirEntry> {
    let excluded = excluded_dirs.to_vec();
    WalkBuilder::new(path)
        .hidden(!show_hidden)
        .git_global(false)
        .git_ignore(false)
        .git_exclude(false)
        .ignore(false)
        .parents(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            !(is_dir
                && entry.depth() > 0
                && excluded
                    .iter()
                    .any(|name| entry.file_name() == OsStr::new(name)))
        })
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                None
            }
        })
}
