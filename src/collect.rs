//! Publication list assembly.
//!
//! The proxy config needs one flat list of everything served from disk:
//! every release of every group plus the rendered artifacts. [`Entry`] lets
//! callers hand over that mix in whatever nesting they have, and [`collect`]
//! flattens it, keeping the first entry seen for each url.

use crate::group::Group;
use crate::types::FileEntry;
use std::collections::HashSet;
use std::path::{Path, StripPrefixError};

/// Anything that contributes published files.
#[derive(Debug, Clone)]
pub enum Entry<'a> {
    Single(&'a FileEntry),
    Many(Vec<Entry<'a>>),
    /// Contributes `older`, then `latest`.
    Grouped(&'a Group),
}

impl<'a> From<&'a FileEntry> for Entry<'a> {
    fn from(file: &'a FileEntry) -> Self {
        Entry::Single(file)
    }
}

impl<'a> From<&'a Group> for Entry<'a> {
    fn from(group: &'a Group) -> Self {
        Entry::Grouped(group)
    }
}

impl<'a> From<&'a [FileEntry]> for Entry<'a> {
    fn from(files: &'a [FileEntry]) -> Self {
        Entry::Many(files.iter().map(Entry::from).collect())
    }
}

impl<'a> From<&'a [Group]> for Entry<'a> {
    fn from(groups: &'a [Group]) -> Self {
        Entry::Many(groups.iter().map(Entry::from).collect())
    }
}

impl<'a> From<Vec<Entry<'a>>> for Entry<'a> {
    fn from(entries: Vec<Entry<'a>>) -> Self {
        Entry::Many(entries)
    }
}

/// Flatten `entries`, dropping any entry whose url was already seen.
pub fn collect<'a>(entries: impl IntoIterator<Item = Entry<'a>>) -> Vec<FileEntry> {
    let mut seen = HashSet::new();
    let mut files = Vec::new();
    for entry in entries {
        walk(&entry, &mut seen, &mut files);
    }
    files
}

fn walk<'a>(entry: &Entry<'a>, seen: &mut HashSet<&'a str>, out: &mut Vec<FileEntry>) {
    match entry {
        Entry::Single(file) => push(*file, seen, out),
        Entry::Many(entries) => {
            for entry in entries {
                walk(entry, seen, out);
            }
        }
        Entry::Grouped(group) => {
            let group: &'a Group = *group;
            for file in group.older.iter().chain(group.latest.iter()) {
                push(file, seen, out);
            }
        }
    }
}

fn push<'a>(file: &'a FileEntry, seen: &mut HashSet<&'a str>, out: &mut Vec<FileEntry>) {
    if seen.insert(file.url()) {
        out.push(file.clone());
    }
}

/// Rewrite every path from below `from` to below `to`.
pub fn move_all(files: &[FileEntry], from: &Path, to: &Path) -> Result<Vec<FileEntry>, StripPrefixError> {
    files.iter().map(|f| f.moved(from, to)).collect()
}
