//! Shared test utilities.
//!
//! Fixture builders for release trees on disk, lookup helpers that panic
//! with a useful message, and bulk extractors for asserting on ordering.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! write_release(tmp.path(), "osm/osm.20240701.versatiles", 100);
//! let files = scan(tmp.path()).unwrap();
//! assert_eq!(names(&files), vec!["osm.20240701.versatiles"]);
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use crate::group::Group;
use crate::types::{FileEntry, Hashes};

// =========================================================================
// Fixture setup
// =========================================================================

/// Write a release file of `size` bytes at `root/relative`, creating parents.
pub fn write_release(root: &Path, relative: &str, size: usize) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(&path, vec![b'x'; size]).unwrap();
    path
}

/// Deterministic fake digests derived from the file name.
pub fn fake_hashes(name: &str) -> Hashes {
    Hashes {
        md5: format!("{:032x}", name.len()),
        sha256: format!("{:064x}", name.len() * 7),
    }
}

/// In-memory entry below `/remote`, hashes attached.
pub fn hashed_entry(name: &str, size: u64) -> FileEntry {
    FileEntry::new(Path::new("/remote").join(name), size).with_hashes(fake_hashes(name))
}

/// In-memory entry below `/remote`, no hashes.
pub fn entry(name: &str, size: u64) -> FileEntry {
    FileEntry::new(Path::new("/remote").join(name), size)
}

// =========================================================================
// Lookup helpers
// =========================================================================

/// Find a group by slug. Panics with the available slugs if not found.
pub fn find_group<'a>(groups: &'a [Group], slug: &str) -> &'a Group {
    groups.iter().find(|g| g.slug == slug).unwrap_or_else(|| {
        let available: Vec<&str> = groups.iter().map(|g| g.slug.as_str()).collect();
        panic!("group '{slug}' not found. Available: {available:?}")
    })
}

/// Find an entry by url. Panics with the available urls if not found.
pub fn find_url<'a>(files: &'a [FileEntry], url: &str) -> &'a FileEntry {
    files.iter().find(|f| f.url() == url).unwrap_or_else(|| {
        panic!("url '{url}' not found. Available: {:?}", urls(files))
    })
}

// =========================================================================
// Bulk extractors
// =========================================================================

pub fn names(files: &[FileEntry]) -> Vec<&str> {
    files.iter().map(|f| f.name()).collect()
}

pub fn urls(files: &[FileEntry]) -> Vec<&str> {
    files.iter().map(|f| f.url()).collect()
}

pub fn slugs(groups: &[Group]) -> Vec<&str> {
    groups.iter().map(|g| g.slug.as_str()).collect()
}
