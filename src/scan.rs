//! Catalog scanning.
//!
//! Stage 1 of the publishing pipeline. Walks a release tree and returns one
//! [`FileEntry`] per `.versatiles` file, sized at scan time.
//!
//! ## Directory Structure
//!
//! ```text
//! remote_files/
//! ├── osm/
//! │   ├── osm.20240701.versatiles         # cataloged
//! │   ├── osm.20240701.versatiles.md5     # sidecar, skipped
//! │   ├── osm.20240701.versatiles.sha256  # sidecar, skipped
//! │   └── osm.20240325.versatiles         # cataloged
//! ├── hillshade-vectors.versatiles        # cataloged
//! └── README.md                           # skipped
//! ```
//!
//! Layout below the root carries no meaning: products are derived from file
//! names, not directories.
//!
//! ## Failure modes
//!
//! Release trees live on network storage and are written to while we read
//! them. A file that disappears between listing and its size query is dropped
//! silently. Any other error fails the scan: a product directory that cannot
//! be listed must not look like a product that was removed, or the sync stage
//! would delete its cached copy.

use crate::naming;
use crate::types::FileEntry;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("cannot read catalog root {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot read {path}: {source}")]
    Entry {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Catalog every release file below `root`, sorted by full path.
pub fn scan(root: &Path) -> Result<Vec<FileEntry>, ScanError> {
    fs::read_dir(root).map_err(|source| ScanError::Unreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if is_vanished(&err) => {
                debug!(path = ?err.path(), "entry vanished during scan");
                continue;
            }
            Err(err) => {
                let path = err.path().unwrap_or(root).to_path_buf();
                return Err(ScanError::Entry {
                    path,
                    source: err.into(),
                });
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !naming::is_release(&name) {
            continue;
        }

        match entry.metadata() {
            Ok(meta) => files.push(FileEntry::new(entry.path(), meta.len())),
            Err(err) if is_vanished(&err) => {
                debug!(path = %entry.path().display(), "file vanished before size query");
            }
            Err(err) => {
                return Err(ScanError::Entry {
                    path: entry.path().to_path_buf(),
                    source: err.into(),
                });
            }
        }
    }

    files.sort_by(|a, b| a.path().cmp(b.path()));
    info!(root = %root.display(), count = files.len(), "catalog scanned");
    Ok(files)
}

fn is_vanished(err: &walkdir::Error) -> bool {
    err.io_error()
        .is_some_and(|e| e.kind() == io::ErrorKind::NotFound)
}
