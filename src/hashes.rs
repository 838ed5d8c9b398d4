//! Sidecar-backed hash cache.
//!
//! Stage 2 of the publishing pipeline. Every release file gets two sidecar
//! files next to it holding its digests:
//!
//! ```text
//! osm.20240701.versatiles          # 60 GB release
//! osm.20240701.versatiles.md5      # "5eb63bbbe01eeed093cb22bb8f5acdc3\n"
//! osm.20240701.versatiles.sha256   # "b94d27b9…\n"
//! ```
//!
//! Releases are immutable, so a sidecar once written is trusted forever.
//! Computing one means reading the whole file, which is why the work is
//! split into three phases:
//!
//! 1. **Check**: find the files with at least one missing sidecar.
//! 2. **Compute**: digest only those, emitting byte-based progress. Sidecars
//!    are written to `<sidecar>.tmp` and renamed into place, so an
//!    interrupted run never leaves a truncated sidecar behind.
//! 3. **Read**: load both sidecars for every file and attach them.
//!
//! Sidecar content is permissive on read: the first whitespace-delimited
//! token is the digest, anything after it (e.g. a `md5sum`-style filename)
//! is ignored.

use crate::digest::{DigestError, Digester};
use crate::types::{DigestKind, FileEntry, Hashes};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("computing {kind} of {path} failed: {source}")]
    Computation {
        path: PathBuf,
        kind: DigestKind,
        #[source]
        source: DigestError,
    },
    #[error("sidecar is empty: {0}")]
    EmptySidecar(PathBuf),
}

/// Bytes hashed so far out of the bytes queued for this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub processed: u64,
    pub total: u64,
}

impl Progress {
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.processed as f64 * 100.0 / self.total as f64
        }
    }
}

/// Progress events sent while the cache is filled.
#[derive(Debug, Clone)]
pub enum HashEvent {
    /// Phase 1 done: `missing` of `files` need at least one digest.
    Checked { files: usize, missing: usize },
    /// Phase 2 starts with `total_bytes` to read.
    Started { total_bytes: u64 },
    FileHashed {
        name: String,
        kinds: Vec<DigestKind>,
        progress: Progress,
    },
    Finished { computed: usize },
}

/// How many files were served from sidecars versus digested this run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HashStats {
    pub cached: usize,
    pub computed: usize,
}

impl fmt::Display for HashStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.computed > 0 {
            write!(f, "{} cached, {} hashed", self.cached, self.computed)
        } else {
            write!(f, "{} cached", self.cached)
        }
    }
}

/// Return `files` with hashes attached, computing missing sidecars first.
pub fn ensure_hashes(
    files: Vec<FileEntry>,
    digester: &dyn Digester,
    events: Option<&Sender<HashEvent>>,
) -> Result<(Vec<FileEntry>, HashStats), HashError> {
    let send = |event: HashEvent| {
        if let Some(tx) = events {
            tx.send(event).ok();
        }
    };

    // Phase 1
    let queue: Vec<(&FileEntry, Vec<DigestKind>)> = files
        .iter()
        .filter_map(|file| {
            let missing = missing_kinds(file.path());
            (!missing.is_empty()).then_some((file, missing))
        })
        .collect();
    send(HashEvent::Checked {
        files: files.len(),
        missing: queue.len(),
    });

    // Phase 2
    if !queue.is_empty() {
        let mut progress = Progress {
            processed: 0,
            total: queue.iter().map(|(f, _)| f.size()).sum(),
        };
        info!(files = queue.len(), bytes = progress.total, "hashing files");
        send(HashEvent::Started {
            total_bytes: progress.total,
        });

        for (file, kinds) in &queue {
            let digests = digester
                .digest_all(kinds, file.path())
                .map_err(|source| HashError::Computation {
                    path: file.path().to_path_buf(),
                    kind: source.kind().unwrap_or(kinds[0]),
                    source,
                })?;
            for (kind, hex) in digests {
                write_sidecar(&kind.sidecar_path(file.path()), &hex)?;
            }
            progress.processed += file.size();
            send(HashEvent::FileHashed {
                name: file.name().to_string(),
                kinds: kinds.clone(),
                progress,
            });
        }
        send(HashEvent::Finished {
            computed: queue.len(),
        });
    }

    let stats = HashStats {
        cached: files.len() - queue.len(),
        computed: queue.len(),
    };

    // Phase 3
    let hashed = files
        .into_iter()
        .map(|file| {
            let hashes = Hashes {
                md5: read_sidecar(&DigestKind::Md5.sidecar_path(file.path()))?,
                sha256: read_sidecar(&DigestKind::Sha256.sidecar_path(file.path()))?,
            };
            Ok(file.with_hashes(hashes))
        })
        .collect::<Result<Vec<_>, HashError>>()?;
    Ok((hashed, stats))
}

fn missing_kinds(path: &Path) -> Vec<DigestKind> {
    DigestKind::ALL
        .into_iter()
        .filter(|kind| !kind.sidecar_path(path).exists())
        .collect()
}

/// Write `<hex>\n` to `path` via a temporary file and rename.
pub fn write_sidecar(path: &Path, hex: &str) -> Result<(), HashError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    let io_err = |source| HashError::Io {
        path: path.to_path_buf(),
        source,
    };
    fs::write(&tmp, format!("{hex}\n")).map_err(io_err)?;
    fs::rename(&tmp, path).map_err(io_err)
}

/// First whitespace-delimited token of a sidecar.
pub fn read_sidecar(path: &Path) -> Result<String, HashError> {
    let content = fs::read_to_string(path).map_err(|source| HashError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| HashError::EmptySidecar(path.to_path_buf()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::LocalDigester;
    use crate::digest::backend::tests::MockDigester;
    use crate::scan::scan;
    use crate::test_helpers::*;
    use std::sync::mpsc;
    use tempfile::TempDir;

    // =========================================================================
    // Sidecar IO
    // =========================================================================

    #[test]
    fn sidecar_round_trip() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.versatiles.md5");
        write_sidecar(&path, "abc123").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "abc123\n");
        assert_eq!(read_sidecar(&path).unwrap(), "abc123");
        assert!(!tmp.path().join("a.versatiles.md5.tmp").exists());
    }

    #[test]
    fn read_sidecar_ignores_trailing_filename() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.versatiles.sha256");
        fs::write(&path, "  deadbeef  a.versatiles\n\n").unwrap();
        assert_eq!(read_sidecar(&path).unwrap(), "deadbeef");
    }

    #[test]
    fn read_empty_sidecar_fails() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a.versatiles.md5");
        fs::write(&path, " \n").unwrap();
        assert!(matches!(
            read_sidecar(&path),
            Err(HashError::EmptySidecar(p)) if p == path
        ));
    }

    // =========================================================================
    // ensure_hashes
    // =========================================================================

    #[test]
    fn computes_and_writes_missing_sidecars() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("hello.versatiles");
        fs::write(&path, "hello world").unwrap();
        let files = scan(tmp.path()).unwrap();

        let (files, stats) = ensure_hashes(files, &LocalDigester, None).unwrap();
        assert_eq!(stats, HashStats { cached: 0, computed: 1 });
        assert_eq!(files[0].md5().unwrap(), "5eb63bbbe01eeed093cb22bb8f5acdc3");
        assert_eq!(
            fs::read_to_string(tmp.path().join("hello.versatiles.md5")).unwrap(),
            "5eb63bbbe01eeed093cb22bb8f5acdc3\n"
        );
        assert!(tmp.path().join("hello.versatiles.sha256").exists());
    }

    #[test]
    fn second_run_reads_cached_sidecars() {
        let tmp = TempDir::new().unwrap();
        write_release(tmp.path(), "a.versatiles", 10);
        let mock = MockDigester::new();

        let (first, _) = ensure_hashes(scan(tmp.path()).unwrap(), &mock, None).unwrap();
        let calls_after_first = mock.get_calls().len();
        let (second, stats) = ensure_hashes(scan(tmp.path()).unwrap(), &mock, None).unwrap();

        assert_eq!(calls_after_first, 2);
        assert_eq!(mock.get_calls().len(), 2);
        assert_eq!(stats, HashStats { cached: 1, computed: 0 });
        assert_eq!(first[0].hashes(), second[0].hashes());
    }

    #[test]
    fn only_missing_kind_is_computed() {
        let tmp = TempDir::new().unwrap();
        let path = write_release(tmp.path(), "a.versatiles", 10);
        fs::write(DigestKind::Md5.sidecar_path(&path), "0123\n").unwrap();
        let mock = MockDigester::new();

        let (files, _) = ensure_hashes(scan(tmp.path()).unwrap(), &mock, None).unwrap();
        assert_eq!(mock.get_calls(), vec![(DigestKind::Sha256, path.clone())]);
        assert_eq!(files[0].md5().unwrap(), "0123");
        assert_eq!(
            files[0].sha256().unwrap(),
            MockDigester::fake_digest(DigestKind::Sha256, &path)
        );
    }

    #[test]
    fn manually_placed_sidecar_is_used() {
        let tmp = TempDir::new().unwrap();
        let path = write_release(tmp.path(), "a.versatiles", 10);
        fs::write(DigestKind::Md5.sidecar_path(&path), "abc a.versatiles\n").unwrap();
        fs::write(DigestKind::Sha256.sidecar_path(&path), "def\n").unwrap();

        let (files, stats) =
            ensure_hashes(scan(tmp.path()).unwrap(), &MockDigester::new(), None).unwrap();
        assert_eq!(stats.computed, 0);
        assert_eq!(files[0].md5().unwrap(), "abc");
        assert_eq!(files[0].sha256().unwrap(), "def");
    }

    #[test]
    fn first_failure_aborts() {
        let tmp = TempDir::new().unwrap();
        write_release(tmp.path(), "a.versatiles", 10);
        write_release(tmp.path(), "b.versatiles", 10);
        let mock = MockDigester::failing_on("a.versatiles");

        let err = ensure_hashes(scan(tmp.path()).unwrap(), &mock, None).unwrap_err();
        match err {
            HashError::Computation { path, kind, .. } => {
                assert!(path.ends_with("a.versatiles"));
                assert_eq!(kind, DigestKind::Md5);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(mock.get_calls().iter().all(|(_, p)| p.ends_with("a.versatiles")));
        assert!(!tmp.path().join("b.versatiles.md5").exists());
    }

    #[test]
    fn progress_is_monotonic_and_complete() {
        let tmp = TempDir::new().unwrap();
        write_release(tmp.path(), "a.versatiles", 10);
        write_release(tmp.path(), "b.versatiles", 30);
        let (tx, rx) = mpsc::channel();

        ensure_hashes(scan(tmp.path()).unwrap(), &MockDigester::new(), Some(&tx)).unwrap();
        drop(tx);
        let events: Vec<HashEvent> = rx.iter().collect();

        assert!(matches!(events[0], HashEvent::Checked { files: 2, missing: 2 }));
        assert!(matches!(events[1], HashEvent::Started { total_bytes: 40 }));
        let processed: Vec<u64> = events
            .iter()
            .filter_map(|e| match e {
                HashEvent::FileHashed { progress, .. } => Some(progress.processed),
                _ => None,
            })
            .collect();
        assert_eq!(processed, vec![10, 40]);
        assert!(matches!(events.last(), Some(HashEvent::Finished { computed: 2 })));
    }

    #[test]
    fn nothing_missing_emits_only_check() {
        let tmp = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        ensure_hashes(Vec::new(), &MockDigester::new(), Some(&tx)).unwrap();
        drop(tx);
        let events: Vec<HashEvent> = rx.iter().collect();
        assert_eq!(events.len(), 1);
        assert!(tmp.path().read_dir().unwrap().next().is_none());
    }

    #[test]
    fn stats_display() {
        assert_eq!(HashStats { cached: 3, computed: 0 }.to_string(), "3 cached");
        assert_eq!(
            HashStats { cached: 3, computed: 2 }.to_string(),
            "3 cached, 2 hashed"
        );
    }

    #[test]
    fn progress_percent() {
        assert_eq!(Progress { processed: 0, total: 0 }.percent(), 100.0);
        assert_eq!(Progress { processed: 25, total: 100 }.percent(), 25.0);
    }
}
