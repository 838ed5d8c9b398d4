//! Local cache synchronization.
//!
//! Stage 4 of the publishing pipeline. Products flagged `cache_locally` have
//! their latest release mirrored from the remote tree into a local directory,
//! so downloads of the most popular file are served from local disk.
//!
//! The diff is keyed by file name:
//!
//! | Local | Remote | Action |
//! |---|---|---|
//! | present, same size | present | keep, point the entry at the local copy |
//! | present, different size | present | delete, then copy |
//! | present | absent | delete |
//! | absent | present | copy |
//!
//! With `strict` set, an equal size is not enough: the local copy's sha256
//! must also match the remote entry's.
//!
//! All deletions run before any copy, so disk space is freed before new
//! releases land. Every operation is attempted even after a failure; the
//! failures are reported together at the end. Nothing is rolled back.

use crate::digest::Digester;
use crate::group::Group;
use crate::scan::{self, ScanError};
use crate::types::{DigestKind, FileEntry};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("{} of {attempted} sync operations failed", .failures.len())]
    Incomplete {
        failures: Vec<SyncFailure>,
        attempted: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Delete,
    Copy,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SyncAction::Delete => "delete",
            SyncAction::Copy => "copy",
        })
    }
}

#[derive(Debug)]
pub struct SyncFailure {
    pub action: SyncAction,
    pub path: PathBuf,
    pub source: io::Error,
}

impl fmt::Display for SyncFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.action, self.path.display(), self.source)
    }
}

/// Suffix of in-flight copies in the local directory.
pub const PARTIAL_SUFFIX: &str = ".partial";

fn partial_path(to: &Path) -> PathBuf {
    let mut partial = to.as_os_str().to_owned();
    partial.push(PARTIAL_SUFFIX);
    PathBuf::from(partial)
}

/// Filesystem side effects of a sync.
pub trait FileOps {
    fn remove(&self, path: &Path) -> io::Result<()>;
    fn copy(&self, from: &Path, to: &Path) -> io::Result<()>;
}

/// Real filesystem operations.
///
/// Copies land in `<to>.partial` first and are renamed when complete, so a
/// failed copy never leaves a truncated file under the release name. The
/// partial file is removed when the copy fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalFileOps;

impl FileOps for LocalFileOps {
    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
        let partial = partial_path(to);
        let result = fs::copy(from, &partial).and_then(|_| fs::rename(&partial, to));
        if result.is_err() {
            let _ = fs::remove_file(&partial);
        }
        result
    }
}

/// Outcome of a successful sync.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    /// Remote entries in input order, each pointing at its local copy.
    pub files: Vec<FileEntry>,
    pub kept: Vec<String>,
    pub deleted: Vec<String>,
    pub copied: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.deleted.is_empty() && self.copied.is_empty()
    }
}

pub struct SyncEngine<'a> {
    ops: &'a dyn FileOps,
    verifier: Option<&'a dyn Digester>,
}

impl<'a> SyncEngine<'a> {
    /// Size-only comparison.
    pub fn new(ops: &'a dyn FileOps) -> Self {
        Self { ops, verifier: None }
    }

    /// Size plus sha256 of the local copy, computed with `verifier`.
    pub fn strict(ops: &'a dyn FileOps, verifier: &'a dyn Digester) -> Self {
        Self {
            ops,
            verifier: Some(verifier),
        }
    }

    /// Make `local_dir` hold exactly the `remote` files.
    pub fn sync(
        &self,
        remote: Vec<FileEntry>,
        local: &[FileEntry],
        local_dir: &Path,
    ) -> Result<SyncReport, SyncError> {
        let mut to_delete: BTreeMap<&str, &FileEntry> =
            local.iter().map(|f| (f.name(), f)).collect();
        let mut to_copy: BTreeMap<String, usize> = remote
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name().to_string(), i))
            .collect();

        let mut files = remote.clone();
        let mut kept = Vec::new();
        for (i, file) in remote.iter().enumerate() {
            let Some(existing) = to_delete.get(file.name()) else {
                continue;
            };
            if !self.is_same(file, existing) {
                continue;
            }
            files[i] = file.relocated(existing.path());
            kept.push(file.name().to_string());
            to_delete.remove(file.name());
            to_copy.remove(file.name());
        }

        let mut failures = Vec::new();
        let mut attempted = 0;
        let mut deleted = Vec::new();
        for (name, file) in &to_delete {
            attempted += 1;
            info!(file = name, "deleting stale local copy");
            match self.ops.remove(file.path()) {
                Ok(()) => deleted.push(name.to_string()),
                Err(source) => failures.push(SyncFailure {
                    action: SyncAction::Delete,
                    path: file.path().to_path_buf(),
                    source,
                }),
            }
        }

        let mut copied = Vec::new();
        for (name, &i) in &to_copy {
            attempted += 1;
            let target = local_dir.join(name);
            info!(file = %name, to = %target.display(), "copying release");
            match self.ops.copy(remote[i].path(), &target) {
                Ok(()) => {
                    files[i] = remote[i].relocated(&target);
                    copied.push(name.clone());
                }
                Err(source) => failures.push(SyncFailure {
                    action: SyncAction::Copy,
                    path: target,
                    source,
                }),
            }
        }

        if !failures.is_empty() {
            for failure in &failures {
                warn!(%failure, "sync operation failed");
            }
            return Err(SyncError::Incomplete {
                failures,
                attempted,
            });
        }

        Ok(SyncReport {
            files,
            kept,
            deleted,
            copied,
        })
    }

    /// Mirror the latest release of every `cache_locally` group into
    /// `local_dir`, then point those groups' `latest` at the local copies.
    pub fn sync_subset(
        &self,
        groups: &mut [Group],
        local_dir: &Path,
    ) -> Result<SyncReport, SyncError> {
        let selected: Vec<usize> = groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.cache_locally && g.latest.is_some())
            .map(|(i, _)| i)
            .collect();
        let remote: Vec<FileEntry> = selected
            .iter()
            .filter_map(|&i| groups[i].latest.clone())
            .collect();

        fs::create_dir_all(local_dir)?;
        self.remove_partials(local_dir)?;
        let local = scan::scan(local_dir)?;
        let report = self.sync(remote, &local, local_dir)?;

        for (&i, file) in selected.iter().zip(&report.files) {
            groups[i].latest = Some(file.clone());
        }
        Ok(report)
    }

    /// Delete copies left behind by an interrupted run.
    fn remove_partials(&self, local_dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(local_dir)? {
            let path = entry?.path();
            let is_partial = path
                .file_name()
                .is_some_and(|n| n.to_string_lossy().ends_with(PARTIAL_SUFFIX));
            if !is_partial || !path.is_file() {
                continue;
            }
            info!(path = %path.display(), "removing interrupted copy");
            if let Err(err) = self.ops.remove(&path) {
                warn!(path = %path.display(), error = %err, "cannot remove interrupted copy");
            }
        }
        Ok(())
    }

    fn is_same(&self, remote: &FileEntry, local: &FileEntry) -> bool {
        if remote.size() != local.size() {
            return false;
        }
        let Some(verifier) = self.verifier else {
            return true;
        };
        let Ok(expected) = remote.sha256() else {
            warn!(file = remote.name(), "no sha256 to verify against, recopying");
            return false;
        };
        match verifier.digest(DigestKind::Sha256, local.path()) {
            Ok(actual) => actual == expected,
            Err(err) => {
                warn!(file = local.name(), error = %err, "cannot verify local copy, recopying");
                false
            }
        }
    }
}

/// Size-only sync with real filesystem operations.
pub fn sync(
    remote: Vec<FileEntry>,
    local: &[FileEntry],
    local_dir: &Path,
) -> Result<SyncReport, SyncError> {
    SyncEngine::new(&LocalFileOps).sync(remote, local, local_dir)
}

/// Size-only subset sync with real filesystem operations.
pub fn sync_subset(groups: &mut [Group], local_dir: &Path) -> Result<SyncReport, SyncError> {
    SyncEngine::new(&LocalFileOps).sync_subset(groups, local_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::digest::backend::tests::MockDigester;
    use crate::group::group_files;
    use crate::test_helpers::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq)]
    enum RecordedOp {
        Remove(PathBuf),
        Copy(PathBuf, PathBuf),
    }

    /// Records operations without touching disk; fails for listed file names.
    #[derive(Default)]
    struct MockFileOps {
        ops: Mutex<Vec<RecordedOp>>,
        failing: HashSet<String>,
    }

    impl MockFileOps {
        fn failing_on(names: &[&str]) -> Self {
            Self {
                failing: names.iter().map(|s| s.to_string()).collect(),
                ..Self::default()
            }
        }

        fn get_ops(&self) -> Vec<RecordedOp> {
            self.ops.lock().unwrap().clone()
        }

        fn check(&self, path: &Path) -> io::Result<()> {
            let name = path.file_name().unwrap().to_string_lossy();
            if self.failing.contains(name.as_ref()) {
                Err(io::Error::new(io::ErrorKind::PermissionDenied, "mock failure"))
            } else {
                Ok(())
            }
        }
    }

    impl FileOps for MockFileOps {
        fn remove(&self, path: &Path) -> io::Result<()> {
            self.ops
                .lock()
                .unwrap()
                .push(RecordedOp::Remove(path.to_path_buf()));
            self.check(path)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<()> {
            self.ops
                .lock()
                .unwrap()
                .push(RecordedOp::Copy(from.to_path_buf(), to.to_path_buf()));
            self.check(to)
        }
    }

    fn local(name: &str, size: u64) -> FileEntry {
        FileEntry::new(Path::new("/local").join(name), size)
    }

    // =========================================================================
    // Diff
    // =========================================================================

    #[test]
    fn minimal_operations() {
        let ops = MockFileOps::default();
        let remote = vec![entry("a", 1), entry("b", 2), entry("c", 3)];
        let locals = vec![local("a", 1), local("b", 2), local("d", 4)];

        let report = SyncEngine::new(&ops)
            .sync(remote, &locals, Path::new("/local"))
            .unwrap();

        assert_eq!(
            ops.get_ops(),
            vec![
                RecordedOp::Remove(PathBuf::from("/local/d")),
                RecordedOp::Copy(PathBuf::from("/remote/c"), PathBuf::from("/local/c")),
            ]
        );
        assert_eq!(report.kept, vec!["a", "b"]);
        assert_eq!(report.deleted, vec!["d"]);
        assert_eq!(report.copied, vec!["c"]);
        let paths: Vec<&Path> = report.files.iter().map(|f| f.path()).collect();
        assert_eq!(
            paths,
            vec![
                Path::new("/local/a"),
                Path::new("/local/b"),
                Path::new("/local/c")
            ]
        );
    }

    #[test]
    fn identical_sets_do_nothing() {
        let ops = MockFileOps::default();
        let remote = vec![entry("a", 1), entry("b", 2)];
        let locals = vec![local("a", 1), local("b", 2)];

        let report = SyncEngine::new(&ops)
            .sync(remote, &locals, Path::new("/local"))
            .unwrap();
        assert!(ops.get_ops().is_empty());
        assert!(report.is_noop());
    }

    #[test]
    fn size_mismatch_replaces_file() {
        let ops = MockFileOps::default();
        let report = SyncEngine::new(&ops)
            .sync(vec![entry("a", 10)], &[local("a", 5)], Path::new("/local"))
            .unwrap();
        assert_eq!(
            ops.get_ops(),
            vec![
                RecordedOp::Remove(PathBuf::from("/local/a")),
                RecordedOp::Copy(PathBuf::from("/remote/a"), PathBuf::from("/local/a")),
            ]
        );
        assert_eq!(report.files[0].size(), 10);
    }

    #[test]
    fn deletes_run_before_copies() {
        let ops = MockFileOps::default();
        SyncEngine::new(&ops)
            .sync(
                vec![entry("a", 1), entry("z", 1)],
                &[local("m", 1), local("b", 1)],
                Path::new("/local"),
            )
            .unwrap();
        let recorded = ops.get_ops();
        let first_copy = recorded
            .iter()
            .position(|op| matches!(op, RecordedOp::Copy(..)))
            .unwrap();
        assert!(
            recorded[..first_copy]
                .iter()
                .all(|op| matches!(op, RecordedOp::Remove(_)))
        );
        assert_eq!(first_copy, 2);
    }

    #[test]
    fn entries_keep_url_and_hashes() {
        let ops = MockFileOps::default();
        let alias = hashed_entry("osm.20240701.versatiles", 1).with_url("osm.versatiles");
        let report = SyncEngine::new(&ops)
            .sync(vec![alias.clone()], &[], Path::new("/local"))
            .unwrap();
        let synced = &report.files[0];
        assert_eq!(synced.url(), "osm.versatiles");
        assert_eq!(synced.hashes(), alias.hashes());
        assert_eq!(synced.path(), Path::new("/local/osm.20240701.versatiles"));
    }

    // =========================================================================
    // Failure handling
    // =========================================================================

    #[test]
    fn failures_do_not_stop_later_operations() {
        let ops = MockFileOps::failing_on(&["d"]);
        let err = SyncEngine::new(&ops)
            .sync(
                vec![entry("a", 1), entry("c", 1)],
                &[local("d", 1)],
                Path::new("/local"),
            )
            .unwrap_err();

        assert_eq!(ops.get_ops().len(), 3);
        match err {
            SyncError::Incomplete {
                failures,
                attempted,
            } => {
                assert_eq!(attempted, 3);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].action, SyncAction::Delete);
                assert_eq!(failures[0].path, PathBuf::from("/local/d"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn all_failures_are_collected() {
        let ops = MockFileOps::failing_on(&["a", "c"]);
        let err = SyncEngine::new(&ops)
            .sync(
                vec![entry("a", 1), entry("b", 1), entry("c", 1)],
                &[],
                Path::new("/local"),
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "2 of 3 sync operations failed");
    }

    // =========================================================================
    // Strict mode
    // =========================================================================

    #[test]
    fn strict_keeps_matching_copy() {
        let ops = MockFileOps::default();
        let verifier = MockDigester::new();
        let local_a = local("a.versatiles", 1);
        let remote_a = entry("a.versatiles", 1).with_hashes(crate::types::Hashes {
            md5: String::new(),
            sha256: MockDigester::fake_digest(DigestKind::Sha256, local_a.path()),
        });

        let report = SyncEngine::strict(&ops, &verifier)
            .sync(vec![remote_a], &[local_a], Path::new("/local"))
            .unwrap();
        assert!(report.is_noop());
        assert_eq!(verifier.get_calls().len(), 1);
    }

    #[test]
    fn strict_recopies_on_digest_mismatch() {
        let ops = MockFileOps::default();
        let verifier = MockDigester::new();
        let remote_a = entry("a.versatiles", 1).with_hashes(crate::types::Hashes {
            md5: String::new(),
            sha256: "0".repeat(64),
        });

        let report = SyncEngine::strict(&ops, &verifier)
            .sync(vec![remote_a], &[local("a.versatiles", 1)], Path::new("/local"))
            .unwrap();
        assert_eq!(report.deleted, vec!["a.versatiles"]);
        assert_eq!(report.copied, vec!["a.versatiles"]);
    }

    // =========================================================================
    // Subset sync on disk
    // =========================================================================

    #[test]
    fn subset_mirrors_cached_groups_only() {
        let tmp = TempDir::new().unwrap();
        let remote_dir = tmp.path().join("remote_files");
        let local_dir = tmp.path().join("local_files");
        write_release(&remote_dir, "osm.20240701.versatiles", 100);
        write_release(&remote_dir, "osm.20240325.versatiles", 200);
        write_release(&remote_dir, "hillshade-vectors.versatiles", 50);

        let mut groups = group_files(scan::scan(&remote_dir).unwrap());
        let report = sync_subset(&mut groups, &local_dir).unwrap();

        assert_eq!(report.copied, vec!["osm.20240701.versatiles"]);
        assert!(local_dir.join("osm.20240701.versatiles").exists());
        assert!(!local_dir.join("hillshade-vectors.versatiles").exists());
        assert!(!local_dir.join("osm.20240701.versatiles.partial").exists());

        let osm = find_group(&groups, "osm");
        let latest = osm.latest.as_ref().unwrap();
        assert_eq!(latest.path(), local_dir.join("osm.20240701.versatiles"));
        assert_eq!(latest.url(), "osm.versatiles");
        assert!(osm.older[0].path().starts_with(&remote_dir));

        let hillshade = find_group(&groups, "hillshade-vectors");
        assert!(
            hillshade
                .latest
                .as_ref()
                .unwrap()
                .path()
                .starts_with(&remote_dir)
        );
    }

    #[test]
    fn subset_removes_superseded_release() {
        let tmp = TempDir::new().unwrap();
        let remote_dir = tmp.path().join("remote_files");
        let local_dir = tmp.path().join("local_files");
        write_release(&remote_dir, "osm.20240701.versatiles", 100);
        write_release(&local_dir, "osm.20240325.versatiles", 200);

        let mut groups = group_files(scan::scan(&remote_dir).unwrap());
        let report = sync_subset(&mut groups, &local_dir).unwrap();

        assert_eq!(report.deleted, vec!["osm.20240325.versatiles"]);
        assert!(!local_dir.join("osm.20240325.versatiles").exists());
        assert!(local_dir.join("osm.20240701.versatiles").exists());

        let again = sync_subset(&mut group_files(scan::scan(&remote_dir).unwrap()), &local_dir)
            .unwrap();
        assert!(again.is_noop());
    }

    #[test]
    fn subset_creates_local_dir() {
        let tmp = TempDir::new().unwrap();
        let local_dir = tmp.path().join("nested/local_files");
        let report = sync_subset(&mut [], &local_dir).unwrap();
        assert!(local_dir.is_dir());
        assert!(report.is_noop());
    }

    #[test]
    fn subset_removes_interrupted_copies() {
        let tmp = TempDir::new().unwrap();
        let local_dir = tmp.path().join("local_files");
        fs::create_dir_all(&local_dir).unwrap();
        fs::write(local_dir.join("osm.20240701.versatiles.partial"), "half").unwrap();

        let report = sync_subset(&mut [], &local_dir).unwrap();
        assert!(report.is_noop());
        assert!(!local_dir.join("osm.20240701.versatiles.partial").exists());
    }

    #[test]
    fn failed_copy_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let from = write_release(tmp.path(), "remote/a.versatiles", 10);
        let to = tmp.path().join("local/a.versatiles");
        fs::create_dir_all(&to).unwrap();

        assert!(LocalFileOps.copy(&from, &to).is_err());
        assert!(!tmp.path().join("local/a.versatiles.partial").exists());
        assert!(to.is_dir());
    }

    #[test]
    fn local_copy_lands_under_release_name() {
        let tmp = TempDir::new().unwrap();
        let from = write_release(tmp.path(), "remote/a.versatiles", 10);
        fs::create_dir_all(tmp.path().join("local")).unwrap();
        let to = tmp.path().join("local/a.versatiles");

        LocalFileOps.copy(&from, &to).unwrap();
        assert_eq!(fs::metadata(&to).unwrap().len(), 10);
        assert!(!tmp.path().join("local/a.versatiles.partial").exists());
    }
}
