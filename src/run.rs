//! Pipeline orchestration.
//!
//! One run is a full, stateless recomputation of everything published:
//!
//! | # | Stage | Module | Output |
//! |---|---|---|---|
//! | 1 | Resolve settings | [`config`](crate::config) | paths, base url |
//! | 2 | Scan `remote_files/` | [`scan`](crate::scan) | catalog |
//! | 3 | Fill hash cache | [`hashes`](crate::hashes) | hashed catalog |
//! | 4 | Group by slug | [`group`](crate::group) | products |
//! | 5 | Mirror cached products | [`sync`](crate::sync) | `local_files/` |
//! | 6 | Render pages | [`render`](crate::render) | index, feeds, url lists |
//! | 7 | Collect and remap | [`collect`](crate::collect) | publication list |
//! | 8 | Write proxy config | [`nginx`](crate::nginx) | `default.conf` |
//!
//! Any failure aborts the run; nothing is retried. Settings are resolved
//! before any filesystem access, so a missing domain never leaves a partial
//! run behind.
//!
//! ## Volume layout
//!
//! ```text
//! volumes/                              # volume_root
//! ├── .run.lock                         # held while a run is in flight
//! ├── remote_files/                     # release tree (network mount)
//! ├── local_files/                      # cached releases + rendered pages
//! └── nginx_conf/site-confs/default.conf
//! ```
//!
//! The proxy runs in another container that mounts `volume_root` at
//! `mount_root`, so every path written into its config is rewritten to that
//! prefix.

use crate::collect::{self, Entry};
use crate::config::{Config, ConfigError};
use crate::digest::{self, Digester, LocalDigester};
use crate::group::{self, Group};
use crate::hashes::{self, HashError, HashEvent, HashStats};
use crate::nginx;
use crate::render::{self, RenderError};
use crate::scan::{self, ScanError};
use crate::sync::{FileOps, LocalFileOps, SyncEngine, SyncError, SyncReport};
use crate::types::{FileResponse, MissingHashError};
use serde::Serialize;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf, StripPrefixError};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::info;

/// Lock file below the volume root.
pub const LOCK_FILE: &str = ".run.lock";

#[derive(Error, Debug)]
pub enum RunError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("no remote files found in {}", .0.display())]
    EmptyCatalog(PathBuf),
    #[error("Hash error: {0}")]
    Hash(#[from] HashError),
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
    #[error("Render error: {0}")]
    Render(#[from] RenderError),
    #[error(transparent)]
    MissingHash(#[from] MissingHashError),
    #[error("path outside volume root: {0}")]
    Remap(#[from] StripPrefixError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("cannot open lock file {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("another run holds {}", .0.display())]
    AlreadyRunning(PathBuf),
    #[error("volume root {} does not exist", .0.display())]
    MissingVolume(PathBuf),
}

/// Everything a run needs, derived from [`Config`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub domain: String,
    /// `https://<domain>/`
    pub base_url: String,
    /// Absolute.
    pub volume_root: PathBuf,
    pub remote_dir: PathBuf,
    pub local_dir: PathBuf,
    pub nginx_conf: PathBuf,
    pub mount_root: PathBuf,
    pub webhook: Option<String>,
    pub strict: bool,
}

impl Settings {
    /// Derive run settings. Fails on a missing domain before touching disk.
    pub fn resolve(config: &Config) -> Result<Self, RunError> {
        let domain = config.require_domain()?.trim().to_string();
        let volume_root = std::path::absolute(&config.volume_root)?;
        Ok(Self {
            base_url: format!("https://{domain}/"),
            domain,
            remote_dir: volume_root.join("remote_files"),
            local_dir: volume_root.join("local_files"),
            nginx_conf: volume_root.join("nginx_conf/site-confs/default.conf"),
            volume_root,
            mount_root: PathBuf::from(&config.mount_root),
            webhook: config.webhook.clone(),
            strict: config.sync.strict,
        })
    }
}

/// Short description of one product for reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupSummary {
    pub slug: String,
    pub title: String,
    pub latest: Option<String>,
    pub older: usize,
    pub cached: bool,
}

impl From<&Group> for GroupSummary {
    fn from(group: &Group) -> Self {
        Self {
            slug: group.slug.clone(),
            title: group.title.clone(),
            latest: group.latest.as_ref().map(|f| f.url().to_string()),
            older: group.older.len(),
            cached: group.cache_locally,
        }
    }
}

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub base_url: String,
    pub scanned: usize,
    pub hashes: HashStats,
    pub groups: Vec<GroupSummary>,
    pub sync: SyncReport,
    /// Urls of rendered artifacts.
    pub artifacts: Vec<String>,
    pub published: usize,
    pub responses: usize,
    pub nginx_conf: PathBuf,
}

/// A configured run with its digest and filesystem backends.
pub struct Pipeline {
    settings: Settings,
    digester: Box<dyn Digester>,
    ops: Box<dyn FileOps>,
}

impl Pipeline {
    pub fn from_config(config: &Config) -> Result<Self, RunError> {
        let settings = Settings::resolve(config)?;
        let digester = digest::select(&config.digest, &settings.remote_dir);
        Ok(Self::with_backends(settings, digester, Box::new(LocalFileOps)))
    }

    pub fn with_backends(
        settings: Settings,
        digester: Box<dyn Digester>,
        ops: Box<dyn FileOps>,
    ) -> Self {
        Self {
            settings,
            digester,
            ops,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Execute every stage. `events` receives hash progress and is dropped
    /// when the run ends.
    pub fn run(&self, events: Option<Sender<HashEvent>>) -> Result<RunReport, RunError> {
        let s = &self.settings;

        info!(dir = %s.remote_dir.display(), "scanning remote files");
        let files = scan::scan(&s.remote_dir)?;
        if files.is_empty() {
            return Err(RunError::EmptyCatalog(s.remote_dir.clone()));
        }
        let scanned = files.len();

        let (files, hash_stats) = hashes::ensure_hashes(files, self.digester.as_ref(), events.as_ref())?;
        drop(events);
        info!(%hash_stats, "hashes ready");

        let mut groups = group::group_files(files);

        info!(dir = %s.local_dir.display(), "syncing local cache");
        let verifier = LocalDigester::new();
        let engine = if s.strict {
            SyncEngine::strict(self.ops.as_ref(), &verifier)
        } else {
            SyncEngine::new(self.ops.as_ref())
        };
        let sync = engine.sync_subset(&mut groups, &s.local_dir)?;

        let index = render::generate_html(&groups, &s.local_dir)?;
        let feeds = render::generate_feeds(&groups, &s.local_dir, &s.base_url)?;
        let url_lists = render::generate_url_lists(&groups, &s.local_dir, &s.base_url)?;
        let artifacts = std::iter::once(&index)
            .chain(&feeds)
            .chain(&url_lists)
            .map(|f| f.url().to_string())
            .collect();

        let published = collect::collect([
            Entry::from(groups.as_slice()),
            Entry::from(&index),
            Entry::from(feeds.as_slice()),
            Entry::from(url_lists.as_slice()),
        ]);
        let published = collect::move_all(&published, &s.volume_root, &s.mount_root)?;

        let responses = groups
            .iter()
            .map(Group::responses)
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .flatten()
            .collect::<Vec<FileResponse>>();

        let conf = nginx::generate_nginx_conf(
            &published,
            &responses,
            s.webhook.as_deref(),
            &s.nginx_conf,
        )?;

        info!(files = published.len(), responses = responses.len(), "run complete");
        Ok(RunReport {
            base_url: s.base_url.clone(),
            scanned,
            hashes: hash_stats,
            groups: groups.iter().map(GroupSummary::from).collect(),
            sync,
            artifacts,
            published: published.len(),
            responses: responses.len(),
            nginx_conf: conf.path().to_path_buf(),
        })
    }
}

/// Exclusive advisory lock on `<volume_root>/.run.lock`.
///
/// Released when dropped or when the process exits.
pub struct RunLock {
    #[cfg(unix)]
    _lock: nix::fcntl::Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

impl RunLock {
    pub fn acquire(volume_root: &Path) -> Result<Self, RunError> {
        if !volume_root.is_dir() {
            return Err(RunError::MissingVolume(volume_root.to_path_buf()));
        }
        let path = volume_root.join(LOCK_FILE);
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| RunError::Lock {
                path: path.clone(),
                source,
            })?;

        #[cfg(unix)]
        {
            use nix::errno::Errno;
            use nix::fcntl::{Flock, FlockArg};

            let lock = Flock::lock(file, FlockArg::LockExclusiveNonblock).map_err(|(_file, errno)| {
                if errno == Errno::EWOULDBLOCK {
                    RunError::AlreadyRunning(path.clone())
                } else {
                    RunError::Lock {
                        path: path.clone(),
                        source: errno.into(),
                    }
                }
            })?;
            Ok(Self { _lock: lock })
        }
        #[cfg(not(unix))]
        {
            Ok(Self { _file: file })
        }
    }
}

/// Resolve settings, take the volume lock, and run the pipeline.
pub fn run(config: &Config, events: Option<Sender<HashEvent>>) -> Result<RunReport, RunError> {
    let pipeline = Pipeline::from_config(config)?;
    let _lock = RunLock::acquire(&pipeline.settings().volume_root)?;
    pipeline.run(events)
}

/// Fill missing sidecars below `remote_files/` without publishing anything.
///
/// Needs no domain. Holds the volume lock like a full run, since both write
/// the same sidecar files.
pub fn hash(config: &Config, events: Option<&Sender<HashEvent>>) -> Result<HashStats, RunError> {
    let volume_root = std::path::absolute(&config.volume_root)?;
    let _lock = RunLock::acquire(&volume_root)?;
    let remote_dir = volume_root.join("remote_files");
    let files = scan::scan(&remote_dir)?;
    let digester = digest::select(&config.digest, &remote_dir);
    let (_, stats) = hashes::ensure_hashes(files, digester.as_ref(), events)?;
    info!(%stats, "hashes ready");
    Ok(stats)
}
