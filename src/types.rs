//! Shared types used across all pipeline stages.
//!
//! A [`FileEntry`] is the unit that flows through every stage: the scanner
//! creates them, the hash cache attaches digests, the grouper clones them into
//! latest aliases, the sync engine relocates them into the local cache, and the
//! collector rewrites their paths for the proxy's mount point.
//!
//! Entries are immutable once built. Every path or url change goes through a
//! transform ([`FileEntry::with_url`], [`FileEntry::relocated`],
//! [`FileEntry::moved`]) that returns a new entry, so an entry shared between a
//! group and the publication list can never be rewritten behind either's back.

use serde::Serialize;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf, StripPrefixError};
use thiserror::Error;

/// The two digests kept for every release file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestKind {
    Md5,
    Sha256,
}

impl DigestKind {
    pub const ALL: [DigestKind; 2] = [DigestKind::Md5, DigestKind::Sha256];

    /// Extension of the sidecar file, also used for the published checksum url.
    pub fn extension(self) -> &'static str {
        match self {
            DigestKind::Md5 => "md5",
            DigestKind::Sha256 => "sha256",
        }
    }

    /// Name of the coreutils command producing this digest.
    pub fn command(self) -> &'static str {
        match self {
            DigestKind::Md5 => "md5sum",
            DigestKind::Sha256 => "sha256sum",
        }
    }

    /// `<path>.md5` / `<path>.sha256`
    pub fn sidecar_path(self, path: &Path) -> PathBuf {
        let mut sidecar = path.as_os_str().to_owned();
        sidecar.push(".");
        sidecar.push(self.extension());
        PathBuf::from(sidecar)
    }
}

impl fmt::Display for DigestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DigestKind::Md5 => "MD5",
            DigestKind::Sha256 => "SHA256",
        })
    }
}

/// Lowercase hex digests of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hashes {
    pub md5: String,
    pub sha256: String,
}

impl Hashes {
    pub fn get(&self, kind: DigestKind) -> &str {
        match kind {
            DigestKind::Md5 => &self.md5,
            DigestKind::Sha256 => &self.sha256,
        }
    }
}

/// A digest was read before the hash cache attached it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} hash is missing for file \"{name}\"")]
pub struct MissingHashError {
    pub name: String,
    pub kind: DigestKind,
}

/// One physical release file.
///
/// Two entries describe the same published file iff their [`url`](Self::url)
/// is equal, even when they point at different physical paths.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    path: PathBuf,
    name: String,
    url: String,
    size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    hashes: Option<Hashes>,
}

impl FileEntry {
    /// Entry for `path` with a known size. The url defaults to the file name.
    pub fn new(path: impl Into<PathBuf>, size: u64) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            url: name.clone(),
            path,
            name,
            size,
            hashes: None,
        }
    }

    /// Entry for an existing file, sized from the filesystem.
    pub fn from_disk(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let size = std::fs::metadata(&path)?.len();
        Ok(Self::new(path, size))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Base name of the path.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Relative publication url, without a leading slash.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn hashes(&self) -> Option<&Hashes> {
        self.hashes.as_ref()
    }

    /// Size in GiB with one decimal, e.g. `"54.3 GB"`.
    pub fn size_string(&self) -> String {
        format!("{:.1} GB", self.size as f64 / (1u64 << 30) as f64)
    }

    pub fn digest(&self, kind: DigestKind) -> Result<&str, MissingHashError> {
        self.hashes
            .as_ref()
            .map(|h| h.get(kind))
            .ok_or_else(|| MissingHashError {
                name: self.name.clone(),
                kind,
            })
    }

    pub fn md5(&self) -> Result<&str, MissingHashError> {
        self.digest(DigestKind::Md5)
    }

    pub fn sha256(&self) -> Result<&str, MissingHashError> {
        self.digest(DigestKind::Sha256)
    }

    /// Same file published under another url.
    pub fn with_url(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into().trim_start_matches('/').to_string(),
            ..self.clone()
        }
    }

    pub fn with_hashes(self, hashes: Hashes) -> Self {
        Self {
            hashes: Some(hashes),
            ..self
        }
    }

    /// Same file at a new physical location (e.g. its local cache copy).
    pub fn relocated(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    /// Rewrite the path from below `from` to below `to`, keeping the relative part.
    pub fn moved(&self, from: &Path, to: &Path) -> Result<Self, StripPrefixError> {
        let relative = self.path.strip_prefix(from)?;
        Ok(self.relocated(to.join(relative)))
    }

    /// `/<url>.<ext>` response with `"<hex> <basename>\n"` as body.
    pub fn checksum_response(&self, kind: DigestKind) -> Result<FileResponse, MissingHashError> {
        let digest = self.digest(kind)?;
        let basename = self.url.rsplit('/').next().unwrap_or(&self.url);
        Ok(FileResponse::new(
            format!("{}.{}", self.url, kind.extension()),
            &format!("{} {}\n", digest, basename),
        ))
    }

    pub fn md5_response(&self) -> Result<FileResponse, MissingHashError> {
        self.checksum_response(DigestKind::Md5)
    }

    pub fn sha256_response(&self) -> Result<FileResponse, MissingHashError> {
        self.checksum_response(DigestKind::Sha256)
    }
}

/// Literal text the reverse proxy returns for a url, without touching disk.
///
/// The content is stored pre-escaped for a double-quoted nginx string:
/// backslashes, quotes, newlines and tabs become escape sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileResponse {
    pub url: String,
    pub content: String,
}

impl FileResponse {
    pub fn new(url: impl Into<String>, content: &str) -> Self {
        let url = url.into();
        let url = if url.starts_with('/') {
            url
        } else {
            format!("/{url}")
        };
        let content = content
            .replace('\\', "\\\\")
            .replace('"', "\\\"")
            .replace('\n', "\\n")
            .replace('\t', "\\t");
        Self { url, content }
    }
}
