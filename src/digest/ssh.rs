//! Remote digests computed on the storage host.
//!
//! The release tree is a network mount of a storage box. Hashing over the
//! mount would pull every byte across the network, so the digest command runs
//! on the box itself over ssh and only the hex string comes back.
//!
//! The box sees the files under a different root than we do: a local path
//! `<local_root>/osm/osm.versatiles` is `<remote_base>/osm/osm.versatiles`
//! on the host.

use super::backend::{DigestError, Digester, parse_digest_output};
use crate::types::DigestKind;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug, Clone)]
pub struct SshDigester {
    pub host: String,
    pub port: u16,
    pub identity: PathBuf,
    /// Directory on the host that corresponds to `local_root`.
    pub remote_base: PathBuf,
    /// Local mount point of the release tree.
    pub local_root: PathBuf,
}

impl SshDigester {
    /// Path of `path` as seen by the storage host.
    pub fn remote_path(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.local_root) {
            Ok(relative) => self.remote_base.join(relative),
            Err(_) => path.to_path_buf(),
        }
    }

    /// The ssh invocation producing one digest.
    pub fn command(&self, kind: DigestKind, path: &Path) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg(&self.host)
            .arg("-p")
            .arg(self.port.to_string())
            .arg("-i")
            .arg(&self.identity)
            .arg("-oBatchMode=yes")
            .arg(kind.command())
            .arg(self.remote_path(path));
        cmd
    }
}

impl Digester for SshDigester {
    fn digest(&self, kind: DigestKind, path: &Path) -> Result<String, DigestError> {
        tracing::debug!(%kind, path = %path.display(), host = %self.host, "remote digest");
        let output = self.command(kind, path).output()?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            return Err(DigestError::Command {
                kind,
                message: stderr.trim().to_string(),
            });
        }
        if !output.status.success() {
            return Err(DigestError::Command {
                kind,
                message: format!("exited with {}", output.status),
            });
        }
        parse_digest_output(kind, &String::from_utf8_lossy(&output.stdout))
    }
}
