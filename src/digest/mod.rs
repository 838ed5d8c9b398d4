//! File digests for the hash cache.
//!
//! | Backend | Reads bytes | Selected by |
//! |---|---|---|
//! | [`LocalDigester`] | in this process, one streaming pass | `digest.backend = "local"` |
//! | [`SshDigester`] | on the storage host via `ssh … md5sum` | `digest.backend = "ssh"` |
//!
//! - **Backend**: [`Digester`] trait + [`DigestError`]
//! - **Local**: chunked md5 + sha256 in a single read
//! - **Ssh**: remote coreutils invocation, stdout parsed

pub mod backend;
pub mod local;
pub mod ssh;

pub use backend::{DigestError, Digester};
pub use local::LocalDigester;
pub use ssh::SshDigester;

use crate::config::{DigestBackend, DigestConfig};
use std::path::Path;

/// Build the configured digester for a release tree rooted at `local_root`.
pub fn select(config: &DigestConfig, local_root: &Path) -> Box<dyn Digester> {
    match config.backend {
        DigestBackend::Local => Box::new(LocalDigester::new()),
        DigestBackend::Ssh => Box::new(SshDigester {
            host: config.host.clone(),
            port: config.port,
            identity: config.identity.clone().into(),
            remote_base: config.remote_base.clone().into(),
            local_root: local_root.to_path_buf(),
        }),
    }
}
