//! In-process streaming digests.
//!
//! Release files are tens of gigabytes, so they are read in fixed 1 MiB
//! chunks and every chunk is fed to all requested hashers before the next
//! read. Memory use is bounded by the chunk size, and asking for both digests
//! costs one pass over the file.

use super::backend::{DigestError, Digester};
use crate::types::DigestKind;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 1 << 20;

/// Digests files by reading them from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalDigester;

impl LocalDigester {
    pub fn new() -> Self {
        Self
    }
}

impl Digester for LocalDigester {
    fn digest(&self, kind: DigestKind, path: &Path) -> Result<String, DigestError> {
        let mut digests = self.digest_all(&[kind], path)?;
        Ok(digests.remove(0).1)
    }

    fn digest_all(
        &self,
        kinds: &[DigestKind],
        path: &Path,
    ) -> Result<Vec<(DigestKind, String)>, DigestError> {
        let want_md5 = kinds.contains(&DigestKind::Md5);
        let want_sha256 = kinds.contains(&DigestKind::Sha256);
        let mut md5 = md5::Context::new();
        let mut sha256 = Sha256::new();

        let mut file = File::open(path)?;
        let mut buf = vec![0u8; CHUNK_SIZE];
        loop {
            let n = match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            if want_md5 {
                md5.consume(&buf[..n]);
            }
            if want_sha256 {
                sha256.update(&buf[..n]);
            }
        }

        let md5 = format!("{:x}", md5.compute());
        let sha256 = format!("{:x}", sha256.finalize());
        Ok(kinds
            .iter()
            .map(|&kind| {
                let hex = match kind {
                    DigestKind::Md5 => md5.clone(),
                    DigestKind::Sha256 => sha256.clone(),
                };
                (kind, hex)
            })
            .collect())
    }
}
