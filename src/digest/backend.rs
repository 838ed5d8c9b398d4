//! Digester trait and shared error type.
//!
//! A [`Digester`] turns a file path into a lowercase hex digest. The hash
//! cache only ever talks to this trait, so where the bytes are read (in this
//! process or on the storage host) is decided once, at pipeline construction.

use crate::types::DigestKind;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DigestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{kind} command failed: {message}")]
    Command { kind: DigestKind, message: String },
    #[error("{kind} command returned no digest: {output:?}")]
    Malformed { kind: DigestKind, output: String },
}

impl DigestError {
    /// Digest kind the failure belongs to, when known.
    pub fn kind(&self) -> Option<DigestKind> {
        match self {
            DigestError::Io(_) => None,
            DigestError::Command { kind, .. } | DigestError::Malformed { kind, .. } => Some(*kind),
        }
    }
}

/// Trait for digest backends.
pub trait Digester: Sync {
    /// Compute one digest of the file at `path`.
    fn digest(&self, kind: DigestKind, path: &Path) -> Result<String, DigestError>;

    /// Compute several digests of the same file.
    ///
    /// Backends that can produce several digests in a single read override
    /// this; the default asks for each kind in turn.
    fn digest_all(
        &self,
        kinds: &[DigestKind],
        path: &Path,
    ) -> Result<Vec<(DigestKind, String)>, DigestError> {
        kinds
            .iter()
            .map(|&kind| Ok((kind, self.digest(kind, path)?)))
            .collect()
    }
}

/// Extract the digest from `<hex>  <filename>` style output.
pub fn parse_digest_output(kind: DigestKind, output: &str) -> Result<String, DigestError> {
    output
        .split_whitespace()
        .next()
        .filter(|token| token.bytes().all(|b| b.is_ascii_hexdigit()))
        .map(str::to_ascii_lowercase)
        .ok_or_else(|| DigestError::Malformed {
            kind,
            output: output.to_string(),
        })
}
