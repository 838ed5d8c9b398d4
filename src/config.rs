//! Configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! the base layer, the user's file is merged on top, and CLI flags override
//! both (applied by the binary after loading).
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! # domain = "download.example.org"   # no default; DOMAIN env var is the fallback
//! volume_root = "volumes"              # holds remote_files/, local_files/, nginx_conf/
//! mount_root = "/volumes/"             # where the proxy sees volume_root
//! # webhook = "http://localhost:8080/update"
//!
//! [digest]
//! backend = "local"          # "local" reads files here, "ssh" runs md5sum/sha256sum remotely
//! host = ""                  # ssh destination, e.g. "u123@u123.your-storagebox.de"
//! port = 23
//! identity = ".ssh/storage"
//! remote_base = "/home/"     # remote_files/ as seen on the ssh host
//!
//! [sync]
//! strict = false             # also compare sha256 of local copies
//! ```
//!
//! Unknown keys are rejected to catch typos early.
//!
//! ## Domain
//!
//! The domain has no default: published urls are absolute, and guessing a
//! host would publish broken links. [`Config::require_domain`] is the single
//! place that turns its absence into [`ConfigError::MissingDomain`].

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing domain")]
    MissingDomain,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `config.toml`.
///
/// All fields have defaults except `domain`. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Public host name, e.g. `download.versatiles.org`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Directory holding `remote_files/`, `local_files/` and `nginx_conf/`.
    pub volume_root: String,
    /// Path under which the proxy container mounts `volume_root`.
    pub mount_root: String,
    /// Url the proxy forwards `/update` requests to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub webhook: Option<String>,
    pub digest: DigestConfig,
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            domain: None,
            volume_root: "volumes".to_string(),
            mount_root: "/volumes/".to_string(),
            webhook: None,
            digest: DigestConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.domain.as_deref().is_some_and(|d| d.contains('/')) {
            return Err(ConfigError::Validation(
                "domain must be a host name without scheme or path".into(),
            ));
        }
        if self.volume_root.is_empty() {
            return Err(ConfigError::Validation(
                "volume_root must not be empty".into(),
            ));
        }
        if !self.mount_root.starts_with('/') {
            return Err(ConfigError::Validation(
                "mount_root must be an absolute path".into(),
            ));
        }
        if self.digest.backend == DigestBackend::Ssh && self.digest.host.is_empty() {
            return Err(ConfigError::Validation(
                "digest.host is required for the ssh backend".into(),
            ));
        }
        Ok(())
    }

    /// The configured domain, or [`ConfigError::MissingDomain`].
    pub fn require_domain(&self) -> Result<&str, ConfigError> {
        self.domain
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .ok_or(ConfigError::MissingDomain)
    }
}

/// Where digests are computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestBackend {
    #[default]
    Local,
    Ssh,
}

/// Digest backend settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DigestConfig {
    pub backend: DigestBackend,
    /// Ssh destination (`user@host`).
    pub host: String,
    pub port: u16,
    /// Private key passed to `ssh -i`.
    pub identity: String,
    /// Directory on the ssh host that corresponds to `remote_files/`.
    pub remote_base: String,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            backend: DigestBackend::Local,
            host: String::new(),
            port: 23,
            identity: ".ssh/storage".to_string(),
            remote_base: "/home/".to_string(),
        }
    }
}

/// Local cache synchronization settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    /// Compare sha256 of local copies in addition to their size.
    pub strict: bool,
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, falling back to stock defaults when it is absent.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let base = stock_defaults_value();
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# versatiles-download configuration
# ==================================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# Public host name. Published urls are https://<domain>/<file>.
# Required, either here, via --domain, or via the DOMAIN environment variable.
# domain = "download.example.org"

# Directory holding remote_files/ (release tree), local_files/ (cache and
# rendered pages) and nginx_conf/ (generated proxy config).
volume_root = "volumes"

# Path under which the proxy container sees volume_root. Every path in the
# generated config is rewritten from volume_root to this prefix.
mount_root = "/volumes/"

# Url the proxy forwards POST /update to.
# webhook = "http://localhost:8080/update"

# ---------------------------------------------------------------------------
# Digests
# ---------------------------------------------------------------------------
[digest]
# "local": read files in this process (one streaming pass for both digests).
# "ssh":   run md5sum/sha256sum on the storage host.
backend = "local"

# Ssh destination, e.g. "u123@u123.your-storagebox.de". Required for "ssh".
host = ""
port = 23
identity = ".ssh/storage"

# remote_files/ as seen on the ssh host.
remote_base = "/home/"

# ---------------------------------------------------------------------------
# Local cache
# ---------------------------------------------------------------------------
[sync]
# Also compare the sha256 of cached copies, not just their size.
strict = false
"##
}
