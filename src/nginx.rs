//! Reverse-proxy configuration.
//!
//! Stage 7 of the publishing pipeline. The proxy serves nothing by directory
//! listing: every published url gets an exact-match location.
//!
//! ```text
//! location = /osm.versatiles {
//!     alias /volumes/local_files/osm.20240701.versatiles;
//! }
//! location = /osm.versatiles.md5 {
//!     default_type text/plain;
//!     return 200 "5eb63bbbe01eeed093cb22bb8f5acdc3 osm.versatiles\n";
//! }
//! ```
//!
//! Files become `alias` locations, checksum responses become inline
//! `return 200` bodies. Both lists are sorted by url so the file is stable
//! across runs with the same catalog. Urls and paths containing whitespace or
//! config syntax (`;`, `{`, quotes) are written as quoted strings.

use crate::types::{FileEntry, FileResponse};
use std::fs;
use std::io;
use std::path::Path;
use tracing::info;

/// `value` as a single nginx token, quoted when it would not parse bare.
fn token(value: &str) -> String {
    let bare = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/-._~+@:,=%".contains(c));
    if bare {
        value.to_string()
    } else {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    }
}

/// Render the `server` block for `files` and `responses`.
pub fn build_nginx_conf(
    files: &[FileEntry],
    responses: &[FileResponse],
    webhook: Option<&str>,
) -> String {
    let mut files: Vec<&FileEntry> = files.iter().collect();
    files.sort_by(|a, b| a.url().cmp(b.url()));
    let mut responses: Vec<&FileResponse> = responses.iter().collect();
    responses.sort_by(|a, b| a.url.cmp(&b.url));

    let mut lines = vec![
        "# Generated by versatiles-download. Changes are overwritten on the next run.".to_string(),
        "server {".to_string(),
        "\tlisten 80 default_server;".to_string(),
        "\tlisten [::]:80 default_server;".to_string(),
        String::new(),
        "\tlocation = / {".to_string(),
        "\t\treturn 302 /index.html;".to_string(),
        "\t}".to_string(),
    ];

    if let Some(webhook) = webhook {
        lines.push(String::new());
        lines.push("\tlocation = /update {".to_string());
        lines.push(format!("\t\tproxy_pass {webhook};"));
        lines.push("\t}".to_string());
    }

    if !files.is_empty() {
        lines.push(String::new());
    }
    for file in files {
        lines.push(format!("\tlocation = {} {{", token(&format!("/{}", file.url()))));
        lines.push(format!("\t\talias {};", token(&file.path().to_string_lossy())));
        lines.push("\t}".to_string());
    }

    if !responses.is_empty() {
        lines.push(String::new());
    }
    for response in responses {
        lines.push(format!("\tlocation = {} {{", token(&response.url)));
        lines.push("\t\tdefault_type text/plain;".to_string());
        lines.push(format!("\t\treturn 200 \"{}\";", response.content));
        lines.push("\t}".to_string());
    }

    lines.push("}".to_string());
    lines.join("\n") + "\n"
}

/// Write the config to `path`, creating parent directories.
pub fn generate_nginx_conf(
    files: &[FileEntry],
    responses: &[FileResponse],
    webhook: Option<&str>,
    path: &Path,
) -> io::Result<FileEntry> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, build_nginx_conf(files, responses, webhook))?;
    info!(
        path = %path.display(),
        files = files.len(),
        responses = responses.len(),
        "proxy config written"
    );
    FileEntry::from_disk(path)
}
