//! Rendered publication artifacts.
//!
//! Stage 5 of the publishing pipeline. Every run re-renders three kinds of
//! files into the local cache directory:
//!
//! | Artifact | Url | Content |
//! |---|---|---|
//! | Index page | `index.html` | every product with its latest and older releases |
//! | Feed | `feed-<slug>.xml` | RSS 2.0, one item per release, newest first |
//! | Url list | `urllist_<slug>.tsv` | `TsvHttpData-1.0` list for the latest release |
//!
//! HTML and RSS are built with maud, so every value is escaped except product
//! descriptions, which come from the compiled-in metadata table and are
//! trusted.
//!
//! The url list is the format cloud transfer services ingest: one line per
//! file with its absolute url, size and base64 md5.

use crate::group::Group;
use crate::naming;
use crate::types::{FileEntry, MissingHashError};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use maud::{DOCTYPE, Markup, PreEscaped, html};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("group \"{0}\" has no latest release")]
    NoLatest(String),
    #[error(transparent)]
    MissingHash(#[from] MissingHashError),
    #[error("invalid md5 hex {0:?}")]
    InvalidHash(String),
}

const CSS: &str = r#"
body { font-family: system-ui, sans-serif; max-width: 60rem; margin: 2rem auto; padding: 0 1rem; color: #222; }
h1 { font-weight: 600; }
section { margin-bottom: 2.5rem; }
.description { color: #555; }
.latest { font-size: 1.1rem; }
.size, .checksums { color: #777; font-size: 0.9rem; }
.checksums a { color: inherit; }
ul.older { padding-left: 1.2rem; }
"#;

const TITLE: &str = "VersaTiles Download";

fn base_document(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                meta name="viewport" content="width=device-width, initial-scale=1.0";
                title { (title) }
                style { (PreEscaped(CSS)) }
            }
            body {
                (content)
            }
        }
    }
}

fn file_link(file: &FileEntry) -> Markup {
    html! {
        a href={ "/" (file.url()) } { (file.url()) }
        " "
        span.size { "(" (file.size_string()) ")" }
        @if file.hashes().is_some() {
            " "
            span.checksums {
                a href={ "/" (file.url()) ".md5" } { "md5" }
                " "
                a href={ "/" (file.url()) ".sha256" } { "sha256" }
            }
        }
    }
}

fn render_group(group: &Group) -> Markup {
    html! {
        section id=(group.slug) {
            h2 { (group.title) }
            @if !group.description.is_empty() {
                p.description { (PreEscaped(&group.description)) }
            }
            @if let Some(latest) = &group.latest {
                p.latest { "Latest: " (file_link(latest)) }
            }
            @if !group.older.is_empty() {
                details {
                    summary { "All releases (" (group.older.len()) ")" }
                    ul.older {
                        @for file in &group.older {
                            li { (file_link(file)) }
                        }
                    }
                }
            }
            p {
                a href={ "/feed-" (group.slug) ".xml" } { "RSS feed" }
                " · "
                a href={ "/urllist_" (group.slug) ".tsv" } { "URL list" }
            }
        }
    }
}

/// The index page listing every group.
pub fn render_index(groups: &[Group]) -> Markup {
    base_document(
        TITLE,
        html! {
            h1 { (TITLE) }
            @for group in groups {
                (render_group(group))
            }
        },
    )
}

/// RSS 2.0 feed of one group, latest release first.
pub fn render_feed(group: &Group, base_url: &str) -> String {
    let channel = html! {
        rss version="2.0" {
            channel {
                title { (TITLE) ": " (group.title) }
                link { (base_url) }
                description { (group.description) }
                @for file in group.releases() {
                    item {
                        title { (file.url()) }
                        @if let Some(date) = naming::parse_release_name(file.name()).date {
                            category { (naming::format_date(date)) }
                        }
                        link { (base_url) (file.url()) }
                        guid isPermaLink="false" { (file.url()) ":" (file.name()) }
                        enclosure url={ (base_url) (file.url()) } length=(file.size()) type="application/octet-stream" {}
                    }
                }
            }
        }
    };
    format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{}\n",
        channel.into_string()
    )
}

/// `TsvHttpData-1.0` list with the latest release of `group`.
pub fn render_url_list(group: &Group, base_url: &str) -> Result<String, RenderError> {
    let latest = group
        .latest
        .as_ref()
        .ok_or_else(|| RenderError::NoLatest(group.slug.clone()))?;
    let md5 = latest.md5()?;
    let bytes = hex::decode(md5).map_err(|_| RenderError::InvalidHash(md5.to_string()))?;
    Ok(format!(
        "TsvHttpData-1.0\n{}{}\t{}\t{}\n",
        base_url,
        latest.url(),
        latest.size(),
        URL_SAFE.encode(bytes)
    ))
}

fn write_artifact(dir: &Path, url: &str, content: &str) -> Result<FileEntry, RenderError> {
    let path = dir.join(url);
    fs::write(&path, content)?;
    Ok(FileEntry::from_disk(path)?.with_url(url))
}

/// Write `index.html` into `dir`.
pub fn generate_html(groups: &[Group], dir: &Path) -> Result<FileEntry, RenderError> {
    let entry = write_artifact(dir, "index.html", &render_index(groups).into_string())?;
    info!(path = %entry.path().display(), "index written");
    Ok(entry)
}

/// Write one `feed-<slug>.xml` per group into `dir`.
pub fn generate_feeds(
    groups: &[Group],
    dir: &Path,
    base_url: &str,
) -> Result<Vec<FileEntry>, RenderError> {
    let feeds = groups
        .iter()
        .map(|g| write_artifact(dir, &format!("feed-{}.xml", g.slug), &render_feed(g, base_url)))
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = feeds.len(), "feeds written");
    Ok(feeds)
}

/// Write one `urllist_<slug>.tsv` per group into `dir`.
pub fn generate_url_lists(
    groups: &[Group],
    dir: &Path,
    base_url: &str,
) -> Result<Vec<FileEntry>, RenderError> {
    let lists = groups
        .iter()
        .map(|g| {
            let content = render_url_list(g, base_url)?;
            write_artifact(dir, &format!("urllist_{}.tsv", g.slug), &content)
        })
        .collect::<Result<Vec<_>, _>>()?;
    info!(count = lists.len(), "url lists written");
    Ok(lists)
}
