//! Release filename convention.
//!
//! Release files follow `<slug>[.<YYYYMMDD>].versatiles`:
//!
//! - `osm.20240701.versatiles` → slug "osm", dated 20240701
//! - `hillshade-vectors.versatiles` → slug "hillshade-vectors", undated
//!
//! The slug groups releases into products. The date token lets a product
//! publish a stable alias (`osm.versatiles`) for its newest release while the
//! dated file stays reachable under its own name.

use regex::Regex;
use std::borrow::Cow;
use std::sync::LazyLock;

/// Only files with this suffix are cataloged.
pub const RELEASE_SUFFIX: &str = ".versatiles";

static DATE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\.(\d{8})\.").expect("date token pattern must compile"));

/// Result of parsing a release filename like `osm.20240701.versatiles`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseName<'a> {
    /// Everything before the first dot.
    pub slug: &'a str,
    /// The first embedded 8-digit token, if any.
    pub date: Option<&'a str>,
}

pub fn is_release(name: &str) -> bool {
    name.ends_with(RELEASE_SUFFIX)
}

/// Leading segment of a filename, up to the first `.`.
pub fn slug(name: &str) -> &str {
    name.find('.').map_or(name, |dot| &name[..dot])
}

pub fn parse_release_name(name: &str) -> ReleaseName<'_> {
    ReleaseName {
        slug: slug(name),
        date: DATE_TOKEN
            .captures(name)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str()),
    }
}

/// Replace the first `.<8 digits>.` token with a single dot.
///
/// Returns the input unchanged (borrowed) when no token is present.
pub fn strip_date(url: &str) -> Cow<'_, str> {
    DATE_TOKEN.replace(url, ".")
}

/// `20240701` → `2024-07-01`
pub fn format_date(token: &str) -> String {
    if token.len() == 8 && token.bytes().all(|b| b.is_ascii_digit()) {
        format!("{}-{}-{}", &token[..4], &token[4..6], &token[6..])
    } else {
        token.to_string()
    }
}
