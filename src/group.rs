//! Product grouping.
//!
//! Stage 3 of the publishing pipeline. Release files are bucketed by slug
//! into [`Group`]s, and each group picks its latest release.
//!
//! ## Latest selection
//!
//! Members are sorted by name descending, so with `YYYYMMDD` date tokens the
//! newest release comes first. That first member is then published twice:
//!
//! | Member | Url | Where it ends up |
//! |---|---|---|
//! | `osm.20240701.versatiles` | `osm.20240701.versatiles` | `older[0]` |
//! | (alias of the above) | `osm.versatiles` | `latest` |
//! | `osm.20240325.versatiles` | `osm.20240325.versatiles` | `older[1]` |
//!
//! The alias is a clone with the date token stripped from its url. When the
//! name has no date token (e.g. `hillshade-vectors.versatiles`), stripping
//! changes nothing and the file itself moves from `older` to `latest`.
//!
//! Groups are ordered by their metadata display order; ties keep first-seen
//! order.

use crate::metadata;
use crate::naming;
use crate::types::{FileEntry, FileResponse, MissingHashError};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Group {
    pub slug: String,
    pub title: String,
    /// Trusted HTML.
    pub description: String,
    pub order: u32,
    /// Mirror `latest` into the local cache.
    pub cache_locally: bool,
    pub latest: Option<FileEntry>,
    /// Name descending.
    pub older: Vec<FileEntry>,
}

impl Group {
    fn new(slug: &str) -> Self {
        let info = metadata::resolve(slug);
        Self {
            slug: slug.to_string(),
            title: info.title,
            description: info.description,
            order: info.order,
            cache_locally: info.cache_locally,
            latest: None,
            older: Vec::new(),
        }
    }

    /// True when `latest` is an undated alias of the head of `older`.
    pub fn is_alias(&self) -> bool {
        self.latest
            .as_ref()
            .is_some_and(|latest| latest.url() != latest.name())
    }

    /// Every published entry: latest first, then older.
    pub fn releases(&self) -> impl Iterator<Item = &FileEntry> {
        self.latest.iter().chain(self.older.iter())
    }

    /// Checksum responses: every older file, then latest; md5 before sha256.
    pub fn responses(&self) -> Result<Vec<FileResponse>, MissingHashError> {
        let mut responses = Vec::new();
        for file in self.older.iter().chain(self.latest.iter()) {
            responses.push(file.md5_response()?);
            responses.push(file.sha256_response()?);
        }
        Ok(responses)
    }

    fn promote_latest(&mut self) {
        let Some(head) = self.older.first() else {
            return;
        };
        let stripped = naming::strip_date(head.url()).into_owned();
        if stripped != head.url() {
            self.latest = Some(head.with_url(stripped));
        } else {
            self.latest = Some(self.older.remove(0));
        }
    }
}

/// Bucket files into groups by slug and select each group's latest release.
pub fn group_files(files: Vec<FileEntry>) -> Vec<Group> {
    let mut groups: Vec<Group> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for file in files {
        let slug = naming::slug(file.name()).to_string();
        let i = *index.entry(slug).or_insert_with_key(|slug| {
            groups.push(Group::new(slug));
            groups.len() - 1
        });
        groups[i].older.push(file);
    }

    groups.sort_by_key(|g| g.order);
    for group in &mut groups {
        group.older.sort_by(|a, b| b.name().cmp(a.name()));
        group.promote_latest();
        debug!(
            slug = %group.slug,
            latest = group.latest.as_ref().map(|f| f.url()),
            older = group.older.len(),
            "grouped"
        );
    }
    groups
}
