//! # versatiles-download
//!
//! Catalogs a tree of large, immutable `.versatiles` release files and
//! publishes them: checksums, a local cache of the most popular releases, an
//! HTML index, per-product feeds and url lists, and a reverse-proxy config
//! that serves all of it.
//!
//! # Architecture: One Stateless Pipeline
//!
//! Every run recomputes everything from the release tree. The only state that
//! survives between runs is what lives next to the files themselves:
//!
//! ```text
//! 1. Scan     remote_files/  →  catalog           (every *.versatiles, sized)
//! 2. Hash     catalog        →  *.md5, *.sha256   (sidecars, computed once)
//! 3. Group    catalog        →  products          (slug, latest alias, older)
//! 4. Sync     products       →  local_files/      (latest of cached products)
//! 5. Render   products       →  index, feeds, url lists
//! 6. Publish  everything     →  nginx default.conf
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Walks the release tree and sizes every release file |
//! | [`hashes`] | Sidecar hash cache with byte-based progress |
//! | [`digest`] | Digest backends: local streaming or remote over ssh |
//! | [`group`] | Slug grouping and latest/older partitioning |
//! | [`sync`] | Name+size diff that mirrors releases into the local cache |
//! | [`collect`] | Flattens groups and artifacts into the publication list |
//! | [`render`] | Maud templates for the index page, RSS feeds and url lists |
//! | [`nginx`] | Exact-match proxy config for files and checksum responses |
//! | [`run`] | Orchestrates the stages, owns the volume layout and run lock |
//! | [`config`] | `config.toml` loading, validation and merging |
//! | [`types`] | `FileEntry`, `FileResponse` and digest types shared by all stages |
//! | [`naming`] | `<slug>[.<YYYYMMDD>].versatiles` filename convention |
//! | [`metadata`] | Product titles, descriptions and display order |
//! | [`output`] | CLI output formatting for every stage |
//!
//! # Design Decisions
//!
//! ## Sidecars Over a Manifest
//!
//! Digests are stored as `<file>.md5` / `<file>.sha256` next to each release
//! rather than in a central manifest. Releases are immutable and are copied
//! around by hand, and a sidecar travels with its file. Anyone can verify a
//! download with `md5sum -c`-style tooling without knowing about this crate.
//!
//! ## Latest as an Alias
//!
//! The newest dated release of a product is published twice: under its dated
//! name and under an undated alias (`osm.versatiles`). Links to the alias never
//! go stale, links to dated files never change meaning. See [`group`].
//!
//! ## Immutable Entries
//!
//! A [`types::FileEntry`] is never mutated after construction. Relocating it
//! into the local cache or remapping it for the proxy's mount point returns a
//! new entry, so one stage can never rewrite a path another stage holds.

pub mod collect;
pub mod config;
pub mod digest;
pub mod group;
pub mod hashes;
pub mod metadata;
pub mod naming;
pub mod nginx;
pub mod output;
pub mod render;
pub mod run;
pub mod scan;
pub mod sync;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
