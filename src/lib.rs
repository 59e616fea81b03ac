//! Feed synchronization and artifact caching for a personal RSS/Atom reader.
//!
//! - [`feed`]: parse, fetch, throttle, merge and refresh feeds
//! - [`cache`]: on-disk TTL/LRU cache for generated summaries, insights and digests
//! - [`storage`]: the [`ArticleStore`](storage::ArticleStore) seam with SQLite and in-memory backends
//! - [`config`]: optional TOML configuration

pub mod cache;
pub mod config;
pub mod feed;
pub mod model;
pub mod storage;
pub mod util;
