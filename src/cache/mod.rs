//! On-disk artifact caching.
//!
//! - [`ArtifactCache`]: byte payloads with TTL, size caps and LRU eviction
//! - [`SummaryCache`], [`InsightCache`], [`DigestCache`]: typed facades over
//!   one namespace each, with cache-or-generate lookups

mod artifact;
mod artifacts;

pub use artifact::{ArtifactCache, CacheEntry, CacheError, CacheLimits, CacheStats, INDEX_FILE};
pub use artifacts::{
    digest_key, ArticleInsight, ArtifactKind, DailyDigest, DigestCache, DigestHighlight,
    GeneratorError, InsightCache, InsightGenerator, SummaryCache, SummaryGenerator,
};
