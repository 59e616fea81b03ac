//! Typed caches for generated artifacts.
//!
//! Each artifact kind lives in its own [`ArtifactCache`] namespace. Lookups
//! go cache → generator → best-effort write back; a broken cache only costs
//! a regeneration, never a failed request.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::artifact::{ArtifactCache, CacheError, CacheLimits};
use crate::model::Article;

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Generator unavailable: {0}")]
    Unavailable(String),

    #[error("Generation failed: {0}")]
    Failed(String),
}

/// Produces a short plain-text summary of one article.
#[async_trait]
pub trait SummaryGenerator: Send + Sync {
    async fn summarize(&self, article: &Article) -> Result<String, GeneratorError>;
}

/// Produces structured insights per article and a digest per day.
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn insight(&self, article: &Article) -> Result<ArticleInsight, GeneratorError>;

    async fn digest(
        &self,
        day: NaiveDate,
        articles: &[Article],
    ) -> Result<DailyDigest, GeneratorError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInsight {
    pub summary: String,
    pub key_points: Vec<String>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestHighlight {
    pub article_id: String,
    pub title: String,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyDigest {
    pub date: NaiveDate,
    pub headline: String,
    pub highlights: Vec<DigestHighlight>,
    pub article_count: usize,
}

/// The cache namespaces, one directory each under the cache root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Summary,
    Insight,
    Digest,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [Self::Summary, Self::Insight, Self::Digest];

    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Summary => "summaries",
            Self::Insight => "insights",
            Self::Digest => "digests",
        }
    }

    pub fn dir(self, root: &Path) -> PathBuf {
        root.join(self.dir_name())
    }

    pub async fn open(self, root: &Path, limits: CacheLimits) -> Result<ArtifactCache, CacheError> {
        ArtifactCache::open(self.dir(root), limits).await
    }
}

/// Cache key of the digest for `day`.
pub fn digest_key(day: NaiveDate) -> String {
    format!("digest-{}", day.format("%Y-%m-%d"))
}

// ============================================================================
// Facades
// ============================================================================

/// Plain-text summaries keyed by article id.
#[derive(Debug, Clone)]
pub struct SummaryCache {
    cache: ArtifactCache,
}

impl SummaryCache {
    pub fn new(cache: ArtifactCache) -> Self {
        Self { cache }
    }

    pub fn inner(&self) -> &ArtifactCache {
        &self.cache
    }

    pub async fn get(&self, article: &Article) -> Option<String> {
        let bytes = self.cache.read(&article.id).await?;
        match String::from_utf8(bytes) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(key = %article.id, error = %e, "Cached summary is not UTF-8, discarding");
                self.cache.remove(&article.id).await;
                None
            }
        }
    }

    pub async fn get_or_generate(
        &self,
        article: &Article,
        generator: &dyn SummaryGenerator,
    ) -> Result<String, GeneratorError> {
        if let Some(summary) = self.get(article).await {
            return Ok(summary);
        }
        let summary = generator.summarize(article).await?;
        store_best_effort(&self.cache, &article.id, summary.as_bytes()).await;
        Ok(summary)
    }
}

/// JSON [`ArticleInsight`] records keyed by article id.
#[derive(Debug, Clone)]
pub struct InsightCache {
    cache: ArtifactCache,
}

impl InsightCache {
    pub fn new(cache: ArtifactCache) -> Self {
        Self { cache }
    }

    pub fn inner(&self) -> &ArtifactCache {
        &self.cache
    }

    pub async fn get(&self, article: &Article) -> Option<ArticleInsight> {
        read_json(&self.cache, &article.id).await
    }

    pub async fn get_or_generate(
        &self,
        article: &Article,
        generator: &dyn InsightGenerator,
    ) -> Result<ArticleInsight, GeneratorError> {
        if let Some(insight) = self.get(article).await {
            return Ok(insight);
        }
        let insight = generator.insight(article).await?;
        write_json(&self.cache, &article.id, &insight).await;
        Ok(insight)
    }
}

/// JSON [`DailyDigest`] records keyed by `digest-YYYY-MM-DD`.
#[derive(Debug, Clone)]
pub struct DigestCache {
    cache: ArtifactCache,
}

impl DigestCache {
    pub fn new(cache: ArtifactCache) -> Self {
        Self { cache }
    }

    pub fn inner(&self) -> &ArtifactCache {
        &self.cache
    }

    pub async fn get(&self, day: NaiveDate) -> Option<DailyDigest> {
        read_json(&self.cache, &digest_key(day)).await
    }

    pub async fn get_or_generate(
        &self,
        day: NaiveDate,
        articles: &[Article],
        generator: &dyn InsightGenerator,
    ) -> Result<DailyDigest, GeneratorError> {
        if let Some(digest) = self.get(day).await {
            return Ok(digest);
        }
        let digest = generator.digest(day, articles).await?;
        write_json(&self.cache, &digest_key(day), &digest).await;
        Ok(digest)
    }
}

async fn read_json<T: DeserializeOwned>(cache: &ArtifactCache, key: &str) -> Option<T> {
    let bytes = cache.read(key).await?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Cached artifact is corrupt, discarding");
            cache.remove(key).await;
            None
        }
    }
}

async fn write_json<T: Serialize>(cache: &ArtifactCache, key: &str, value: &T) {
    match serde_json::to_vec(value) {
        Ok(bytes) => store_best_effort(cache, key, &bytes).await,
        Err(e) => tracing::warn!(key = %key, error = %e, "Failed to serialize artifact"),
    }
}

async fn store_best_effort(cache: &ArtifactCache, key: &str, bytes: &[u8]) {
    if let Err(e) = cache.write(key, bytes).await {
        tracing::warn!(key = %key, error = %e, "Failed to cache artifact");
    }
}
