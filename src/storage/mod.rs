//! Persistence of feeds and per-feed article sets.
//!
//! [`ArticleStore`] is the seam the refresh orchestrator writes through.
//! [`SqliteStore`] is the durable implementation, [`MemoryStore`] the
//! volatile one used by tests and dry runs.

mod articles;
mod feeds;
mod memory;
mod schema;
mod types;

use async_trait::async_trait;

use crate::model::{Article, Feed};

pub use memory::MemoryStore;
pub use schema::SqliteStore;
pub use types::StoreError;

/// Load/save of feeds and their articles.
///
/// `save_articles` replaces the whole set for a feed; callers merge first.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    async fn load_articles(&self, feed: &Feed) -> Result<Vec<Article>, StoreError>;

    async fn save_articles(&self, feed: &Feed, articles: &[Article]) -> Result<(), StoreError>;

    async fn load_feeds(&self) -> Result<Vec<Feed>, StoreError>;

    async fn save_feeds(&self, feeds: &[Feed]) -> Result<(), StoreError>;

    /// Sets the read flag of one article. Returns whether it was found.
    async fn mark_read(&self, feed: &Feed, article_id: &str, read: bool) -> Result<bool, StoreError> {
        let mut articles = self.load_articles(feed).await?;
        let Some(article) = articles.iter_mut().find(|a| a.id == article_id) else {
            return Ok(false);
        };
        article.is_read = read;
        self.save_articles(feed, &articles).await?;
        Ok(true)
    }

    /// Stores a generated summary on one article. Returns whether it was found.
    async fn set_summary(
        &self,
        feed: &Feed,
        article_id: &str,
        summary: &str,
    ) -> Result<bool, StoreError> {
        let mut articles = self.load_articles(feed).await?;
        let Some(article) = articles.iter_mut().find(|a| a.id == article_id) else {
            return Ok(false);
        };
        article.summary = Some(summary.to_string());
        self.save_articles(feed, &articles).await?;
        Ok(true)
    }
}

#[async_trait]
impl ArticleStore for SqliteStore {
    async fn load_articles(&self, feed: &Feed) -> Result<Vec<Article>, StoreError> {
        self.select_articles(feed.id).await
    }

    async fn save_articles(&self, feed: &Feed, articles: &[Article]) -> Result<(), StoreError> {
        self.replace_articles(feed.id, articles).await
    }

    async fn load_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        self.select_feeds().await
    }

    async fn save_feeds(&self, feeds: &[Feed]) -> Result<(), StoreError> {
        self.replace_feeds(feeds).await
    }

    async fn mark_read(&self, feed: &Feed, article_id: &str, read: bool) -> Result<bool, StoreError> {
        self.update_read(feed.id, article_id, read).await
    }

    async fn set_summary(
        &self,
        feed: &Feed,
        article_id: &str,
        summary: &str,
    ) -> Result<bool, StoreError> {
        self.update_summary(feed.id, article_id, summary).await
    }
}
