use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{ArticleStore, StoreError};
use crate::model::{Article, Feed};

/// Volatile [`ArticleStore`] holding everything in one list.
///
/// Articles are joined to feeds with [`Article::belongs_to`], so rows
/// seeded without a `feed_id` are matched by feed title.
#[derive(Debug, Default)]
pub struct MemoryStore {
    feeds: RwLock<Vec<Feed>>,
    articles: RwLock<Vec<Article>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts from an existing article list (including legacy title-joined rows).
    pub fn with_articles(articles: Vec<Article>) -> Self {
        Self {
            feeds: RwLock::new(Vec::new()),
            articles: RwLock::new(articles),
        }
    }
}

#[async_trait]
impl ArticleStore for MemoryStore {
    async fn load_articles(&self, feed: &Feed) -> Result<Vec<Article>, StoreError> {
        let articles = self.articles.read().await;
        Ok(articles
            .iter()
            .filter(|a| a.belongs_to(feed))
            .cloned()
            .collect())
    }

    async fn save_articles(&self, feed: &Feed, articles: &[Article]) -> Result<(), StoreError> {
        let mut stored = self.articles.write().await;
        stored.retain(|a| !a.belongs_to(feed));
        stored.extend(articles.iter().cloned().map(|mut a| {
            a.feed_id = Some(feed.id);
            a
        }));
        Ok(())
    }

    async fn load_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        Ok(self.feeds.read().await.clone())
    }

    async fn save_feeds(&self, feeds: &[Feed]) -> Result<(), StoreError> {
        *self.feeds.write().await = feeds.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    fn article(url: &str, feed_title: &str) -> Article {
        Article::new("t", "c", url, Utc::now(), feed_title, None)
    }

    #[tokio::test]
    async fn test_legacy_rows_join_by_title_and_get_claimed() {
        let feed = Feed::new("https://x/rss", "X", "");
        let other = Feed::new("https://y/rss", "Y", "");
        let store = MemoryStore::with_articles(vec![article("https://x/1", "X"), article("https://y/1", "Y")]);

        let loaded = store.load_articles(&feed).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].feed_id, None);

        store.save_articles(&feed, &loaded).await.unwrap();
        let reloaded = store.load_articles(&feed).await.unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].feed_id, Some(feed.id));

        // The other feed's rows are untouched
        assert_eq!(store.load_articles(&other).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_read_default_implementation() {
        let feed = Feed::new("https://x/rss", "X", "");
        let store = MemoryStore::new();
        let a = article("https://x/1", "X");
        store.save_articles(&feed, std::slice::from_ref(&a)).await.unwrap();

        assert!(store.mark_read(&feed, &a.id, true).await.unwrap());
        assert!(!store.mark_read(&feed, "nope", true).await.unwrap());
        assert!(store.load_articles(&feed).await.unwrap()[0].is_read);
    }
}
