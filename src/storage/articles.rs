use sqlx::QueryBuilder;
use uuid::Uuid;

use super::schema::SqliteStore;
use super::types::{ArticleRow, StoreError};
use crate::model::Article;

impl SqliteStore {
    // ========================================================================
    // Article Operations
    // ========================================================================

    /// Articles of one feed in their saved order.
    pub(crate) async fn select_articles(&self, feed_id: Uuid) -> Result<Vec<Article>, StoreError> {
        let rows: Vec<ArticleRow> = sqlx::query_as(
            r#"
                SELECT id, feed_id, title, content, url, publish_date, feed_title,
                       author, is_read, summary
                FROM articles
                WHERE feed_id = ?
                ORDER BY position
            "#,
        )
        .bind(feed_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Article::try_from).collect()
    }

    /// Replaces a feed's article set in a single transaction.
    ///
    /// Batch size of 50 keeps us well under SQLite's 999 parameter limit
    /// (11 columns * 50 = 550).
    pub(crate) async fn replace_articles(
        &self,
        feed_id: Uuid,
        articles: &[Article],
    ) -> Result<(), StoreError> {
        const BATCH_SIZE: usize = 50;
        let feed_id = feed_id.to_string();
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM articles WHERE feed_id = ?")
            .bind(&feed_id)
            .execute(&mut *tx)
            .await?;

        for (chunk_idx, chunk) in articles.chunks(BATCH_SIZE).enumerate() {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT OR REPLACE INTO articles (id, feed_id, title, content, url, publish_date, \
                 feed_title, author, is_read, summary, position) ",
            );

            builder.push_values(chunk.iter().enumerate(), |mut b, (i, article)| {
                let position = (chunk_idx * BATCH_SIZE + i) as i64;
                b.push_bind(&article.id)
                    .push_bind(&feed_id)
                    .push_bind(&article.title)
                    .push_bind(&article.content)
                    .push_bind(&article.url)
                    .push_bind(article.publish_date.timestamp_micros())
                    .push_bind(&article.feed_title)
                    .push_bind(&article.author)
                    .push_bind(article.is_read)
                    .push_bind(&article.summary)
                    .push_bind(position);
            });

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Returns whether a row was updated.
    pub(crate) async fn update_read(
        &self,
        feed_id: Uuid,
        article_id: &str,
        read: bool,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE articles SET is_read = ? WHERE feed_id = ? AND id = ?")
            .bind(read)
            .bind(feed_id.to_string())
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Returns whether a row was updated.
    pub(crate) async fn update_summary(
        &self,
        feed_id: Uuid,
        article_id: &str,
        summary: &str,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE articles SET summary = ? WHERE feed_id = ? AND id = ?")
            .bind(summary)
            .bind(feed_id.to_string())
            .bind(article_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::model::{Article, Feed};
    use crate::storage::{ArticleStore, SqliteStore, StoreError};
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    async fn store_with_feed() -> (SqliteStore, Feed) {
        let store = SqliteStore::open(":memory:").await.unwrap();
        let feed = Feed::new("https://example.com/rss", "Example", "");
        store.save_feeds(std::slice::from_ref(&feed)).await.unwrap();
        (store, feed)
    }

    fn test_article(feed: &Feed, slug: &str) -> Article {
        let mut article = Article::new(
            format!("Title {slug}"),
            "<p>body</p>",
            format!("https://example.com/{slug}"),
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
                + chrono::Duration::microseconds(123),
            &feed.title,
            Some("Jane".into()),
        );
        article.feed_id = Some(feed.id);
        article
    }

    #[tokio::test]
    async fn test_save_and_load_round_trip() {
        let (store, feed) = store_with_feed().await;
        let mut articles = vec![test_article(&feed, "b"), test_article(&feed, "a")];
        articles[0].is_read = true;
        articles[1].summary = Some("tl;dr".into());

        store.save_articles(&feed, &articles).await.unwrap();
        assert_eq!(store.load_articles(&feed).await.unwrap(), articles);
    }

    #[tokio::test]
    async fn test_save_replaces_previous_set() {
        let (store, feed) = store_with_feed().await;
        store
            .save_articles(&feed, &[test_article(&feed, "a"), test_article(&feed, "b")])
            .await
            .unwrap();
        store
            .save_articles(&feed, &[test_article(&feed, "c")])
            .await
            .unwrap();

        let loaded = store.load_articles(&feed).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, "https://example.com/c");
    }

    #[tokio::test]
    async fn test_load_unknown_feed_is_empty() {
        let (store, _) = store_with_feed().await;
        let other = Feed::new("https://other.example.com/rss", "Other", "");
        assert!(store.load_articles(&other).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_for_unsaved_feed_fails() {
        let (store, _) = store_with_feed().await;
        let other = Feed::new("https://other.example.com/rss", "Other", "");
        let result = store.save_articles(&other, &[test_article(&other, "x")]).await;
        assert!(matches!(result, Err(StoreError::Database(_))));
    }

    #[tokio::test]
    async fn test_mark_read_and_set_summary() {
        let (store, feed) = store_with_feed().await;
        let article = test_article(&feed, "a");
        store
            .save_articles(&feed, std::slice::from_ref(&article))
            .await
            .unwrap();

        assert!(store.mark_read(&feed, &article.id, true).await.unwrap());
        assert!(store.set_summary(&feed, &article.id, "short").await.unwrap());
        assert!(!store.mark_read(&feed, "missing", true).await.unwrap());

        let loaded = &store.load_articles(&feed).await.unwrap()[0];
        assert!(loaded.is_read);
        assert_eq!(loaded.summary.as_deref(), Some("short"));
    }

    #[tokio::test]
    async fn test_deleting_feed_cascades_articles() {
        let (store, feed) = store_with_feed().await;
        store
            .save_articles(&feed, &[test_article(&feed, "a")])
            .await
            .unwrap();

        store.save_feeds(&[]).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM articles")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
