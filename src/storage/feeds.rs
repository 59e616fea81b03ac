use sqlx::QueryBuilder;
use std::collections::HashSet;

use super::schema::SqliteStore;
use super::types::{FeedRow, StoreError};
use crate::model::Feed;

impl SqliteStore {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// All feeds in their saved order.
    pub(crate) async fn select_feeds(&self) -> Result<Vec<Feed>, StoreError> {
        let rows: Vec<FeedRow> = sqlx::query_as(
            r#"
                SELECT id, title, url, description, icon_name, icon_color
                FROM feeds
                ORDER BY position, rowid
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Feed::try_from).collect()
    }

    /// Replaces the feed list: upserts every feed in order, deletes the rest.
    ///
    /// Deleted feeds take their articles with them (ON DELETE CASCADE).
    pub(crate) async fn replace_feeds(&self, feeds: &[Feed]) -> Result<(), StoreError> {
        const BATCH_SIZE: usize = 100;
        let mut tx = self.pool.begin().await?;

        // Diff in Rust so the delete binds at most BATCH_SIZE ids per statement
        let keep: HashSet<String> = feeds.iter().map(|f| f.id.to_string()).collect();
        let stored: Vec<String> = sqlx::query_scalar("SELECT id FROM feeds")
            .fetch_all(&mut *tx)
            .await?;
        let stale: Vec<String> = stored.into_iter().filter(|id| !keep.contains(id)).collect();

        for chunk in stale.chunks(BATCH_SIZE) {
            let mut delete: QueryBuilder<sqlx::Sqlite> =
                QueryBuilder::new("DELETE FROM feeds WHERE id IN (");
            let mut separated = delete.separated(", ");
            for id in chunk {
                separated.push_bind(id);
            }
            separated.push_unseparated(")");
            delete.build().execute(&mut *tx).await?;
        }

        for (chunk_idx, chunk) in feeds.chunks(BATCH_SIZE).enumerate() {
            let mut builder: QueryBuilder<sqlx::Sqlite> = QueryBuilder::new(
                "INSERT INTO feeds (id, title, url, description, icon_name, icon_color, position) ",
            );

            builder.push_values(chunk.iter().enumerate(), |mut b, (i, feed)| {
                let position = (chunk_idx * BATCH_SIZE + i) as i64;
                b.push_bind(feed.id.to_string())
                    .push_bind(&feed.title)
                    .push_bind(&feed.url)
                    .push_bind(&feed.description)
                    .push_bind(&feed.icon_name)
                    .push_bind(&feed.icon_color)
                    .push_bind(position);
            });

            builder.push(
                " ON CONFLICT(id) DO UPDATE SET title = excluded.title, \
                 description = excluded.description, icon_name = excluded.icon_name, \
                 icon_color = excluded.icon_color, position = excluded.position",
            );

            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
