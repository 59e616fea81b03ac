use chrono::DateTime;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

use crate::model::{Article, Feed};

// ============================================================================
// Error Types
// ============================================================================

/// Storage errors with user-friendly messages
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another process has the database locked
    #[error("Another instance of feedsync appears to be running. Please close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// A stored row could not be converted back into the model
    #[error("Corrupt stored record: {0}")]
    Corrupt(String),

    /// Generic database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        let error_string = err.to_string().to_lowercase();

        // SQLITE_BUSY (5), SQLITE_LOCKED (6), SQLITE_CANTOPEN (14)
        if error_string.contains("database is locked")
            || error_string.contains("database table is locked")
            || error_string.contains("sqlite_busy")
            || error_string.contains("sqlite_locked")
            || error_string.contains("unable to open database file")
        {
            return StoreError::InstanceLocked;
        }

        StoreError::Database(err)
    }
}

// ============================================================================
// Row Types
// ============================================================================

#[derive(Debug, FromRow)]
pub(crate) struct FeedRow {
    pub id: String,
    pub title: String,
    pub url: String,
    pub description: String,
    pub icon_name: Option<String>,
    pub icon_color: Option<String>,
}

impl TryFrom<FeedRow> for Feed {
    type Error = StoreError;

    fn try_from(row: FeedRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id)
            .map_err(|e| StoreError::Corrupt(format!("feed id {:?}: {}", row.id, e)))?;
        Ok(Feed {
            id,
            title: row.title,
            url: row.url,
            description: row.description,
            icon_name: row.icon_name,
            icon_color: row.icon_color,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ArticleRow {
    pub id: String,
    pub feed_id: String,
    pub title: String,
    pub content: String,
    pub url: String,
    /// Microseconds since the Unix epoch
    pub publish_date: i64,
    pub feed_title: String,
    pub author: Option<String>,
    pub is_read: bool,
    pub summary: Option<String>,
}

impl TryFrom<ArticleRow> for Article {
    type Error = StoreError;

    fn try_from(row: ArticleRow) -> Result<Self, Self::Error> {
        let feed_id = Uuid::parse_str(&row.feed_id)
            .map_err(|e| StoreError::Corrupt(format!("article feed id {:?}: {}", row.feed_id, e)))?;
        let publish_date = DateTime::from_timestamp_micros(row.publish_date).ok_or_else(|| {
            StoreError::Corrupt(format!("article publish date {}", row.publish_date))
        })?;
        Ok(Article {
            id: row.id,
            title: row.title,
            content: row.content,
            url: row.url,
            publish_date,
            feed_title: row.feed_title,
            feed_id: Some(feed_id),
            author: row.author,
            is_read: row.is_read,
            summary: row.summary,
        })
    }
}
