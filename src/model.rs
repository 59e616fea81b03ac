//! Canonical data model shared by the parser, the sync service and the stores.
//!
//! Every feed dialect is normalized into [`Article`] before it leaves the
//! parser, so the rest of the crate never sees RSS or Atom specifics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ============================================================================
// Article
// ============================================================================

/// One entry parsed from a feed, keyed by its canonical URL.
///
/// `id` is derived from the URL, so re-ingesting the same document yields the
/// same ids. `is_read` and `summary` are user/generator state and survive
/// re-fetches (see [`crate::feed::merge_articles`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: String,
    pub title: String,
    /// Raw HTML body (falls back to the item description).
    pub content: String,
    /// Canonical link; the dedup key. Empty when the item had no link.
    pub url: String,
    pub publish_date: DateTime<Utc>,
    pub feed_title: String,
    /// `None` for legacy rows; `feed_title` is the join key then.
    pub feed_id: Option<Uuid>,
    pub author: Option<String>,
    pub is_read: bool,
    pub summary: Option<String>,
}

impl Article {
    /// Builds an unread, unsummarized article with a derived id.
    pub fn new(
        title: impl Into<String>,
        content: impl Into<String>,
        url: impl Into<String>,
        publish_date: DateTime<Utc>,
        feed_title: impl Into<String>,
        author: Option<String>,
    ) -> Self {
        let title = title.into();
        let url = url.into();
        let content = content.into();
        let id = article_id(&url, &title, &content);
        Self {
            id,
            title,
            content,
            url,
            publish_date,
            feed_title: feed_title.into(),
            feed_id: None,
            author,
            is_read: false,
            summary: None,
        }
    }

    /// Key used to detect the same article across fetches.
    ///
    /// Link-less items all share the empty URL, so they fall back to their id.
    pub fn dedup_key(&self) -> &str {
        if self.url.is_empty() {
            &self.id
        } else {
            &self.url
        }
    }

    /// Whether this article belongs to `feed`, honouring the legacy title join.
    pub fn belongs_to(&self, feed: &Feed) -> bool {
        match self.feed_id {
            Some(id) => id == feed.id,
            None => self.feed_title == feed.title,
        }
    }
}

/// Stable article id: hex SHA-256 of the URL.
///
/// Items without a link hash `title|content` instead. The date is left out:
/// an undated item gets the fetch time, which changes on every parse.
pub fn article_id(url: &str, title: &str, content: &str) -> String {
    let url = url.trim();
    let input = if url.is_empty() {
        format!("{}|{}", title, content)
    } else {
        url.to_string()
    };
    let hash = Sha256::digest(input.as_bytes());
    format!("{:x}", hash)
}

// ============================================================================
// Feed
// ============================================================================

/// A subscribed source URL plus display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feed {
    pub id: Uuid,
    pub title: String,
    /// Fetch target and identity key for duplicate detection. Never changes.
    pub url: String,
    pub description: String,
    pub icon_name: Option<String>,
    pub icon_color: Option<String>,
}

impl Feed {
    /// Creates a feed with a fresh random id.
    pub fn new(
        url: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            url: url.into(),
            description: description.into(),
            icon_name: None,
            icon_color: None,
        }
    }

    /// True when `url` points at this feed (ignores surrounding whitespace and a trailing slash).
    pub fn has_url(&self, url: &str) -> bool {
        normalize_feed_url(&self.url) == normalize_feed_url(url)
    }
}

fn normalize_feed_url(url: &str) -> &str {
    url.trim().trim_end_matches('/')
}

// ============================================================================
// Loading state
// ============================================================================

/// Per-feed refresh status, held in memory only.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FeedLoadingState {
    #[default]
    Idle,
    Loading,
    Loaded,
    Failed(String),
}

impl FeedLoadingState {
    pub fn is_loading(&self) -> bool {
        matches!(self, FeedLoadingState::Loading)
    }
}
