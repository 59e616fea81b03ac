use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::fetcher::{FetchError, HttpFetcher};
use super::parser::{parse_feed_at, ParseError, ParsedFeed};
use crate::config::Config;
use crate::model::{Article, Feed};
use crate::storage::StoreError;
use crate::util::{strip_control_chars, validate_url, Clock, HostPolicy, SystemClock, UrlValidationError};

/// Errors from syncing, validating or managing a feed.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The document is not well-formed XML.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Well-formed, but not an RSS or Atom feed.
    #[error("Not a valid RSS or Atom feed")]
    InvalidFeed,

    #[error("Already subscribed to {0}")]
    DuplicateFeed(String),

    #[error("Feed not found: {0}")]
    NotFound(Uuid),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

impl From<ParseError> for FeedError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidFeed => FeedError::InvalidFeed,
            other => FeedError::Parse(other.to_string()),
        }
    }
}

#[derive(Debug)]
struct CachedFeed {
    fetched_at: DateTime<Utc>,
    articles: Vec<Article>,
}

/// Fetches and parses feeds, throttling repeat fetches of the same URL.
///
/// The last successful result per feed URL is kept in memory. A non-forced
/// fetch inside `min_update_interval` of it is answered from that copy with
/// no network I/O. There are no retries: a failed fetch is reported as is.
pub struct FeedSyncService {
    fetcher: Arc<dyn HttpFetcher>,
    clock: Arc<dyn Clock>,
    min_update_interval: Duration,
    host_policy: HostPolicy,
    cache: Mutex<HashMap<String, CachedFeed>>,
}

impl FeedSyncService {
    /// Default throttle between network fetches of one feed.
    pub const DEFAULT_MIN_UPDATE_INTERVAL_SECS: i64 = 3600;

    pub fn new(fetcher: Arc<dyn HttpFetcher>) -> Self {
        Self {
            fetcher,
            clock: Arc::new(SystemClock),
            min_update_interval: Duration::seconds(Self::DEFAULT_MIN_UPDATE_INTERVAL_SECS),
            host_policy: HostPolicy::default(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(fetcher: Arc<dyn HttpFetcher>, config: &Config) -> Self {
        Self::new(fetcher)
            .with_min_update_interval(config.min_update_interval())
            .with_host_policy(config.host_policy())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_min_update_interval(mut self, interval: Duration) -> Self {
        self.min_update_interval = interval;
        self
    }

    pub fn with_host_policy(mut self, policy: HostPolicy) -> Self {
        self.host_policy = policy;
        self
    }

    /// Returns the feed's current articles, tagged with the feed's id and title.
    ///
    /// Unless `force_refresh` is set, a result fetched less than
    /// `min_update_interval` ago is returned without touching the network.
    pub async fn fetch_articles(
        &self,
        feed: &Feed,
        force_refresh: bool,
    ) -> Result<Vec<Article>, FeedError> {
        let now = self.clock.now();

        if !force_refresh {
            let cache = self.cache.lock().await;
            if let Some(cached) = cache.get(&feed.url) {
                if now - cached.fetched_at < self.min_update_interval {
                    tracing::debug!(
                        feed = %feed.url,
                        fetched_at = %cached.fetched_at,
                        "Fetch throttled, serving cached articles"
                    );
                    return Ok(cached.articles.clone());
                }
            }
        }

        // Lock is not held across the download, so a forced refresh never waits on another fetch
        let parsed = self.download(&feed.url).await?;
        let articles: Vec<Article> = parsed
            .articles
            .into_iter()
            .map(|mut article| {
                article.feed_id = Some(feed.id);
                article.feed_title = feed.title.clone();
                article
            })
            .collect();

        tracing::debug!(feed = %feed.url, articles = articles.len(), "Fetched feed");

        self.cache.lock().await.insert(
            feed.url.clone(),
            CachedFeed {
                fetched_at: self.clock.now(),
                articles: articles.clone(),
            },
        );

        Ok(articles)
    }

    /// Fetches `url` once and builds a new [`Feed`] from its metadata.
    ///
    /// Nothing is cached or persisted. Title and description are stripped of
    /// control characters before they reach the model.
    pub async fn validate_feed(&self, url: &str) -> Result<Feed, FeedError> {
        let parsed = self.download(url).await?;
        let url = url.trim();
        let feed = Feed::new(
            url,
            strip_control_chars(&parsed.title).trim(),
            strip_control_chars(&parsed.description).trim(),
        );
        tracing::debug!(feed = %url, title = %feed.title, "Validated feed");
        Ok(feed)
    }

    /// Forgets the cached result for `url`.
    pub async fn invalidate(&self, url: &str) {
        self.cache.lock().await.remove(url);
    }

    async fn download(&self, url: &str) -> Result<ParsedFeed, FeedError> {
        let url = validate_url(url, self.host_policy)?;
        let bytes = self.fetcher.fetch(url.as_str()).await?;
        Ok(parse_feed_at(&bytes, self.clock.now())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::test_support::{rss, StubFetcher};
    use crate::util::ManualClock;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://example.com/feed.xml";

    fn service(fetcher: Arc<StubFetcher>) -> (FeedSyncService, ManualClock) {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
        let service = FeedSyncService::new(fetcher).with_clock(Arc::new(clock.clone()));
        (service, clock)
    }

    #[tokio::test]
    async fn test_fetch_tags_articles_with_feed() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, rss("Doc Title", &[("One", "https://example.com/1")]));
        let (service, _) = service(fetcher);

        let feed = Feed::new(URL, "My Name For It", "");
        let articles = service.fetch_articles(&feed, false).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].feed_id, Some(feed.id));
        assert_eq!(articles[0].feed_title, "My Name For It");
    }

    #[tokio::test]
    async fn test_throttle_serves_cached_within_interval() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, rss("T", &[("One", "https://example.com/1")]));
        let (service, clock) = service(fetcher.clone());
        let feed = Feed::new(URL, "T", "");

        service.fetch_articles(&feed, false).await.unwrap();
        fetcher.respond(
            URL,
            rss("T", &[("One", "https://example.com/1"), ("Two", "https://example.com/2")]),
        );

        clock.advance(Duration::minutes(59));
        let cached = service.fetch_articles(&feed, false).await.unwrap();
        assert_eq!(cached.len(), 1);
        assert_eq!(fetcher.calls(URL), 1);

        clock.advance(Duration::minutes(2));
        let fresh = service.fetch_articles(&feed, false).await.unwrap();
        assert_eq!(fresh.len(), 2);
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn test_unbounded_interval_from_config_throttles() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, rss("T", &[]));
        let config = Config {
            min_update_interval_secs: u64::MAX,
            ..Config::default()
        };
        let service = FeedSyncService::from_config(fetcher.clone(), &config);
        let feed = Feed::new(URL, "T", "");

        service.fetch_articles(&feed, false).await.unwrap();
        service.fetch_articles(&feed, false).await.unwrap();
        assert_eq!(fetcher.calls(URL), 1);
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_throttle() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, rss("T", &[]));
        let (service, _) = service(fetcher.clone());
        let feed = Feed::new(URL, "T", "");

        service.fetch_articles(&feed, false).await.unwrap();
        service.fetch_articles(&feed, true).await.unwrap();
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn test_invalidate_forgets_cached_result() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, rss("T", &[]));
        let (service, _) = service(fetcher.clone());
        let feed = Feed::new(URL, "T", "");

        service.fetch_articles(&feed, false).await.unwrap();
        service.invalidate(URL).await;
        service.fetch_articles(&feed, false).await.unwrap();
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.fail(URL, 503);
        let (service, _) = service(fetcher.clone());
        let feed = Feed::new(URL, "T", "");

        let err = service.fetch_articles(&feed, false).await.unwrap_err();
        assert!(matches!(err, FeedError::Fetch(FetchError::HttpStatus(503))));

        fetcher.respond(URL, rss("T", &[]));
        assert!(service.fetch_articles(&feed, false).await.is_ok());
        assert_eq!(fetcher.calls(URL), 2);
    }

    #[tokio::test]
    async fn test_validate_feed_builds_sanitized_feed() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(
            URL,
            b"<rss><channel><title>Clean\x07 Title</title><description>About \x1b[31mthings</description></channel></rss>".to_vec(),
        );
        let (service, _) = service(fetcher);

        let feed = service.validate_feed(URL).await.unwrap();
        assert_eq!(feed.url, URL);
        assert_eq!(feed.title, "Clean Title");
        assert_eq!(feed.description, "About things");
    }

    #[tokio::test]
    async fn test_validate_feed_errors() {
        let fetcher = Arc::new(StubFetcher::new());
        fetcher.respond(URL, b"<html><head><title>Page</title></head></html>".to_vec());
        fetcher.respond("https://example.com/broken", b"<rss><channel>".to_vec());
        let (service, _) = service(fetcher.clone());

        assert!(matches!(
            service.validate_feed("ftp://example.com/feed").await,
            Err(FeedError::InvalidUrl(_))
        ));
        assert!(matches!(
            service.validate_feed("http://127.0.0.1/feed").await,
            Err(FeedError::InvalidUrl(_))
        ));
        assert!(matches!(
            service.validate_feed(URL).await,
            Err(FeedError::InvalidFeed)
        ));
        assert!(matches!(
            service.validate_feed("https://example.com/broken").await,
            Err(FeedError::Parse(_))
        ));
        assert_eq!(fetcher.calls("ftp://example.com/feed"), 0);
    }
}
