//! Feed synchronization: parsing, fetching, merging and refresh orchestration.
//!
//! - **Parsing**: [`parse_feed`] turns RSS 2.0, RSS 1.0 or Atom bytes into
//!   [`Article`](crate::model::Article)s; [`parse_date`] normalizes feed dates
//! - **Fetching**: [`HttpFetcher`] is the network seam, [`ReqwestFetcher`] the
//!   production implementation
//! - **Sync**: [`FeedSyncService`] fetches + parses with a per-feed throttle
//! - **Refresh**: [`FeedRefreshOrchestrator`] fans out over feeds, merges with
//!   stored articles (preserving read state) and persists
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use feedsync::feed::{FeedRefreshOrchestrator, FeedSyncService, ReqwestFetcher};
//! use feedsync::storage::MemoryStore;
//!
//! # async fn run() -> Result<(), feedsync::feed::FeedError> {
//! let fetcher = ReqwestFetcher::new(reqwest::Client::new(), Duration::from_secs(30), 10 << 20);
//! let sync = Arc::new(FeedSyncService::new(Arc::new(fetcher)));
//! let orchestrator = FeedRefreshOrchestrator::new(sync, Arc::new(MemoryStore::new()));
//!
//! let feed = orchestrator.add_feed("https://blog.rust-lang.org/feed.xml").await?;
//! let added = orchestrator.refresh_one(&feed, false).await?;
//! println!("{added} new articles");
//! # Ok(())
//! # }
//! ```

mod date;
mod fetcher;
mod merge;
mod parser;
mod refresh;
mod sync;

pub use date::parse_date;
pub use fetcher::{FetchError, HttpFetcher, ReqwestFetcher};
pub use merge::{merge_articles, sort_by_publish_date, MergeOutcome};
pub use parser::{parse_feed, parse_feed_at, ParseError, ParsedFeed, UNKNOWN_SOURCE, UNTITLED};
pub use refresh::{FeedRefreshOrchestrator, RefreshSummary};
pub use sync::{FeedError, FeedSyncService};

#[cfg(test)]
pub(crate) mod test_support {
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use super::fetcher::{FetchError, HttpFetcher};

    /// In-memory fetcher: canned bodies or status failures per URL.
    #[derive(Default)]
    pub struct StubFetcher {
        responses: Mutex<HashMap<String, Result<Vec<u8>, u16>>>,
        calls: Mutex<HashMap<String, usize>>,
        delay: Option<Duration>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl StubFetcher {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }

        pub fn respond(&self, url: &str, body: Vec<u8>) {
            self.responses.lock().unwrap().insert(url.to_string(), Ok(body));
        }

        pub fn fail(&self, url: &str, status: u16) {
            self.responses.lock().unwrap().insert(url.to_string(), Err(status));
        }

        pub fn calls(&self, url: &str) -> usize {
            self.calls.lock().unwrap().get(url).copied().unwrap_or(0)
        }

        pub fn max_in_flight(&self) -> usize {
            self.max_in_flight.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl HttpFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
            *self.calls.lock().unwrap().entry(url.to_string()).or_default() += 1;

            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let response = self.responses.lock().unwrap().get(url).cloned();
            match response {
                Some(Ok(body)) => Ok(body),
                Some(Err(status)) => Err(FetchError::HttpStatus(status)),
                None => Err(FetchError::HttpStatus(404)),
            }
        }
    }

    /// Minimal RSS 2.0 document with `(title, link)` items.
    pub fn rss(title: &str, items: &[(&str, &str)]) -> Vec<u8> {
        let items: String = items
            .iter()
            .map(|(t, l)| format!("<item><title>{t}</title><link>{l}</link></item>"))
            .collect();
        format!(r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{title}</title>{items}</channel></rss>"#)
            .into_bytes()
    }
}
