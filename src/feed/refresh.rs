use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use super::merge::{merge_articles, sort_by_publish_date, MergeOutcome};
use super::sync::{FeedError, FeedSyncService};
use crate::model::{Feed, FeedLoadingState};
use crate::storage::ArticleStore;

type StatusMap = Arc<Mutex<HashMap<Uuid, FeedLoadingState>>>;

/// Outcome counts of a [`FeedRefreshOrchestrator::refresh_all`] run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub success_count: usize,
    pub failure_count: usize,
}

/// Refreshes feeds concurrently and folds the results into the store.
///
/// Each feed goes fetch → merge with stored articles → sort → save. Failures
/// stay with their feed: the feed is marked `Failed` and its stored articles
/// are left as they were. Results are drained one at a time on the calling
/// task, which is the only writer of the status map.
pub struct FeedRefreshOrchestrator {
    sync: Arc<FeedSyncService>,
    store: Arc<dyn ArticleStore>,
    statuses: StatusMap,
    max_concurrent: usize,
}

impl FeedRefreshOrchestrator {
    pub const DEFAULT_MAX_CONCURRENT: usize = 10;

    pub fn new(sync: Arc<FeedSyncService>, store: Arc<dyn ArticleStore>) -> Self {
        Self {
            sync,
            store,
            statuses: Arc::new(Mutex::new(HashMap::new())),
            max_concurrent: Self::DEFAULT_MAX_CONCURRENT,
        }
    }

    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Current state of one feed; feeds never refreshed are `Idle`.
    pub fn status(&self, feed_id: Uuid) -> FeedLoadingState {
        lock(&self.statuses)
            .get(&feed_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn statuses(&self) -> HashMap<Uuid, FeedLoadingState> {
        lock(&self.statuses).clone()
    }

    /// Refreshes every feed in `feeds`, at most `max_concurrent` at a time.
    ///
    /// All feeds are marked `Loading` before any work starts. If this future
    /// is dropped before completion, feeds still `Loading` go back to `Idle`.
    pub async fn refresh_all(&self, feeds: &[Feed], force_refresh: bool) -> RefreshSummary {
        if feeds.is_empty() {
            return RefreshSummary::default();
        }

        let ids: Vec<Uuid> = feeds.iter().map(|f| f.id).collect();
        let _guard = LoadingGuard::start(&self.statuses, ids);

        let mut results = stream::iter(feeds)
            .map(|feed| async move { (feed, self.refresh_feed(feed, force_refresh).await) })
            .buffer_unordered(self.max_concurrent);

        let mut summary = RefreshSummary::default();
        while let Some((feed, result)) = results.next().await {
            match result {
                Ok(_) => summary.success_count += 1,
                Err(_) => summary.failure_count += 1,
            }
            self.record(feed, &result);
        }

        tracing::info!(
            feeds = feeds.len(),
            succeeded = summary.success_count,
            failed = summary.failure_count,
            "Refresh complete"
        );
        summary
    }

    /// Refreshes a single feed. Returns the number of newly added articles.
    pub async fn refresh_one(&self, feed: &Feed, force_refresh: bool) -> Result<usize, FeedError> {
        let _guard = LoadingGuard::start(&self.statuses, vec![feed.id]);
        let result = self.refresh_feed(feed, force_refresh).await;
        self.record(feed, &result);
        result
    }

    /// Refreshes every stored feed.
    pub async fn refresh_stored(&self, force_refresh: bool) -> Result<RefreshSummary, FeedError> {
        let feeds = self.store.load_feeds().await?;
        Ok(self.refresh_all(&feeds, force_refresh).await)
    }

    /// Validates `url` and appends the resulting feed to the stored list.
    ///
    /// Rejects URLs already subscribed (ignoring surrounding whitespace and a
    /// trailing slash) before any network request.
    pub async fn add_feed(&self, url: &str) -> Result<Feed, FeedError> {
        let mut feeds = self.store.load_feeds().await?;
        if feeds.iter().any(|f| f.has_url(url)) {
            return Err(FeedError::DuplicateFeed(url.trim().to_string()));
        }

        let feed = self.sync.validate_feed(url).await?;
        feeds.push(feed.clone());
        self.store.save_feeds(&feeds).await?;

        tracing::info!(feed = %feed.url, title = %feed.title, "Subscribed to feed");
        Ok(feed)
    }

    /// Removes a feed with its articles, status and throttle entry.
    pub async fn delete_feed(&self, feed_id: Uuid) -> Result<Feed, FeedError> {
        let mut feeds = self.store.load_feeds().await?;
        let pos = feeds
            .iter()
            .position(|f| f.id == feed_id)
            .ok_or(FeedError::NotFound(feed_id))?;
        let feed = feeds.remove(pos);

        self.store.save_articles(&feed, &[]).await?;
        self.store.save_feeds(&feeds).await?;
        self.sync.invalidate(&feed.url).await;
        lock(&self.statuses).remove(&feed_id);

        tracing::info!(feed = %feed.url, "Removed feed");
        Ok(feed)
    }

    /// fetch → merge → sort → save for one feed. Returns the added count.
    async fn refresh_feed(&self, feed: &Feed, force_refresh: bool) -> Result<usize, FeedError> {
        let incoming = self.sync.fetch_articles(feed, force_refresh).await?;
        let existing = self.store.load_articles(feed).await?;

        let MergeOutcome {
            mut articles,
            added,
            updated,
        } = merge_articles(existing, incoming);
        sort_by_publish_date(&mut articles);
        self.store.save_articles(feed, &articles).await?;

        tracing::debug!(
            feed = %feed.url,
            added,
            updated,
            total = articles.len(),
            "Merged feed articles"
        );
        Ok(added)
    }

    fn record<T>(&self, feed: &Feed, result: &Result<T, FeedError>) {
        let state = match result {
            Ok(_) => FeedLoadingState::Loaded,
            Err(e) => {
                tracing::warn!(feed = %feed.url, error = %e, "Feed refresh failed");
                FeedLoadingState::Failed(e.to_string())
            }
        };
        lock(&self.statuses).insert(feed.id, state);
    }
}

fn lock(
    statuses: &Mutex<HashMap<Uuid, FeedLoadingState>>,
) -> std::sync::MutexGuard<'_, HashMap<Uuid, FeedLoadingState>> {
    statuses.lock().unwrap_or_else(|e| e.into_inner())
}

/// Marks feeds `Loading` and, on drop, resets any still `Loading` to `Idle`.
struct LoadingGuard {
    statuses: StatusMap,
    ids: Vec<Uuid>,
}

impl LoadingGuard {
    fn start(statuses: &StatusMap, ids: Vec<Uuid>) -> Self {
        {
            let mut map = lock(statuses);
            for id in &ids {
                map.insert(*id, FeedLoadingState::Loading);
            }
        }
        Self {
            statuses: Arc::clone(statuses),
            ids,
        }
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        let mut map = lock(&self.statuses);
        for id in &self.ids {
            if let Some(state) = map.get_mut(id) {
                if state.is_loading() {
                    *state = FeedLoadingState::Idle;
                }
            }
        }
    }
}
