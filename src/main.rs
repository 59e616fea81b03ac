use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use feedsync::cache::{ArtifactCache, ArtifactKind};
use feedsync::config::Config;
use feedsync::feed::{FeedRefreshOrchestrator, FeedSyncService, ReqwestFetcher};
use feedsync::model::FeedLoadingState;
use feedsync::storage::{ArticleStore, SqliteStore, StoreError};

#[derive(Parser, Debug)]
#[command(name = "feedsync", about = "Sync RSS/Atom feeds into a local store")]
struct Args {
    /// Path to config file (default: ~/.config/feedsync/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed after validating it
    Add { url: String },
    /// List subscribed feeds with article counts
    List,
    /// Refresh every subscribed feed
    Refresh {
        /// Ignore the per-feed update interval
        #[arg(long)]
        force: bool,
    },
    /// Unsubscribe from a feed and drop its articles
    Remove { url: String },
    /// Show artifact cache statistics
    CacheStats,
    /// Delete every cached artifact
    CacheClear,
}

/// Get the config directory path (~/.config/feedsync/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("feedsync"))
}

/// Get the data directory path (~/.local/share/feedsync/ unless overridden)
fn get_data_dir(config: &Config) -> Result<PathBuf> {
    if let Some(dir) = &config.data_dir {
        return Ok(dir.clone());
    }
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".local").join("share").join("feedsync"))
}

/// Create `dir` if needed and restrict it to the owner.
fn ensure_private_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    // SEC-007: Feed history and cached artifacts are private to the user
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        if let Err(e) = std::fs::set_permissions(dir, perms) {
            tracing::warn!(
                path = %dir.display(),
                error = %e,
                "Failed to set directory permissions to 0700"
            );
        }
    }

    Ok(())
}

async fn open_store(data_dir: &Path) -> Result<SqliteStore> {
    let db_path = data_dir.join("feeds.db");
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    match SqliteStore::open(db_path_str).await {
        Ok(store) => Ok(store),
        Err(StoreError::InstanceLocked) => {
            eprintln!("Error: Another feedsync process is using the database. Try again shortly.");
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}

async fn open_caches(data_dir: &Path, config: &Config) -> Result<Vec<(ArtifactKind, ArtifactCache)>> {
    let root = data_dir.join("cache");
    let mut caches = Vec::with_capacity(ArtifactKind::ALL.len());
    for kind in ArtifactKind::ALL {
        let cache = kind
            .open(&root, config.cache_limits())
            .await
            .with_context(|| format!("Failed to open {} cache", kind.dir_name()))?;
        caches.push((kind, cache));
    }
    Ok(caches)
}

fn build_orchestrator(config: &Config, store: SqliteStore) -> Result<FeedRefreshOrchestrator> {
    let client = reqwest::Client::builder()
        .user_agent(concat!("feedsync/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let fetcher = ReqwestFetcher::new(client, config.fetch_timeout(), config.max_feed_size_bytes);
    let sync = FeedSyncService::from_config(Arc::new(fetcher), config);

    Ok(FeedRefreshOrchestrator::new(Arc::new(sync), Arc::new(store))
        .with_max_concurrent(config.max_concurrent_refreshes))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config: {}", config_path.display()))?;

    let data_dir = get_data_dir(&config)?;
    ensure_private_dir(&data_dir)?;

    match args.command {
        Command::Add { url } => {
            let store = open_store(&data_dir).await?;
            let orchestrator = build_orchestrator(&config, store)?;
            let feed = orchestrator
                .add_feed(&url)
                .await
                .with_context(|| format!("Failed to add feed {}", url))?;
            println!("Subscribed to {} ({})", feed.title, feed.url);
        }

        Command::List => {
            let store = open_store(&data_dir).await?;
            let feeds = store.load_feeds().await.context("Failed to load feeds")?;
            if feeds.is_empty() {
                println!("No feeds. Add one with `feedsync add <url>`.");
            }
            for feed in &feeds {
                let articles = store
                    .load_articles(feed)
                    .await
                    .with_context(|| format!("Failed to load articles for {}", feed.url))?;
                let unread = articles.iter().filter(|a| !a.is_read).count();
                println!(
                    "{}  {}  ({} articles, {} unread)",
                    feed.title,
                    feed.url,
                    articles.len(),
                    unread
                );
            }
        }

        Command::Refresh { force } => {
            let store = open_store(&data_dir).await?;
            let feeds = store.load_feeds().await.context("Failed to load feeds")?;
            let orchestrator = build_orchestrator(&config, store)?;

            let summary = orchestrator.refresh_all(&feeds, force).await;
            for feed in &feeds {
                if let FeedLoadingState::Failed(message) = orchestrator.status(feed.id) {
                    eprintln!("Failed: {} ({})", feed.title, message);
                }
            }
            println!(
                "Refreshed {} feeds, {} failed",
                summary.success_count, summary.failure_count
            );
        }

        Command::Remove { url } => {
            let store = open_store(&data_dir).await?;
            let feeds = store.load_feeds().await.context("Failed to load feeds")?;
            let Some(feed) = feeds.into_iter().find(|f| f.has_url(&url)) else {
                eprintln!("Error: Not subscribed to {}", url.trim());
                std::process::exit(1);
            };
            let articles = store
                .load_articles(&feed)
                .await
                .context("Failed to load articles")?;

            let orchestrator = build_orchestrator(&config, store)?;
            orchestrator
                .delete_feed(feed.id)
                .await
                .with_context(|| format!("Failed to remove feed {}", feed.url))?;

            // Per-article artifacts are useless once the articles are gone
            for (kind, cache) in open_caches(&data_dir, &config).await? {
                if kind == ArtifactKind::Digest {
                    continue;
                }
                for article in &articles {
                    cache.remove(&article.id).await;
                }
            }
            println!("Removed {} ({} articles)", feed.title, articles.len());
        }

        Command::CacheStats => {
            for (kind, cache) in open_caches(&data_dir, &config).await? {
                let stats = cache.stats().await;
                println!(
                    "{:<10} {:>5} entries  {:>10} bytes  {:>4} expired  hit rate {:.0}%",
                    kind.dir_name(),
                    stats.entry_count,
                    stats.total_size_bytes,
                    stats.expired_count,
                    stats.hit_rate * 100.0
                );
                if let (Some(oldest), Some(newest)) = (stats.oldest_created_at, stats.newest_created_at) {
                    println!("           oldest {}  newest {}", oldest, newest);
                }
            }
        }

        Command::CacheClear => {
            for (kind, cache) in open_caches(&data_dir, &config).await? {
                cache
                    .clear_all()
                    .await
                    .with_context(|| format!("Failed to clear {} cache", kind.dir_name()))?;
            }
            println!("Cleared artifact caches");
        }
    }

    Ok(())
}
