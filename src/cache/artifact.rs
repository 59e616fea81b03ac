use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::util::{atomic_write, Clock, SystemClock};

/// Name of the per-namespace index file.
pub const INDEX_FILE: &str = "cache_info";

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum CacheError {
    /// A single payload exceeds the per-file limit.
    #[error("Artifact is {size} bytes (max {limit} bytes per file)")]
    FileTooLarge { size: u64, limit: u64 },

    /// The payload cannot fit even after eviction.
    #[error("Cache full: {size} bytes do not fit in {limit} bytes")]
    CacheFull { size: u64, limit: u64 },

    #[error("Failed to read cache: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("Failed to write cache: {0}")]
    WriteFailed(#[source] io::Error),
}

// ============================================================================
// Limits, entries and statistics
// ============================================================================

/// Retention and size limits for one cache namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheLimits {
    /// Entries older than this (since creation) are expired.
    pub ttl: Duration,
    pub max_file_size: u64,
    pub max_total_size: u64,
    pub max_entries: usize,
}

impl Default for CacheLimits {
    fn default() -> Self {
        Self {
            ttl: Duration::days(15),
            max_file_size: 1024 * 1024,
            max_total_size: 100 * 1024 * 1024,
            max_entries: 1000,
        }
    }
}

/// Metadata for one cached payload, as stored in the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub file_name: String,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub file_size: u64,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Snapshot of a namespace, recomputed from the live entry table.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStats {
    pub entry_count: usize,
    pub total_size_bytes: u64,
    pub expired_count: usize,
    pub oldest_created_at: Option<DateTime<Utc>>,
    pub newest_created_at: Option<DateTime<Utc>>,
    pub average_age: Option<Duration>,
    /// Hits over all `read` calls since open or the last `clear_all`.
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, CacheEntry>,
    hits: u64,
    accesses: u64,
    /// Index on disk is behind the in-memory table.
    dirty: bool,
}

impl CacheState {
    fn total_size(&self) -> u64 {
        self.entries.values().map(|e| e.file_size).sum()
    }
}

// ============================================================================
// ArtifactCache
// ============================================================================

/// Size- and age-bounded key/value store of byte payloads in one directory.
///
/// Each key maps to a payload file named by the SHA-256 of the key, plus an
/// entry in the JSON index [`INDEX_FILE`]. Entries expire `ttl` after
/// creation; beyond that, eviction is least-recently-accessed first.
/// Clones share state, and all operations on one namespace are serialized.
#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
    limits: CacheLimits,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<CacheState>>,
}

impl ArtifactCache {
    /// Opens (or creates) the namespace at `dir` using wall-clock time.
    pub async fn open(dir: impl Into<PathBuf>, limits: CacheLimits) -> Result<Self, CacheError> {
        Self::with_clock(dir, limits, Arc::new(SystemClock)).await
    }

    /// Opens the namespace at `dir` with an explicit time source.
    ///
    /// A missing or corrupt index starts the namespace empty; payload files
    /// the index does not reference are deleted.
    pub async fn with_clock(
        dir: impl Into<PathBuf>,
        limits: CacheLimits,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, CacheError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(CacheError::WriteFailed)?;

        let entries = load_index(&dir).await?;
        remove_orphans(&dir, &entries).await;

        tracing::debug!(dir = %dir.display(), entries = entries.len(), "Opened artifact cache");

        Ok(Self {
            dir,
            limits,
            clock,
            state: Arc::new(Mutex::new(CacheState {
                entries,
                ..CacheState::default()
            })),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Stores `bytes` under `key`, replacing any previous payload.
    ///
    /// When the namespace is over its byte budget, eviction runs first to
    /// make room; a replacement only needs room for the size difference.
    /// The payload is written before the index, so a failed payload write
    /// leaves the previous entry intact.
    pub async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let size = bytes.len() as u64;
        if size > self.limits.max_file_size {
            return Err(CacheError::FileTooLarge {
                size,
                limit: self.limits.max_file_size,
            });
        }
        if size > self.limits.max_total_size {
            return Err(CacheError::CacheFull {
                size,
                limit: self.limits.max_total_size,
            });
        }

        let mut state = self.state.lock().await;
        let now = self.clock.now();

        if self.projected_total(&state, key, size) > self.limits.max_total_size {
            let evicted = self.evict_locked(&mut state, now, Some((key, size))).await;
            tracing::debug!(key = %key, evicted, "Evicted entries to make room");
            if self.projected_total(&state, key, size) > self.limits.max_total_size {
                self.persist_locked(&mut state).await;
                return Err(CacheError::CacheFull {
                    size,
                    limit: self.limits.max_total_size,
                });
            }
        }

        let file_name = payload_file_name(key);
        if let Err(e) = atomic_write(&self.dir.join(&file_name), bytes).await {
            tracing::warn!(key = %key, error = %e, "Failed to write cache payload");
            self.persist_locked(&mut state).await;
            return Err(CacheError::WriteFailed(e));
        }

        state.entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                file_name,
                created_at: now,
                last_accessed_at: now,
                file_size: size,
            },
        );
        state.dirty = true;

        if state.entries.len() > self.limits.max_entries {
            self.evict_locked(&mut state, now, Some((key, size))).await;
        }

        self.persist_locked(&mut state).await;
        Ok(())
    }

    /// Returns the payload for `key`, or `None` on a miss.
    ///
    /// Expired entries are removed here. An unreadable payload is logged and
    /// its entry dropped. A hit refreshes the entry's access time; that change
    /// reaches the index on the next write, eviction or [`flush`](Self::flush).
    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        match self.try_read(key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Dropped unreadable cache entry");
                None
            }
        }
    }

    async fn try_read(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        state.accesses += 1;

        let Some(entry) = state.entries.get(key).cloned() else {
            tracing::debug!(key = %key, "Cache miss");
            return Ok(None);
        };

        if entry.is_expired(now, self.limits.ttl) {
            tracing::debug!(key = %key, created_at = %entry.created_at, "Cache entry expired");
            state.entries.remove(key);
            self.remove_payload(&entry).await;
            state.dirty = true;
            self.persist_locked(&mut state).await;
            return Ok(None);
        }

        // Removed under the same lock, so a concurrent write of `key` is never lost
        let bytes = match tokio::fs::read(self.dir.join(&entry.file_name)).await {
            Ok(bytes) => bytes,
            Err(e) => {
                state.entries.remove(key);
                self.remove_payload(&entry).await;
                state.dirty = true;
                self.persist_locked(&mut state).await;
                return Err(CacheError::ReadFailed(e));
            }
        };

        state.hits += 1;
        if let Some(entry) = state.entries.get_mut(key) {
            entry.last_accessed_at = entry.last_accessed_at.max(now);
        }
        state.dirty = true;

        tracing::debug!(key = %key, bytes = bytes.len(), "Cache hit");
        Ok(Some(bytes))
    }

    /// Whether `key` has a live entry. Expired entries are removed; access
    /// times and hit counters are left alone.
    pub async fn has(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let now = self.clock.now();

        let Some(entry) = state.entries.get(key).cloned() else {
            return false;
        };
        if entry.is_expired(now, self.limits.ttl) {
            state.entries.remove(key);
            self.remove_payload(&entry).await;
            state.dirty = true;
            self.persist_locked(&mut state).await;
            return false;
        }
        true
    }

    /// Removes one entry. Returns whether it existed.
    pub async fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock().await;
        let Some(entry) = state.entries.remove(key) else {
            return false;
        };
        self.remove_payload(&entry).await;
        state.dirty = true;
        self.persist_locked(&mut state).await;
        true
    }

    /// Removes every entry and resets hit statistics.
    pub async fn clear_all(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        let entries: Vec<CacheEntry> = state.entries.drain().map(|(_, e)| e).collect();
        for entry in &entries {
            self.remove_payload(entry).await;
        }
        state.hits = 0;
        state.accesses = 0;

        let index = serde_json::to_vec(&state.entries).map_err(|e| CacheError::WriteFailed(e.into()))?;
        atomic_write(&self.dir.join(INDEX_FILE), &index)
            .await
            .map_err(CacheError::WriteFailed)?;
        state.dirty = false;

        tracing::info!(dir = %self.dir.display(), removed = entries.len(), "Cleared artifact cache");
        Ok(())
    }

    /// Runs a full eviction pass: expired entries, then least recently
    /// accessed until both size and count limits hold. Returns the number
    /// of entries removed.
    pub async fn evict(&self) -> usize {
        let mut state = self.state.lock().await;
        let now = self.clock.now();
        let removed = self.evict_locked(&mut state, now, None).await;
        self.persist_locked(&mut state).await;
        removed
    }

    /// Writes pending access-time updates to the index.
    pub async fn flush(&self) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        if !state.dirty {
            return Ok(());
        }
        let index = serde_json::to_vec(&state.entries).map_err(|e| CacheError::WriteFailed(e.into()))?;
        atomic_write(&self.dir.join(INDEX_FILE), &index)
            .await
            .map_err(CacheError::WriteFailed)?;
        state.dirty = false;
        Ok(())
    }

    pub async fn stats(&self) -> CacheStats {
        let state = self.state.lock().await;
        let now = self.clock.now();

        let entry_count = state.entries.len();
        let expired_count = state
            .entries
            .values()
            .filter(|e| e.is_expired(now, self.limits.ttl))
            .count();
        let oldest_created_at = state.entries.values().map(|e| e.created_at).min();
        let newest_created_at = state.entries.values().map(|e| e.created_at).max();
        let average_age = if entry_count == 0 {
            None
        } else {
            let total_ms: i64 = state
                .entries
                .values()
                .map(|e| (now - e.created_at).num_milliseconds())
                .sum();
            Some(Duration::milliseconds(total_ms / entry_count as i64))
        };
        let hit_rate = if state.accesses == 0 {
            0.0
        } else {
            state.hits as f64 / state.accesses as f64
        };

        CacheStats {
            entry_count,
            total_size_bytes: state.total_size(),
            expired_count,
            oldest_created_at,
            newest_created_at,
            average_age,
            hit_rate,
        }
    }

    // ------------------------------------------------------------------------
    // Internals (caller holds the state lock)
    // ------------------------------------------------------------------------

    /// Total size if `key` were stored with `size` bytes.
    fn projected_total(&self, state: &CacheState, key: &str, size: u64) -> u64 {
        let existing = state.entries.get(key).map_or(0, |e| e.file_size);
        state.total_size() - existing + size
    }

    /// Removes expired entries, then LRU entries until the limits hold.
    ///
    /// `reserve` names an entry (key, size) that must fit afterwards; it is
    /// never chosen as a victim and counts towards both limits.
    async fn evict_locked(
        &self,
        state: &mut CacheState,
        now: DateTime<Utc>,
        reserve: Option<(&str, u64)>,
    ) -> usize {
        let reserved_key = reserve.map(|(k, _)| k);
        let mut victims: Vec<CacheEntry> = Vec::new();

        let expired: Vec<String> = state
            .entries
            .values()
            .filter(|e| e.is_expired(now, self.limits.ttl) && Some(e.key.as_str()) != reserved_key)
            .map(|e| e.key.clone())
            .collect();
        for key in expired {
            if let Some(entry) = state.entries.remove(&key) {
                victims.push(entry);
            }
        }

        // One LRU-ordered view serves both the size and the count pass
        let mut lru: Vec<(DateTime<Utc>, DateTime<Utc>, String)> = state
            .entries
            .values()
            .filter(|e| Some(e.key.as_str()) != reserved_key)
            .map(|e| (e.last_accessed_at, e.created_at, e.key.clone()))
            .collect();
        lru.sort();

        let (reserved_size, reserved_slots) = reserve.map_or((0, 0), |(_, size)| (size, 1));
        let mut total: u64 = lru
            .iter()
            .filter_map(|(_, _, k)| state.entries.get(k))
            .map(|e| e.file_size)
            .sum::<u64>()
            + reserved_size;
        let mut count = lru.len() + reserved_slots;

        for (_, _, key) in lru {
            if total <= self.limits.max_total_size && count <= self.limits.max_entries {
                break;
            }
            if let Some(entry) = state.entries.remove(&key) {
                total -= entry.file_size;
                count -= 1;
                victims.push(entry);
            }
        }

        for entry in &victims {
            tracing::debug!(key = %entry.key, size = entry.file_size, "Evicting cache entry");
            self.remove_payload(entry).await;
        }
        if !victims.is_empty() {
            state.dirty = true;
        }
        victims.len()
    }

    /// Best-effort index write. A failure keeps the state dirty so the next
    /// persist retries.
    async fn persist_locked(&self, state: &mut CacheState) {
        if !state.dirty {
            return;
        }
        let index = match serde_json::to_vec(&state.entries) {
            Ok(index) => index,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize cache index");
                return;
            }
        };
        match atomic_write(&self.dir.join(INDEX_FILE), &index).await {
            Ok(()) => state.dirty = false,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Failed to persist cache index");
            }
        }
    }

    async fn remove_payload(&self, entry: &CacheEntry) {
        match tokio::fs::remove_file(self.dir.join(&entry.file_name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(key = %entry.key, error = %e, "Failed to delete cache payload");
            }
        }
    }
}

fn payload_file_name(key: &str) -> String {
    format!("{:x}", Sha256::digest(key.as_bytes()))
}

async fn load_index(dir: &Path) -> Result<HashMap<String, CacheEntry>, CacheError> {
    let path = dir.join(INDEX_FILE);
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(CacheError::ReadFailed(e)),
    };

    match serde_json::from_slice::<HashMap<String, CacheEntry>>(&bytes) {
        Ok(entries) => Ok(entries
            .into_iter()
            // File names are derived, never trusted from disk
            .filter(|(key, entry)| *key == entry.key && entry.file_name == payload_file_name(key))
            .collect()),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cache index corrupt, starting empty");
            Ok(HashMap::new())
        }
    }
}

/// Deletes files in `dir` that no index entry references.
async fn remove_orphans(dir: &Path, entries: &HashMap<String, CacheEntry>) {
    let mut read_dir = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Failed to scan cache directory");
            return;
        }
    };

    let referenced: std::collections::HashSet<&str> =
        entries.values().map(|e| e.file_name.as_str()).collect();

    loop {
        let entry = match read_dir.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Failed to scan cache directory");
                break;
            }
        };
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name == INDEX_FILE || referenced.contains(name.as_ref()) {
            continue;
        }
        if !entry.file_type().await.is_ok_and(|t| t.is_file()) {
            continue;
        }
        match tokio::fs::remove_file(entry.path()).await {
            Ok(()) => tracing::debug!(file = %name, "Removed orphaned cache file"),
            Err(e) => tracing::warn!(file = %name, error = %e, "Failed to remove orphaned cache file"),
        }
    }
}
