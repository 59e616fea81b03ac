//! Configuration file parser for ~/.config/feedsync/config.toml.
//!
//! The config file is optional: a missing file yields `Config::default()`.
//! Unknown keys are ignored by serde, though we log a warning when the file
//! contains potential typos.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::cache::CacheLimits;
use crate::util::HostPolicy;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// SEC-014: Config file exceeds maximum allowed size.
    #[error("Config file too large: {0}")]
    TooLarge(String),

    /// A value parsed but is outside its allowed range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level engine configuration.
///
/// All fields use `#[serde(default)]` so any subset of keys can be specified.
/// Missing keys fall back to `Default::default()`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Minimum seconds between two network fetches of the same feed.
    pub min_update_interval_secs: u64,

    /// Upper bound on feeds refreshed at the same time.
    pub max_concurrent_refreshes: usize,

    /// Per-request timeout for feed downloads.
    pub fetch_timeout_secs: u64,

    /// Feed documents larger than this are rejected.
    pub max_feed_size_bytes: usize,

    /// Days before a cached summary/insight/digest expires.
    pub cache_ttl_days: u32,

    /// Largest single cached artifact, in bytes.
    pub cache_max_file_size: u64,

    /// Total bytes per cache namespace.
    pub cache_max_total_size: u64,

    /// Entry count per cache namespace.
    pub cache_max_entries: usize,

    /// Accept feed URLs pointing at loopback/private addresses.
    pub allow_private_hosts: bool,

    /// Overrides the data directory (database and caches).
    pub data_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_update_interval_secs: 3600,
            max_concurrent_refreshes: 10,
            fetch_timeout_secs: 30,
            max_feed_size_bytes: 10 * 1024 * 1024,
            cache_ttl_days: 15,
            cache_max_file_size: 1024 * 1024,
            cache_max_total_size: 100 * 1024 * 1024,
            cache_max_entries: 1000,
            allow_private_hosts: false,
            data_dir: None,
        }
    }
}

impl Config {
    /// SEC-014: Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 10] = [
        "min_update_interval_secs",
        "max_concurrent_refreshes",
        "fetch_timeout_secs",
        "max_feed_size_bytes",
        "cache_ttl_days",
        "cache_max_file_size",
        "cache_max_total_size",
        "cache_max_entries",
        "allow_private_hosts",
        "data_dir",
    ];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Zero concurrency, timeout or entry cap → `Err(ConfigError::Invalid)`
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        // SEC-014: Check file size before reading
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Race condition: file deleted between metadata and read
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        if content.trim().is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        tracing::info!(
            path = %path.display(),
            max_concurrent = config.max_concurrent_refreshes,
            min_update_interval_secs = config.min_update_interval_secs,
            "Loaded configuration"
        );
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_refreshes == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_refreshes must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "fetch_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.cache_max_entries == 0 {
            return Err(ConfigError::Invalid(
                "cache_max_entries must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Saturates at `chrono::Duration::MAX` for values chrono cannot represent.
    pub fn min_update_interval(&self) -> chrono::Duration {
        i64::try_from(self.min_update_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn fetch_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn host_policy(&self) -> HostPolicy {
        if self.allow_private_hosts {
            HostPolicy::AllowPrivate
        } else {
            HostPolicy::PublicOnly
        }
    }

    /// Limits applied to each artifact cache namespace.
    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            ttl: chrono::Duration::days(i64::from(self.cache_ttl_days)),
            max_file_size: self.cache_max_file_size,
            max_total_size: self.cache_max_total_size,
            max_entries: self.cache_max_entries,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, content).unwrap();
        (dir, path)
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.min_update_interval_secs, 3600);
        assert_eq!(config.max_concurrent_refreshes, 10);
        assert_eq!(config.fetch_timeout_secs, 30);
        assert_eq!(config.cache_ttl_days, 15);
        assert_eq!(config.cache_max_file_size, 1024 * 1024);
        assert_eq!(config.cache_max_total_size, 100 * 1024 * 1024);
        assert_eq!(config.cache_max_entries, 1000);
        assert!(!config.allow_private_hosts);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_missing_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_and_whitespace_files_return_default() {
        let (_dir, path) = write_config("");
        assert_eq!(Config::load(&path).unwrap(), Config::default());

        let (_dir, path) = write_config("   \n  \n  ");
        assert_eq!(Config::load(&path).unwrap(), Config::default());
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let (_dir, path) = write_config("max_concurrent_refreshes = 4\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_concurrent_refreshes, 4);
        assert_eq!(config.min_update_interval_secs, 3600);
    }

    #[test]
    fn test_full_config() {
        let (_dir, path) = write_config(
            r#"
min_update_interval_secs = 600
max_concurrent_refreshes = 3
fetch_timeout_secs = 5
max_feed_size_bytes = 2048
cache_ttl_days = 7
cache_max_file_size = 100
cache_max_total_size = 1000
cache_max_entries = 20
allow_private_hosts = true
data_dir = "/var/lib/feedsync"
"#,
        );

        let config = Config::load(&path).unwrap();
        assert_eq!(config.min_update_interval(), chrono::Duration::minutes(10));
        assert_eq!(config.fetch_timeout(), std::time::Duration::from_secs(5));
        assert_eq!(config.max_feed_size_bytes, 2048);
        assert_eq!(config.host_policy(), HostPolicy::AllowPrivate);
        assert_eq!(config.data_dir, Some(PathBuf::from("/var/lib/feedsync")));

        let limits = config.cache_limits();
        assert_eq!(limits.ttl, chrono::Duration::days(7));
        assert_eq!(limits.max_file_size, 100);
        assert_eq!(limits.max_total_size, 1000);
        assert_eq!(limits.max_entries, 20);
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let (_dir, path) = write_config("this is not [valid toml");
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let (_dir, path) = write_config("max_concurrent_refreshes = 2\ntheme = \"dark\"\n");
        assert_eq!(Config::load(&path).unwrap().max_concurrent_refreshes, 2);
    }

    #[test]
    fn test_wrong_type_returns_error() {
        let (_dir, path) = write_config("cache_ttl_days = \"two weeks\"\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let (_dir, path) = write_config("max_concurrent_refreshes = 0\n");
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_huge_update_interval_saturates() {
        let (_dir, path) = write_config("min_update_interval_secs = 9223372036854775807\n");
        let config = Config::load(&path).unwrap();
        assert_eq!(config.min_update_interval(), chrono::Duration::MAX);

        let config = Config {
            min_update_interval_secs: u64::MAX,
            ..Config::default()
        };
        assert_eq!(config.min_update_interval(), chrono::Duration::MAX);
        assert_eq!(Config::default().min_update_interval(), chrono::Duration::hours(1));
    }

    // SEC-014: File size limit
    #[test]
    fn test_too_large_file_rejected() {
        let (_dir, path) = write_config(&"a".repeat(1_048_577));
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));
    }
}
