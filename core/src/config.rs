use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Query cache tuning
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct CacheConfig {
    /// How long fetched data is served without refetching
    pub stale_time_secs: u64,
    /// Retries after the first failed fetch
    pub retry: u32,
    /// Base delay, doubled on every retry
    pub retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            stale_time_secs: 30,
            retry: 3,
            retry_delay_ms: 1_000,
            max_retry_delay_ms: 30_000,
        }
    }
}

impl CacheConfig {
    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let delay = self.retry_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_retry_delay_ms))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub database_path: PathBuf,
    /// Quotes per page when browsing
    pub page_size: usize,
    pub cache: CacheConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("quotevault.db"),
            page_size: 20,
            cache: CacheConfig::default(),
        }
    }
}

impl Config {
    /// Load the config at `path`, writing the defaults there first if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            let config = Config::default();
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string(&config)?)?;
            info!(path = %path.display(), "wrote default config");
            return Ok(config);
        }

        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_is_written_with_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());
        assert!(path.exists());

        // Loading again reads the written file back
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "page_size = 5\n\n[cache]\nretry = 0\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.page_size, 5);
        assert_eq!(config.cache.retry, 0);
        assert_eq!(config.cache.stale_time_secs, 30);
        assert_eq!(config.database_path, PathBuf::from("quotevault.db"));
    }

    #[test]
    fn test_invalid_config_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "page_size = \"many\"").unwrap();

        assert!(matches!(Config::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn test_retry_delay_backs_off_and_caps() {
        let cache = CacheConfig::default();
        assert_eq!(cache.retry_delay(0), Duration::from_millis(1_000));
        assert_eq!(cache.retry_delay(1), Duration::from_millis(2_000));
        assert_eq!(cache.retry_delay(2), Duration::from_millis(4_000));
        assert_eq!(cache.retry_delay(10), Duration::from_millis(30_000));
        assert_eq!(cache.retry_delay(80), Duration::from_millis(30_000));
    }
}
