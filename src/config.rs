use serde::Deserialize;
use std::path::Path;

use crate::aggregator::DEFAULT_MAX_CONCURRENT_FETCHES;
use crate::cutoff::DEFAULT_CUTOFF_WEEKS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Refresh interval in minutes
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval: u64,
    /// How far back the feed reaches, in weeks
    #[serde(default = "default_cutoff_weeks")]
    pub cutoff_weeks: u32,
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
    pub feeds: Vec<FeedConfig>,
}

fn default_refresh_interval() -> u64 {
    15
}

fn default_cutoff_weeks() -> u32 {
    DEFAULT_CUTOFF_WEEKS
}

fn default_max_concurrent_fetches() -> usize {
    DEFAULT_MAX_CONCURRENT_FETCHES
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub name: String,
    pub url: String,
    /// Identifies the service the feed belongs to; part of every item's identity.
    #[serde(default)]
    pub service_id: u32,
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_str(&content)
    }

    /// Parse config from a TOML string (useful for testing)
    pub fn from_str(content: &str) -> anyhow::Result<Self> {
        let config: Config = toml::from_str(content)?;
        if config.refresh_interval == 0 {
            anyhow::bail!("refresh_interval must be at least 1 minute");
        }
        if config.max_concurrent_fetches == 0 {
            anyhow::bail!("max_concurrent_fetches must be at least 1");
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        assert_eq!(default_refresh_interval(), 15);
        assert_eq!(default_cutoff_weeks(), 4);
        assert_eq!(default_max_concurrent_fetches(), 4);
    }

    #[test]
    fn test_load_valid_config() {
        let content = r#"
            refresh_interval = 30
            cutoff_weeks = 2
            max_concurrent_fetches = 8

            [[feeds]]
            name = "Channel A"
            url = "https://example.com/feed.xml"
            service_id = 1

            [[feeds]]
            name = "Channel B"
            url = "https://example.org/rss"
        "#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();

        let config = Config::load(temp_file.path()).unwrap();

        assert_eq!(config.refresh_interval, 30);
        assert_eq!(config.cutoff_weeks, 2);
        assert_eq!(config.max_concurrent_fetches, 8);
        assert_eq!(config.feeds.len(), 2);
        assert_eq!(config.feeds[0].name, "Channel A");
        assert_eq!(config.feeds[0].url, "https://example.com/feed.xml");
        assert_eq!(config.feeds[0].service_id, 1);
        assert_eq!(config.feeds[1].service_id, 0);
    }

    #[test]
    fn test_load_config_with_defaults() {
        let content = r#"
            [[feeds]]
            name = "Test Feed"
            url = "https://example.com/feed.xml"
        "#;

        let config = Config::from_str(content).unwrap();

        assert_eq!(config.refresh_interval, 15);
        assert_eq!(config.cutoff_weeks, 4);
        assert_eq!(config.max_concurrent_fetches, 4);
        assert_eq!(config.feeds.len(), 1);
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = Config::load("/nonexistent/path/config.toml");
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_cutoff_weeks_rejected() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "cutoff_weeks = -1\nfeeds = []").unwrap();

        assert!(Config::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_feed_without_url_rejected() {
        let content = r#"
            [[feeds]]
            name = "No URL"
            service_id = 3
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_zero_refresh_interval_rejected() {
        let content = r#"
            refresh_interval = 0
            feeds = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let content = r#"
            max_concurrent_fetches = 0
            feeds = []
        "#;

        assert!(Config::from_str(content).is_err());
    }

    #[test]
    fn test_empty_feeds_list() {
        let content = "feeds = []";

        let config = Config::from_str(content).unwrap();
        assert!(config.feeds.is_empty());
    }
}
