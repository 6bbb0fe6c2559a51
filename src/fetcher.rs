use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::Client;
use tracing::{debug, warn};

use crate::model::{FetchedSource, Item, ItemId, SourceMetadata, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not parse feed at {url}: {source}")]
    Parse {
        url: String,
        #[source]
        source: feed_rs::parser::ParseFeedError,
    },
}

/// Loads the current items of one subscription.
///
/// Implementations must return items newest first, exactly as the source
/// lists them. The collector stops reading a source at the first item older
/// than the cutoff and relies on this order to do so. `Ok(None)` means the
/// source exists but yielded nothing usable.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, subscription: &Subscription) -> Result<Option<FetchedSource>, FetchError>;
}

/// Fetches RSS/Atom feeds over HTTP.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("FeedEngine/1.0 (Feed Aggregator)")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Turn a raw feed document into a source. Entry order is kept as-is.
    pub fn parse_source(
        subscription: &Subscription,
        bytes: &[u8],
    ) -> Result<Option<FetchedSource>, FetchError> {
        let parsed = parser::parse(bytes).map_err(|source| FetchError::Parse {
            url: subscription.url.clone(),
            source,
        })?;

        let name = parsed
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| subscription.name.clone());
        let homepage_url = parsed
            .links
            .iter()
            .find(|l| l.rel.as_deref().unwrap_or("alternate") == "alternate")
            .map(|l| l.href.clone());

        if parsed.entries.is_empty() {
            return Ok(None);
        }

        let mut items = Vec::with_capacity(parsed.entries.len());
        for entry in &parsed.entries {
            match Self::entry_to_item(subscription.service_id, entry) {
                Some(item) => items.push(item),
                None => warn!("Skipping entry with no link in '{}': {}", name, entry.id),
            }
        }

        Ok(Some(FetchedSource {
            metadata: SourceMetadata { name, homepage_url },
            items,
        }))
    }

    pub fn entry_to_item(service_id: u32, entry: &feed_rs::model::Entry) -> Option<Item> {
        let link = entry.links.first().map(|l| l.href.clone())?;
        if link.is_empty() {
            return None;
        }

        let title = entry
            .title
            .as_ref()
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "Untitled".to_string());

        let upload_timestamp: Option<DateTime<Utc>> = entry.published.or(entry.updated);

        let is_live_stream = entry
            .categories
            .iter()
            .any(|c| c.term.eq_ignore_ascii_case("live"));

        Some(Item {
            id: ItemId::new(service_id, link),
            title,
            upload_timestamp,
            is_live_stream,
        })
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceFetcher for HttpFetcher {
    async fn fetch(&self, subscription: &Subscription) -> Result<Option<FetchedSource>, FetchError> {
        debug!("Fetching feed: {} ({})", subscription.name, subscription.url);

        let http_err = |source: reqwest::Error| FetchError::Http {
            url: subscription.url.clone(),
            source,
        };

        let response = self
            .client
            .get(&subscription.url)
            .send()
            .await
            .map_err(http_err)?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: subscription.url.clone(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response.bytes().await.map_err(http_err)?;
        Self::parse_source(subscription, &bytes)
    }
}
