//! Core data types shared by the aggregation pipeline.

use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Identity of an item across runs: the service it came from plus its
/// canonical URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId {
    pub service_id: u32,
    pub url: String,
}

impl ItemId {
    pub fn new(service_id: u32, url: impl Into<String>) -> Self {
        Self {
            service_id,
            url: url.into(),
        }
    }

    /// Stable 32-bit hash of the identity string.
    ///
    /// Polynomial hash over UTF-16 code units with wrapping arithmetic, so the
    /// value never changes between builds or platforms.
    pub fn stable_hash(&self) -> i32 {
        self.to_string()
            .encode_utf16()
            .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.service_id, self.url)
    }
}

/// One content entry of a source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    /// `None` means the upload time is unknown, not that the item is old.
    pub upload_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_live_stream: bool,
}

impl Item {
    /// Upstream sources often round upload times to the minute. A missing
    /// timestamp, or one with zero seconds and zero sub-second part, is
    /// treated as approximated.
    pub fn is_upload_date_approximated(&self) -> bool {
        match self.upload_timestamp {
            None => true,
            Some(ts) => ts.second() == 0 && ts.nanosecond() == 0,
        }
    }
}

/// A followed source as handed out by the subscription registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub id: i64,
    pub service_id: u32,
    pub name: String,
    pub url: String,
}

/// Metadata reported by the fetcher for a source.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    pub name: String,
    pub homepage_url: Option<String>,
}

/// Everything the fetcher returns for one subscription. `items` are in the
/// order the source published them, newest first.
#[derive(Debug, Clone, Default)]
pub struct FetchedSource {
    pub metadata: SourceMetadata,
    pub items: Vec<Item>,
}

/// The output of one aggregation run. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResult {
    pub generated_at: DateTime<Utc>,
    pub items: Vec<Item>,
    pub content_hash: i64,
}

impl AggregateResult {
    pub fn new(generated_at: DateTime<Utc>, items: Vec<Item>) -> Self {
        let content_hash = content_hash(&items);
        Self {
            generated_at,
            items,
            content_hash,
        }
    }
}

/// Order- and duplicate-sensitive fingerprint of an item sequence.
pub fn content_hash(items: &[Item]) -> i64 {
    items.iter().fold(1i64, |acc, item| {
        acc.wrapping_mul(31)
            .wrapping_add(i64::from(item.id.stable_hash()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(url: &str, ts: Option<DateTime<Utc>>) -> Item {
        Item {
            id: ItemId::new(0, url),
            title: url.to_string(),
            upload_timestamp: ts,
            is_live_stream: false,
        }
    }

    mod identity_tests {
        use super::*;

        #[test]
        fn test_identity_string_concatenates_service_and_url() {
            let id = ItemId::new(3, "https://example.com/watch?v=1");
            assert_eq!(id.to_string(), "3https://example.com/watch?v=1");
        }

        #[test]
        fn test_stable_hash_matches_polynomial_string_hash() {
            // "0a" -> 31 * '0' + 'a' = 31 * 48 + 97
            assert_eq!(ItemId::new(0, "a").stable_hash(), 31 * 48 + 97);
            assert_eq!(ItemId::new(0, "").stable_hash(), 48);
        }

        #[test]
        fn test_stable_hash_wraps_on_long_input() {
            let id = ItemId::new(1, "x".repeat(10_000));
            assert_eq!(id.stable_hash(), -1_539_140_047);
        }

        #[test]
        fn test_stable_hash_uses_utf16_code_units() {
            // The emoji is a surrogate pair, hashed as two units.
            assert_eq!(ItemId::new(0, "héllo😀").stable_hash(), -1_952_885_375);
            assert_eq!(ItemId::new(0, "a-live").stable_hash(), -1_822_555_384);
        }
    }

    mod precision_tests {
        use super::*;

        #[test]
        fn test_missing_timestamp_is_approximated() {
            assert!(item("a", None).is_upload_date_approximated());
        }

        #[test]
        fn test_whole_minute_is_approximated() {
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
            assert!(item("a", Some(ts)).is_upload_date_approximated());
        }

        #[test]
        fn test_nonzero_seconds_is_precise() {
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 17).unwrap();
            assert!(!item("a", Some(ts)).is_upload_date_approximated());
        }

        #[test]
        fn test_nonzero_subsecond_is_precise() {
            let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()
                + chrono::Duration::milliseconds(250);
            assert!(!item("a", Some(ts)).is_upload_date_approximated());
        }
    }

    mod content_hash_tests {
        use super::*;

        #[test]
        fn test_empty_sequence_hashes_to_one() {
            assert_eq!(content_hash(&[]), 1);
        }

        #[test]
        fn test_hash_is_fold_of_identities() {
            let a = item("a", None);
            let b = item("b", None);
            let expected = 31 * (31 + i64::from(a.id.stable_hash())) + i64::from(b.id.stable_hash());
            assert_eq!(content_hash(&[a, b]), expected);
        }

        #[test]
        fn test_hash_is_order_sensitive() {
            let a = item("a", None);
            let b = item("b", None);
            assert_ne!(
                content_hash(&[a.clone(), b.clone()]),
                content_hash(&[b, a])
            );
        }

        #[test]
        fn test_hash_is_duplicate_sensitive() {
            let a = item("a", None);
            assert_ne!(content_hash(&[a.clone()]), content_hash(&[a.clone(), a]));
        }

        #[test]
        fn test_changing_one_identity_changes_hash() {
            let a = item("https://example.com/1", None);
            let b = item("https://example.com/2", None);
            let c = item("https://example.com/3", None);
            assert_ne!(
                content_hash(&[a.clone(), b]),
                content_hash(&[a, c])
            );
        }

        #[test]
        fn test_aggregate_result_carries_hash() {
            let now = Utc::now();
            let items = vec![item("a", None)];
            let result = AggregateResult::new(now, items.clone());
            assert_eq!(result.content_hash, content_hash(&items));
            assert_eq!(result.generated_at, now);
        }
    }
}
