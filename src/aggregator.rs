use std::cmp::Ordering as CmpOrdering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::collector;
use crate::correction::{CacheError, CorrectionCache};
use crate::fetcher::SourceFetcher;
use crate::model::{AggregateResult, Item, Subscription};
use crate::registry::{RegistryError, SubscriptionRegistry};

pub const DEFAULT_MAX_CONCURRENT_FETCHES: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum AggregateError {
    #[error("could not load subscriptions: {0}")]
    Registry(#[from] RegistryError),
}

/// Merges the recent items of every subscription into one feed.
pub struct Aggregator {
    fetcher: Arc<dyn SourceFetcher>,
    corrections: Arc<CorrectionCache>,
    in_flight: AtomicUsize,
    settled: AtomicBool,
    results: watch::Sender<Option<Arc<AggregateResult>>>,
    max_concurrent_fetches: usize,
}

/// Counts one run as in flight while alive.
struct LoadingGuard<'a> {
    in_flight: &'a AtomicUsize,
    settled: &'a AtomicBool,
}

impl<'a> LoadingGuard<'a> {
    fn raise(aggregator: &'a Aggregator) -> Self {
        aggregator.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            in_flight: &aggregator.in_flight,
            settled: &aggregator.settled,
        }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.settled.store(true, Ordering::Release);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn SourceFetcher>, corrections: Arc<CorrectionCache>) -> Self {
        let (results, _) = watch::channel(None);
        Self {
            fetcher,
            corrections,
            in_flight: AtomicUsize::new(0),
            // Nothing has been loaded yet.
            settled: AtomicBool::new(false),
            results,
            max_concurrent_fetches: DEFAULT_MAX_CONCURRENT_FETCHES,
        }
    }

    pub fn with_max_concurrent_fetches(mut self, limit: usize) -> Self {
        self.max_concurrent_fetches = limit.max(1);
        self
    }

    pub fn corrections(&self) -> &Arc<CorrectionCache> {
        &self.corrections
    }

    /// True while any run is in progress, and before the first run has finished.
    pub fn is_loading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire) > 0 || !self.settled.load(Ordering::Acquire)
    }

    /// Receiver that sees every published result. Slow observers skip
    /// straight to the newest one.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<AggregateResult>>> {
        self.results.subscribe()
    }

    pub fn latest(&self) -> Option<Arc<AggregateResult>> {
        self.results.borrow().clone()
    }

    /// Pull the current subscriptions from `registry` and aggregate them.
    pub async fn refresh(
        &self,
        registry: &dyn SubscriptionRegistry,
    ) -> Result<AggregateResult, AggregateError> {
        let _loading = LoadingGuard::raise(self);
        let subscriptions = registry.subscriptions().await?;
        Ok(self.aggregate(&subscriptions).await)
    }

    /// Aggregate the given subscriptions.
    pub async fn run(&self, subscriptions: &[Subscription]) -> AggregateResult {
        let _loading = LoadingGuard::raise(self);
        self.aggregate(subscriptions).await
    }

    async fn aggregate(&self, subscriptions: &[Subscription]) -> AggregateResult {
        info!("Aggregating {} subscriptions", subscriptions.len());

        // One snapshot for the whole run, even if the base is replaced meanwhile.
        let snapshot = self.corrections.snapshot().await;

        // Each per-source future owns its inputs so a run can be spawned.
        let per_source: Vec<Vec<Item>> = stream::iter(subscriptions.to_vec())
            .map(|subscription| {
                let fetcher = self.fetcher.clone();
                let snapshot = snapshot.clone();
                async move { collector::collect(fetcher.as_ref(), &subscription, &snapshot).await }
            })
            .buffered(self.max_concurrent_fetches)
            .collect()
            .await;

        let mut items = dedup_by_identity(per_source.into_iter().flatten().collect());
        sort_by_upload_date(&mut items);

        let result = AggregateResult::new(Utc::now(), items);
        info!(
            "Aggregation complete: {} items, hash {}",
            result.items.len(),
            result.content_hash
        );

        self.results.send_replace(Some(Arc::new(result.clone())));
        result
    }

    /// Rebuild the correction cache from `base` without blocking the caller.
    pub fn set_base(&self, base: Arc<AggregateResult>) -> JoinHandle<Result<(), CacheError>> {
        let corrections = self.corrections.clone();
        tokio::spawn(async move {
            let outcome = corrections.replace(&base.items).await;
            if let Err(e) = &outcome {
                error!("Rejected base feed: {}", e);
            }
            outcome
        })
    }

    /// Rebuild the correction cache from `base` and wait for the swap.
    pub async fn replace_base(&self, base: &AggregateResult) -> Result<(), CacheError> {
        self.corrections.replace(&base.items).await
    }
}

/// Newest first, with dateless items ahead of every dated one.
///
/// A dateless item is usually one that was just published, so it ranks as
/// newer than anything carrying a date. Dateless items tie with each other.
pub fn compare_upload_dates(a: &Item, b: &Item) -> CmpOrdering {
    match (a.upload_timestamp, b.upload_timestamp) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => CmpOrdering::Greater,
        (None, Some(_)) => CmpOrdering::Less,
        (None, None) => CmpOrdering::Equal,
    }
}

/// Stable sort; tied items keep the order they were collected in.
pub fn sort_by_upload_date(items: &mut [Item]) {
    items.sort_by(compare_upload_dates);
}

/// Keep the first occurrence of each identity.
fn dedup_by_identity(items: Vec<Item>) -> Vec<Item> {
    let before = items.len();
    let mut seen = HashSet::with_capacity(before);
    let items: Vec<Item> = items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect();

    if items.len() != before {
        debug!("Dropped {} duplicate items", before - items.len());
    }
    items
}

/// Aggregate now, then again on every interval tick or subscription change.
///
/// Each result is fed back as the next base, which also rolls the cutoff
/// forward.
pub async fn start_background_refresh(
    aggregator: Arc<Aggregator>,
    registry: Arc<dyn SubscriptionRegistry>,
    interval_minutes: u64,
) {
    let interval = Duration::from_secs(interval_minutes * 60);
    let mut changes = registry.changes();

    info!("Starting initial aggregation");
    loop {
        match aggregator.refresh(registry.as_ref()).await {
            Ok(result) => {
                if let Err(e) = aggregator.replace_base(&result).await {
                    error!("Could not use latest feed as base: {}", e);
                }
            }
            Err(e) => error!("Aggregation failed: {}", e),
        }

        wait_for_trigger(&mut changes, interval).await;
    }
}

async fn wait_for_trigger(changes: &mut Option<watch::Receiver<u64>>, interval: Duration) {
    loop {
        let Some(rx) = changes.as_mut() else {
            tokio::time::sleep(interval).await;
            info!("Starting scheduled aggregation");
            return;
        };

        let registry_gone = tokio::select! {
            _ = tokio::time::sleep(interval) => {
                info!("Starting scheduled aggregation");
                false
            }
            changed = rx.changed() => {
                if changed.is_ok() {
                    info!("Subscriptions changed, re-aggregating");
                }
                changed.is_err()
            }
        };

        if !registry_gone {
            return;
        }
        *changes = None;
    }
}
