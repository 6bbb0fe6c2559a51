use tracing::{debug, warn};

use crate::correction::{CorrectionLookup, CorrectionSnapshot};
use crate::fetcher::SourceFetcher;
use crate::model::{Item, Subscription};

/// Fetch one subscription and keep the items that belong in the feed.
///
/// Never fails: a source that cannot be fetched contributes nothing.
pub async fn collect(
    fetcher: &dyn SourceFetcher,
    subscription: &Subscription,
    snapshot: &CorrectionSnapshot,
) -> Vec<Item> {
    let source = match fetcher.fetch(subscription).await {
        Ok(Some(source)) => source,
        Ok(None) => {
            debug!("No usable source for '{}'", subscription.name);
            return Vec::new();
        }
        Err(e) => {
            warn!("Failed to fetch subscription '{}': {}", subscription.name, e);
            return Vec::new();
        }
    };

    let items = select_recent(source.items, snapshot.cutoff(), snapshot);
    debug!(
        "Collected {} items from '{}'",
        items.len(),
        source.metadata.name
    );
    items
}

/// Walk newest-first items and stop at the first one that ends the recent
/// window.
///
/// A dateless item is kept. Unless it is a live stream the walk ends right
/// after it, so each source contributes at most one dateless non-live item.
/// A dated item older than `cutoff` ends the walk without being kept.
///
/// Corrections from `corrections` are applied to kept items only, after the
/// cutoff comparison.
pub fn select_recent(
    items: Vec<Item>,
    cutoff: chrono::DateTime<chrono::Utc>,
    corrections: &dyn CorrectionLookup,
) -> Vec<Item> {
    let mut selected = Vec::new();

    for item in items {
        match item.upload_timestamp {
            None => {
                let keep_walking = item.is_live_stream;
                selected.push(restore_upload_date(item, corrections));
                if !keep_walking {
                    break;
                }
            }
            Some(ts) if ts >= cutoff => {
                selected.push(restore_upload_date(item, corrections));
            }
            // Newest first: everything after this is older still.
            Some(_) => break,
        }
    }

    selected
}

fn restore_upload_date(mut item: Item, corrections: &dyn CorrectionLookup) -> Item {
    if item.is_upload_date_approximated() {
        if let Some(precise) = corrections.lookup(&item.id) {
            item.upload_timestamp = Some(precise);
        }
    }
    item
}
