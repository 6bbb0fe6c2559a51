//! Precise upload times remembered from an earlier aggregate.
//!
//! Some services report upload dates that grow coarser as items age. An
//! earlier aggregate (the "base") still holds the precise values, so items
//! whose timestamps look rounded are corrected from it.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use crate::cutoff::compute_cutoff;
use crate::model::{Item, ItemId};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("base contains item {0} more than once")]
    DuplicateIdentity(String),

    #[error("base item at position {0} has an empty URL")]
    EmptyUrl(usize),
}

/// Read side of the correction data, as seen by the collector.
pub trait CorrectionLookup {
    fn lookup(&self, id: &ItemId) -> Option<DateTime<Utc>>;
}

/// Immutable cutoff plus identity -> precise timestamp map. Published as one
/// value so readers never combine a new map with an old cutoff.
#[derive(Debug, Clone)]
pub struct CorrectionSnapshot {
    cutoff: DateTime<Utc>,
    precise: HashMap<ItemId, DateTime<Utc>>,
}

impl CorrectionSnapshot {
    pub fn empty(cutoff: DateTime<Utc>) -> Self {
        Self {
            cutoff,
            precise: HashMap::new(),
        }
    }

    /// Build a snapshot from the items of an earlier aggregate. Items
    /// without a timestamp carry nothing to correct with and are skipped.
    pub fn from_base(base: &[Item], cutoff: DateTime<Utc>) -> Result<Self, CacheError> {
        let mut precise = HashMap::with_capacity(base.len());
        let mut seen = HashSet::with_capacity(base.len());

        for (position, item) in base.iter().enumerate() {
            if item.id.url.is_empty() {
                return Err(CacheError::EmptyUrl(position));
            }
            if !seen.insert(&item.id) {
                return Err(CacheError::DuplicateIdentity(item.id.to_string()));
            }
            if let Some(ts) = item.upload_timestamp {
                precise.insert(item.id.clone(), ts);
            }
        }

        Ok(Self { cutoff, precise })
    }

    pub fn cutoff(&self) -> DateTime<Utc> {
        self.cutoff
    }

    pub fn len(&self) -> usize {
        self.precise.len()
    }

    pub fn is_empty(&self) -> bool {
        self.precise.is_empty()
    }
}

impl CorrectionLookup for CorrectionSnapshot {
    fn lookup(&self, id: &ItemId) -> Option<DateTime<Utc>> {
        self.precise.get(id).copied()
    }
}

/// Shared, atomically replaceable correction state.
pub struct CorrectionCache {
    current: RwLock<Arc<CorrectionSnapshot>>,
    window_weeks: u32,
}

impl CorrectionCache {
    /// Starts empty with a fresh cutoff.
    pub fn new(window_weeks: u32) -> Self {
        Self::with_snapshot(CorrectionSnapshot::empty(compute_cutoff(window_weeks)), window_weeks)
    }

    pub fn with_snapshot(snapshot: CorrectionSnapshot, window_weeks: u32) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
            window_weeks,
        }
    }

    /// The snapshot a run should use from start to finish.
    pub async fn snapshot(&self) -> Arc<CorrectionSnapshot> {
        self.current.read().await.clone()
    }

    pub async fn cutoff(&self) -> DateTime<Utc> {
        self.snapshot().await.cutoff()
    }

    pub async fn lookup(&self, id: &ItemId) -> Option<DateTime<Utc>> {
        self.snapshot().await.lookup(id)
    }

    /// Replace the whole correction map from `base` and reset the cutoff.
    ///
    /// The new snapshot is built before the lock is taken; the write lock is
    /// held only for the pointer swap.
    pub async fn replace(&self, base: &[Item]) -> Result<(), CacheError> {
        let snapshot = CorrectionSnapshot::from_base(base, compute_cutoff(self.window_weeks))?;
        let entries = snapshot.len();
        let cutoff = snapshot.cutoff();

        *self.current.write().await = Arc::new(snapshot);

        info!("Correction cache replaced: {} entries, cutoff {}", entries, cutoff);
        Ok(())
    }
}
