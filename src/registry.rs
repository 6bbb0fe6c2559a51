//! The subscription registry boundary.

use async_trait::async_trait;
use tokio::sync::watch;

use crate::model::Subscription;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("subscription store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("subscription registry unavailable: {0}")]
    Unavailable(String),
}

/// Source of the current list of subscriptions.
///
/// Every list returned replaces the previous one entirely.
#[async_trait]
pub trait SubscriptionRegistry: Send + Sync {
    async fn subscriptions(&self) -> Result<Vec<Subscription>, RegistryError>;

    /// Receiver that is marked changed whenever the subscription set changes.
    /// Registries that never change return `None`.
    fn changes(&self) -> Option<watch::Receiver<u64>> {
        None
    }
}

/// Fixed, in-memory subscription list.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    subscriptions: Vec<Subscription>,
}

impl StaticRegistry {
    pub fn new(subscriptions: Vec<Subscription>) -> Self {
        Self { subscriptions }
    }
}

#[async_trait]
impl SubscriptionRegistry for StaticRegistry {
    async fn subscriptions(&self) -> Result<Vec<Subscription>, RegistryError> {
        Ok(self.subscriptions.clone())
    }
}
