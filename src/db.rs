use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, FromRow, SqlitePool};
use tokio::sync::watch;
use tracing::info;

use crate::config::FeedConfig;
use crate::model::Subscription;
use crate::registry::{RegistryError, SubscriptionRegistry};

#[derive(Debug, Clone, FromRow)]
struct SubscriptionRow {
    id: i64,
    service_id: i64,
    name: String,
    url: String,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = sqlx::Error;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let service_id = u32::try_from(row.service_id).map_err(|e| {
            sqlx::Error::Decode(
                format!("subscription {} has service_id {}: {}", row.id, row.service_id, e).into(),
            )
        })?;

        Ok(Subscription {
            id: row.id,
            service_id,
            name: row.name,
            url: row.url,
        })
    }
}

/// SQLite-backed subscription registry.
pub struct Database {
    pool: SqlitePool,
    version: watch::Sender<u64>,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Every connection to an in-memory database opens a new, empty one.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        let (version, _) = watch::channel(0);

        Ok(Self { pool, version })
    }

    pub async fn initialize(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS subscriptions (
                id INTEGER PRIMARY KEY,
                service_id INTEGER NOT NULL DEFAULT 0,
                name TEXT NOT NULL,
                url TEXT NOT NULL UNIQUE
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Make the stored subscriptions match `configs`: upsert every configured
    /// feed and drop the ones no longer listed. Observers of `changes` are
    /// notified afterwards.
    pub async fn sync_subscriptions(&self, configs: &[FeedConfig]) -> anyhow::Result<()> {
        for config in configs {
            sqlx::query(
                r#"
                INSERT INTO subscriptions (service_id, name, url)
                VALUES (?, ?, ?)
                ON CONFLICT(url) DO UPDATE SET
                    service_id = excluded.service_id,
                    name = excluded.name
                "#,
            )
            .bind(i64::from(config.service_id))
            .bind(&config.name)
            .bind(&config.url)
            .execute(&self.pool)
            .await?;
        }

        let configured: HashSet<&str> = configs.iter().map(|c| c.url.as_str()).collect();
        for existing in self.get_all_subscriptions().await? {
            if !configured.contains(existing.url.as_str()) {
                info!("Removing subscription '{}'", existing.name);
                sqlx::query("DELETE FROM subscriptions WHERE id = ?")
                    .bind(existing.id)
                    .execute(&self.pool)
                    .await?;
            }
        }

        self.version.send_modify(|v| *v += 1);
        Ok(())
    }

    pub async fn get_all_subscriptions(&self) -> Result<Vec<Subscription>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SubscriptionRow>("SELECT * FROM subscriptions ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Subscription::try_from).collect()
    }
}

#[async_trait]
impl SubscriptionRegistry for Database {
    async fn subscriptions(&self) -> Result<Vec<Subscription>, RegistryError> {
        Ok(self.get_all_subscriptions().await?)
    }

    fn changes(&self) -> Option<watch::Receiver<u64>> {
        Some(self.version.subscribe())
    }
}
