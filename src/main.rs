use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feed_engine::aggregator::{start_background_refresh, Aggregator};
use feed_engine::config::Config;
use feed_engine::correction::CorrectionCache;
use feed_engine::db::Database;
use feed_engine::fetcher::HttpFetcher;
use feed_engine::registry::SubscriptionRegistry;
use feed_engine::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "feed_engine=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load("feeds.toml")?;
    info!("Loaded {} feeds from configuration", config.feeds.len());

    // Subscription registry
    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite:feed_engine.db?mode=rwc".to_string());
    let db = Database::new(&database_url).await?;
    db.initialize().await?;
    db.sync_subscriptions(&config.feeds).await?;
    info!("Database initialized");

    let registry: Arc<dyn SubscriptionRegistry> = Arc::new(db);

    let corrections = Arc::new(CorrectionCache::new(config.cutoff_weeks));
    let aggregator = Arc::new(
        Aggregator::new(Arc::new(HttpFetcher::new()), corrections)
            .with_max_concurrent_fetches(config.max_concurrent_fetches),
    );

    // Start background refresh task
    let bg_aggregator = aggregator.clone();
    let bg_registry = registry.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_aggregator, bg_registry, refresh_interval).await;
    });

    let state = Arc::new(AppState {
        aggregator,
        registry,
    });

    let app = Router::new()
        .route("/feed", get(routes::feed))
        .route("/feed/status", get(routes::feed_status))
        .route("/refresh", post(routes::refresh))
        .route("/health", get(routes::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server starting on http://localhost:3000");

    axum::serve(listener, app).await?;

    Ok(())
}
