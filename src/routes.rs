use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::error;

use crate::aggregator::Aggregator;
use crate::registry::SubscriptionRegistry;

pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    pub registry: Arc<dyn SubscriptionRegistry>,
}

#[derive(Debug, Serialize)]
pub struct FeedStatus {
    pub loading: bool,
    pub generated_at: Option<DateTime<Utc>>,
    pub content_hash: Option<i64>,
    pub item_count: usize,
}

/// Latest aggregate, or 204 until the first run has finished.
pub async fn feed(State(state): State<Arc<AppState>>) -> Response {
    match state.aggregator.latest() {
        Some(result) => Json(result.as_ref().clone()).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

pub async fn feed_status(State(state): State<Arc<AppState>>) -> Json<FeedStatus> {
    let latest = state.aggregator.latest();
    Json(FeedStatus {
        loading: state.aggregator.is_loading(),
        generated_at: latest.as_ref().map(|r| r.generated_at),
        content_hash: latest.as_ref().map(|r| r.content_hash),
        item_count: latest.as_ref().map_or(0, |r| r.items.len()),
    })
}

/// Start a run in the background and return immediately.
pub async fn refresh(State(state): State<Arc<AppState>>) -> StatusCode {
    let aggregator = state.aggregator.clone();
    let registry = state.registry.clone();
    tokio::spawn(async move {
        if let Err(e) = aggregator.refresh(registry.as_ref()).await {
            error!("Requested aggregation failed: {}", e);
        }
    });

    StatusCode::ACCEPTED
}

pub async fn health() -> impl IntoResponse {
    "OK"
}
