use std::time::Duration;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

use crate::aggregator::{Aggregator, SourceStatus};
use crate::error::AggregationFailure;

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Aggregator,
    /// How long a `/feed` request waits for a refresh before giving up.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(aggregator: Aggregator, request_timeout: Duration) -> Self {
        Self {
            aggregator,
            request_timeout,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/feed", get(get_feed))
        .route("/debug/sources", get(debug_sources))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
struct FeedQuery {
    #[serde(default)]
    refresh: Option<String>,
}

impl FeedQuery {
    fn force_refresh(&self) -> bool {
        matches!(
            self.refresh.as_deref().map(str::trim).map(str::to_ascii_lowercase).as_deref(),
            Some("1" | "true" | "yes")
        )
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    message: String,
    detail: String,
}

fn error_response(status: StatusCode, message: &str, detail: String) -> Response {
    (
        status,
        Json(ErrorBody {
            message: message.to_string(),
            detail,
        }),
    )
        .into_response()
}

impl IntoResponse for AggregationFailure {
    fn into_response(self) -> Response {
        error_response(StatusCode::BAD_GATEWAY, "Feed is temporarily unavailable", self.detail)
    }
}

async fn get_feed(State(state): State<AppState>, Query(q): Query<FeedQuery>) -> Response {
    let force = q.force_refresh();
    match tokio::time::timeout(state.request_timeout, state.aggregator.get_feed(force)).await {
        Ok(Ok(snapshot)) => Json(snapshot).into_response(),
        Ok(Err(failure)) => failure.into_response(),
        // The refresh keeps running on its own task and still fills the cache.
        Err(_) => error_response(
            StatusCode::GATEWAY_TIMEOUT,
            "Feed is taking longer than expected",
            format!(
                "no response within {} ms; try again shortly",
                state.request_timeout.as_millis()
            ),
        ),
    }
}

async fn debug_sources(State(state): State<AppState>) -> Json<Vec<SourceStatus>> {
    Json(state.aggregator.source_statuses())
}
