//! mezzo-server library interface
//!
//! Exposes the application state, router assembly and all service
//! modules for integration testing.

pub mod api;
pub mod cache;
pub mod db;
pub mod error;
pub mod finders;
pub mod models;
pub mod monitoring;
pub mod palette;
pub mod providers;
pub mod queue;

pub use crate::error::{ApiError, ApiResult};

use axum::http::{header::HeaderName, HeaderValue};
use axum::Router;
use cache::CacheClient;
use chrono::{DateTime, Utc};
use monitoring::Monitoring;
use providers::{DeezerClient, LastfmClient, SpotifyClient};
use queue::QueueController;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Durable store connection pool
    pub db: SqlitePool,
    /// Fast-cache client
    pub cache: CacheClient,
    /// Rate-limited task queue for all outbound work
    pub queue: QueueController,
    pub spotify: Arc<SpotifyClient>,
    pub deezer: Arc<DeezerClient>,
    pub lastfm: Arc<LastfmClient>,
    /// Metrics collector
    pub monitoring: Monitoring,
    /// Plain HTTP client for image fetches (palette extraction)
    pub http: reqwest::Client,
    /// Service startup timestamp for uptime reporting
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        db: SqlitePool,
        cache: CacheClient,
        queue: QueueController,
        spotify: SpotifyClient,
        deezer: DeezerClient,
        lastfm: LastfmClient,
        monitoring: Monitoring,
    ) -> mezzo_common::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("mezzo/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| mezzo_common::Error::Internal(format!("HTTP client build failed: {e}")))?;

        Ok(Self {
            db,
            cache,
            queue,
            spotify: Arc::new(spotify),
            deezer: Arc::new(deezer),
            lastfm: Arc::new(lastfm),
            monitoring,
            http,
            startup_time: Utc::now(),
        })
    }
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::artists::routes())
        .merge(api::albums::routes())
        .merge(api::tracks::routes())
        .merge(api::metrics::routes())
        .merge(api::health::routes())
        .fallback(not_found)
        .layer(SetResponseHeaderLayer::if_not_present(
            HeaderName::from_static("mezzo-version"),
            HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
        ))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
