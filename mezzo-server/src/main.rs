//! mezzo - Music Metadata Aggregation Service
//!
//! Resolves canonical metadata for artists, albums and tracks from
//! Spotify, Deezer and LastFM, merges the results, and caches them in
//! redis and SQLite. All outbound provider calls flow through a
//! per-source rate-limited task queue.

use anyhow::Result;
use mezzo_common::config::Config;
use mezzo_common::events::EventBus;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use mezzo_server::cache::CacheClient;
use mezzo_server::monitoring::Monitoring;
use mezzo_server::providers::{DeezerClient, LastfmClient, SpotifyClient};
use mezzo_server::queue::QueueController;
use mezzo_server::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting mezzo (metadata aggregation) service");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = Config::load()?;

    // Credentials are required before anything is wired up.
    let (spotify_id, spotify_secret) = config.spotify.resolve()?;
    let lastfm_key = config.lastfm.resolve()?;

    let db = mezzo_server::db::init_database_pool(&config.database.path).await?;
    info!("Database connection established");

    let cache = CacheClient::connect(&config.redis.url, config.expiration.clone()).await?;

    let events = EventBus::new(256);

    let queue = QueueController::new(&config.sources, events.clone())?;
    queue.start();
    info!("Queue controller started");

    let monitoring = Monitoring::new();
    monitoring.start(&events);

    let spotify = SpotifyClient::new(spotify_id, spotify_secret)?;
    let deezer = DeezerClient::new()?;
    let lastfm = LastfmClient::new(lastfm_key)?;

    let state = AppState::new(db, cache, queue, spotify, deezer, lastfm, monitoring)?;

    let app = mezzo_server::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
