//! Spotify Web API client
//!
//! Client-credentials flow; the bearer token is cached and refreshed
//! shortly before expiry. Rate limiting is not handled here - all
//! calls are admitted through the task queue.

use crate::queue::QueueError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;

const ACCOUNTS_URL: &str = "https://accounts.spotify.com/api/token";
const API_URL: &str = "https://api.spotify.com/v1";
const USER_AGENT: &str = concat!("mezzo/", env!("CARGO_PKG_VERSION"));

/// Refresh the token this long before Spotify's stated expiry so
/// in-flight requests do not race it.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Spotify client errors
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct TokenState {
    access_token: String,
    expires_at: Instant,
}

/// Paged item container used by the search endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
}

/// Search response; only the section matching the queried type is set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchResponse {
    pub artists: Option<Page<ArtistObject>>,
    pub albums: Option<Page<AlbumObject>>,
    pub tracks: Option<Page<TrackObject>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistObject {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    pub popularity: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImageObject {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SimpleArtist {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumObject {
    pub id: String,
    pub name: String,
    pub release_date: Option<String>,
    #[serde(default)]
    pub images: Vec<ImageObject>,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackObject {
    pub id: String,
    pub name: String,
    pub duration_ms: Option<i64>,
    pub preview_url: Option<String>,
    pub explicit: Option<bool>,
    pub album: Option<AlbumObject>,
    #[serde(default)]
    pub artists: Vec<SimpleArtist>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MultipleArtists {
    pub artists: Vec<ArtistObject>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioFeaturesObject {
    pub id: String,
    pub danceability: f64,
    pub energy: f64,
    pub loudness: f64,
    pub speechiness: f64,
    pub acousticness: f64,
    pub instrumentalness: f64,
    pub liveness: f64,
    pub valence: f64,
    pub tempo: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioFeaturesResponse {
    /// Entries are null for ids Spotify has no analysis for.
    pub audio_features: Vec<Option<AudioFeaturesObject>>,
}

/// Spotify Web API client
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Arc<Mutex<Option<TokenState>>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, SpotifyError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Arc::new(Mutex::new(None)),
        })
    }

    /// Current bearer token, refreshing through the client-credentials
    /// flow when absent or about to expire.
    async fn access_token(&self) -> Result<String, SpotifyError> {
        let mut guard = self.token.lock().await;

        if let Some(state) = guard.as_ref() {
            if state.expires_at > Instant::now() {
                return Ok(state.access_token.clone());
            }
        }

        tracing::debug!("Refreshing Spotify access token");

        let response = self
            .http
            .post(ACCOUNTS_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Auth(format!("{}: {}", status.as_u16(), body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(e.to_string()))?;

        let expires_in = Duration::from_secs(token.expires_in)
            .saturating_sub(TOKEN_EXPIRY_MARGIN);
        *guard = Some(TokenState {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + expires_in,
        });

        Ok(token.access_token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, SpotifyError> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", API_URL, path);

        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .query(query)
            .send()
            .await
            .map_err(|e| SpotifyError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 401 {
            // Token invalidated server-side; drop it so the next call
            // re-authenticates.
            *self.token.lock().await = None;
            return Err(SpotifyError::Auth("token rejected".to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SpotifyError::Api(status.as_u16(), body));
        }

        response
            .json()
            .await
            .map_err(|e| SpotifyError::Parse(e.to_string()))
    }

    pub async fn search_artist(&self, name: &str) -> Result<SearchResponse, SpotifyError> {
        self.get_json(
            "search",
            &[
                ("type", "artist".to_string()),
                ("q", format!("\"{}\"", name)),
                ("limit", "5".to_string()),
            ],
        )
        .await
    }

    pub async fn search_album(
        &self,
        album: &str,
        artist: &str,
    ) -> Result<SearchResponse, SpotifyError> {
        self.get_json(
            "search",
            &[
                ("type", "album".to_string()),
                ("q", format!("\"{}\" artist:\"{}\"", album, artist)),
                ("limit", "5".to_string()),
            ],
        )
        .await
    }

    pub async fn search_track(
        &self,
        name: &str,
        artist: &str,
        album: Option<&str>,
    ) -> Result<SearchResponse, SpotifyError> {
        let mut q = format!("\"{}\" artist:{}", name, artist);
        if let Some(album) = album {
            q.push_str(&format!(" album:{}", album));
        }
        self.get_json(
            "search",
            &[
                ("type", "track".to_string()),
                ("q", q),
                ("limit", "5".to_string()),
            ],
        )
        .await
    }

    /// Batched artist lookup. Spotify caps this endpoint at 50 ids;
    /// callers chunk accordingly.
    pub async fn get_artists(&self, ids: &[String]) -> Result<MultipleArtists, SpotifyError> {
        self.get_json("artists", &[("ids", ids.join(","))]).await
    }

    /// Batched audio-features lookup, also capped at 50 ids.
    pub async fn get_audio_features(
        &self,
        ids: &[String],
    ) -> Result<AudioFeaturesResponse, SpotifyError> {
        self.get_json("audio-features", &[("ids", ids.join(","))])
            .await
    }
}
