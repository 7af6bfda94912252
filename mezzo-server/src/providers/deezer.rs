//! Deezer API client
//!
//! Deezer's public search endpoints need no authentication. Errors
//! come back as 200s with an `error` object in the body, so both the
//! HTTP status and the payload are checked.

use crate::queue::QueueError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_URL: &str = "https://api.deezer.com";
const USER_AGENT: &str = concat!("mezzo/", env!("CARGO_PKG_VERSION"));

/// Deezer client errors
#[derive(Debug, Error)]
pub enum DeezerError {
    #[error("Network error: {0}")]
    Network(String),

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
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    code: u16,
    message: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackSearch {
    #[serde(default)]
    pub data: Vec<TrackItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackItem {
    pub id: i64,
    pub title: String,
    pub duration: Option<i64>,
    pub preview: Option<String>,
    pub explicit_lyrics: Option<bool>,
    pub artist: Option<ArtistItem>,
    pub album: Option<AlbumItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumSearch {
    #[serde(default)]
    pub data: Vec<AlbumItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlbumItem {
    pub id: i64,
    pub title: String,
    pub cover_big: Option<String>,
    pub artist: Option<ArtistItem>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArtistItem {
    pub id: i64,
    pub name: String,
}

/// Deezer API client
pub struct DeezerClient {
    http: reqwest::Client,
}

impl DeezerClient {
    pub fn new() -> Result<Self, DeezerError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| DeezerError::Network(e.to_string()))?;

        Ok(Self { http })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, DeezerError> {
        let url = format!("{}/{}", API_URL, path);

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| DeezerError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| DeezerError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(DeezerError::Api(status.as_u16(), body));
        }

        // In-body errors keep the 200 status.
        if let Ok(ApiErrorBody {
            error: Some(detail),
        }) = serde_json::from_str::<ApiErrorBody>(&body)
        {
            return Err(DeezerError::Api(detail.code, detail.message));
        }

        serde_json::from_str(&body).map_err(|e| DeezerError::Parse(e.to_string()))
    }

    pub async fn search_track(
        &self,
        track: &str,
        artist: &str,
        album: Option<&str>,
    ) -> Result<TrackSearch, DeezerError> {
        let mut q = format!("track:\"{}\" artist:\"{}\"", track, artist);
        if let Some(album) = album {
            q.push_str(&format!(" album:\"{}\"", album));
        }
        self.get_json("search/track", &[("q", q)]).await
    }

    pub async fn search_album(
        &self,
        album: &str,
        artist: &str,
    ) -> Result<AlbumSearch, DeezerError> {
        let q = format!("album:\"{}\" artist:\"{}\"", album, artist);
        self.get_json("search/album", &[("q", q)]).await
    }

    pub async fn get_track(&self, id: i64) -> Result<TrackItem, DeezerError> {
        self.get_json(&format!("track/{}", id), &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn track_search_parses() {
        let json = r#"{"data": [{
            "id": 3135556, "title": "Harder, Better, Faster, Stronger",
            "duration": 224, "preview": "https://cdn/preview.mp3",
            "explicit_lyrics": false,
            "artist": {"id": 27, "name": "Daft Punk"},
            "album": {"id": 302127, "title": "Discovery", "cover_big": "https://cdn/cover.jpg"}
        }]}"#;
        let search: TrackSearch = serde_json::from_str(json).unwrap();
        assert_eq!(search.data.len(), 1);
        assert_eq!(search.data[0].album.as_ref().unwrap().title, "Discovery");
    }

    #[test]
    fn error_body_is_detected() {
        let json = r#"{"error": {"type": "OAuthException", "message": "Quota limit exceeded", "code": 4}}"#;
        let parsed: ApiErrorBody = serde_json::from_str(json).unwrap();
        let detail = parsed.error.unwrap();
        assert_eq!(detail.code, 4);
        assert_eq!(detail.message, "Quota limit exceeded");
    }
}
