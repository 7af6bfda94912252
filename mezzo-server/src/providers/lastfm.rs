//! LastFM API client
//!
//! Wraps the audioscrobbler JSON API. LastFM reports "no such entity"
//! as in-body error code 6, which callers treat differently from
//! transport failures (it feeds the negative-result cache).

use crate::queue::QueueError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";
const USER_AGENT: &str = concat!("mezzo/", env!("CARGO_PKG_VERSION"));

/// LastFM placeholder image hash; LastFM serves this star graphic for
/// entities it has no real artwork for.
pub const PLACEHOLDER_IMAGE: &str = "2a96cbd8b46e442fc41c2b86b821562f";

/// LastFM client errors
#[derive(Debug, Error)]
pub enum LastfmError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("API error {0}: {1}")]
    Api(u32, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<u32>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ArtistEnvelope {
    artist: RawArtist,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    name: String,
    #[serde(default)]
    image: Vec<RawImage>,
    #[serde(default)]
    tags: RawTags,
    #[serde(default)]
    similar: RawSimilar,
}

#[derive(Debug, Deserialize)]
struct RawImage {
    #[serde(rename = "#text")]
    url: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawTags {
    #[serde(default)]
    tag: Vec<RawTag>,
}

#[derive(Debug, Deserialize)]
struct RawTag {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSimilar {
    #[serde(default)]
    artist: Vec<RawSimilarArtist>,
}

#[derive(Debug, Deserialize)]
struct RawSimilarArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct TrackEnvelope {
    track: RawTrack,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    name: String,
    artist: Option<RawTrackArtist>,
    #[serde(default)]
    toptags: RawTags,
    album: Option<RawTrackAlbum>,
}

#[derive(Debug, Deserialize)]
struct RawTrackArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawTrackAlbum {
    title: Option<String>,
    #[serde(default)]
    image: Vec<RawImage>,
}

/// Flattened artist.getInfo result.
#[derive(Debug, Clone, Serialize)]
pub struct LastfmArtist {
    pub name: String,
    pub tags: Vec<String>,
    pub similar: Vec<String>,
    /// Largest non-placeholder image, when present.
    pub image_url: Option<String>,
}

/// Flattened track.getInfo result.
#[derive(Debug, Clone, Serialize)]
pub struct LastfmTrack {
    pub name: String,
    pub artist: Option<String>,
    pub tags: Vec<String>,
    pub album: Option<String>,
    pub album_image_url: Option<String>,
}

/// LastFM API client
pub struct LastfmClient {
    http: reqwest::Client,
    api_key: String,
}

impl LastfmClient {
    pub fn new(api_key: String) -> Result<Self, LastfmError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LastfmError::Network(e.to_string()))?;

        Ok(Self { http, api_key })
    }

    async fn call(&self, method: &str, params: &[(&str, &str)]) -> Result<String, LastfmError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("method", method),
            ("api_key", self.api_key.as_str()),
            ("format", "json"),
            ("autocorrect", "1"),
        ];
        query.extend_from_slice(params);

        let response = self
            .http
            .get(API_URL)
            .query(&query)
            .send()
            .await
            .map_err(|e| LastfmError::Network(e.to_string()))?;

        let body = response
            .text()
            .await
            .map_err(|e| LastfmError::Network(e.to_string()))?;

        // LastFM errors arrive in-body with their own code space.
        if let Ok(ErrorEnvelope {
            error: Some(code),
            message,
        }) = serde_json::from_str::<ErrorEnvelope>(&body)
        {
            let message = message.unwrap_or_default();
            if code == 6 {
                return Err(LastfmError::NotFound(message));
            }
            return Err(LastfmError::Api(code, message));
        }

        Ok(body)
    }

    pub async fn artist_get_info(&self, name: &str) -> Result<LastfmArtist, LastfmError> {
        let body = self.call("artist.getinfo", &[("artist", name)]).await?;

        let envelope: ArtistEnvelope =
            serde_json::from_str(&body).map_err(|e| LastfmError::Parse(e.to_string()))?;
        let raw = envelope.artist;

        tracing::debug!(artist = %raw.name, "Retrieved artist from LastFM");

        Ok(LastfmArtist {
            name: raw.name,
            tags: raw.tags.tag.into_iter().map(|t| t.name).collect(),
            similar: raw.similar.artist.into_iter().map(|a| a.name).collect(),
            image_url: pick_image(&raw.image),
        })
    }

    pub async fn track_get_info(
        &self,
        name: &str,
        artist: &str,
    ) -> Result<LastfmTrack, LastfmError> {
        let body = self
            .call("track.getinfo", &[("track", name), ("artist", artist)])
            .await?;

        let envelope: TrackEnvelope =
            serde_json::from_str(&body).map_err(|e| LastfmError::Parse(e.to_string()))?;
        let raw = envelope.track;

        Ok(LastfmTrack {
            name: raw.name,
            artist: raw.artist.map(|a| a.name),
            tags: raw.toptags.tag.into_iter().map(|t| t.name).collect(),
            album: raw.album.as_ref().and_then(|a| a.title.clone()),
            album_image_url: raw.album.as_ref().and_then(|a| pick_image(&a.image)),
        })
    }
}

/// Largest usable image: last entry, skipping empties and the known
/// placeholder artwork.
fn pick_image(images: &[RawImage]) -> Option<String> {
    images
        .iter()
        .rev()
        .map(|image| image.url.as_str())
        .find(|url| !url.is_empty() && !url.contains(PLACEHOLDER_IMAGE))
        .map(|url| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn artist_response_parses() {
        let json = r##"{"artist": {
            "name": "Daft Punk",
            "image": [
                {"#text": "https://img/s.png"},
                {"#text": "https://img/xl.png"}
            ],
            "tags": {"tag": [{"name": "electronic"}, {"name": "house"}]},
            "similar": {"artist": [{"name": "Justice"}]}
        }}"##;
        let envelope: ArtistEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.artist.tags.tag.len(), 2);
        assert_eq!(
            pick_image(&envelope.artist.image).as_deref(),
            Some("https://img/xl.png")
        );
    }

    #[test]
    fn placeholder_image_is_skipped() {
        let images = vec![
            RawImage {
                url: "https://img/real.png".to_string(),
            },
            RawImage {
                url: format!("https://img/{}.png", PLACEHOLDER_IMAGE),
            },
        ];
        assert_eq!(pick_image(&images).as_deref(), Some("https://img/real.png"));
    }

    #[test]
    fn error_code_six_maps_to_not_found() {
        let json = r#"{"error": 6, "message": "The artist you supplied could not be found"}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.error, Some(6));
    }

    #[test]
    fn missing_sections_default_to_empty() {
        let json = r#"{"artist": {"name": "Obscure Act"}}"#;
        let envelope: ArtistEnvelope = serde_json::from_str(json).unwrap();
        assert!(envelope.artist.tags.tag.is_empty());
        assert!(envelope.artist.similar.artist.is_empty());
        assert!(envelope.artist.image.is_empty());
    }
}
