//! Domain models shared by the cache, store and API layers
//!
//! One struct per entity serves all three layers: rows are flattened
//! into it by the db module, the fast cache stores it as JSON, and the
//! API returns it verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Upstream data providers a find request can ask to be satisfied.
///
/// Distinct from the queue's `Source`: `Provider` names where fields
/// come from, while the queue source additionally covers internal
/// pseudo-providers like palette extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Spotify,
    Deezer,
    LastFM,
}

impl Provider {
    /// Key used for negative-result markers in the fast cache and for
    /// the `source` column of image resources.
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Spotify => "spotify",
            Provider::Deezer => "deezer",
            Provider::LastFM => "lastfm",
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "spotify" => Ok(Provider::Spotify),
            "deezer" => Ok(Provider::Deezer),
            "lastfm" => Ok(Provider::LastFM),
            other => Err(format!("unknown provider '{}'", other)),
        }
    }
}

/// Six-bucket color palette extracted from cover art.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Palette {
    pub vibrant: Option<String>,
    pub dark_vibrant: Option<String>,
    pub light_vibrant: Option<String>,
    pub muted: Option<String>,
    pub dark_muted: Option<String>,
    pub light_muted: Option<String>,
}

impl Palette {
    /// True when no bucket got a color (decode produced nothing usable).
    pub fn is_empty(&self) -> bool {
        self.vibrant.is_none()
            && self.dark_vibrant.is_none()
            && self.light_vibrant.is_none()
            && self.muted.is_none()
            && self.dark_muted.is_none()
            && self.light_muted.is_none()
    }
}

/// A single hosted image within a resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageData {
    pub hash: String,
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// A group of images from one provider (one artwork in several sizes),
/// with its lazily-extracted palette.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResource {
    pub hash: String,
    pub source: Provider,
    pub images: Vec<ImageData>,
    pub palette: Option<Palette>,
}

/// Canonical artist metadata merged across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artist {
    pub hash: String,
    pub name: String,
    pub spotify_id: Option<String>,
    pub deezer_id: Option<i64>,
    pub genres: Vec<String>,
    pub tags: Vec<String>,
    pub similar: Vec<String>,
    pub preferred_resource: Option<String>,
    pub resources: Vec<ImageResource>,
    /// Spotify popularity, filled from the fast cache on request only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Artist {
    pub fn new(hash: String, name: String) -> Self {
        let now = Utc::now();
        Self {
            hash,
            name,
            spotify_id: None,
            deezer_id: None,
            genres: Vec::new(),
            tags: Vec::new(),
            similar: Vec::new(),
            preferred_resource: None,
            resources: Vec::new(),
            popularity: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Canonical album metadata. Albums carry their covers inline rather
/// than through image resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Album {
    pub hash: String,
    pub name: String,
    pub artists: Vec<String>,
    pub release_date: Option<String>,
    pub spotify_id: Option<String>,
    pub deezer_id: Option<i64>,
    pub spotify_covers: Vec<String>,
    pub deezer_cover: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Album {
    pub fn new(hash: String, name: String, artist: String) -> Self {
        let now = Utc::now();
        Self {
            hash,
            name,
            artists: vec![artist],
            release_date: None,
            spotify_id: None,
            deezer_id: None,
            spotify_covers: Vec::new(),
            deezer_cover: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Canonical track metadata merged across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub hash: String,
    pub name: String,
    pub artists: Vec<String>,
    pub album: Option<String>,
    pub spotify_id: Option<String>,
    pub deezer_id: Option<i64>,
    pub tags: Vec<String>,
    pub duration_ms: Option<i64>,
    pub preview_url: Option<String>,
    pub explicit: Option<bool>,
    pub preferred_resource: Option<String>,
    pub resources: Vec<ImageResource>,
    /// Spotify audio features, filled on request only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<TrackFeatures>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Track {
    pub fn new(hash: String, name: String, artist: String, album: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            hash,
            name,
            artists: vec![artist],
            album,
            spotify_id: None,
            deezer_id: None,
            tags: Vec::new(),
            duration_ms: None,
            preview_url: None,
            explicit: None,
            preferred_resource: None,
            resources: Vec::new(),
            features: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Spotify audio analysis features, keyed by spotify track id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackFeatures {
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
