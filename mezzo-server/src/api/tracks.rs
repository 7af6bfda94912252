//! Track find endpoint

use crate::cache::EntityKind;
use crate::error::{ApiError, ApiResult};
use crate::finders::{self, find_track};
use crate::models::{Provider, Track, TrackFeatures};
use crate::palette::resolve_resource_palettes;
use crate::providers::SpotifyError;
use crate::queue::Source;
use crate::AppState;
use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use futures::future::join_all;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct TrackRequestItem {
    pub name: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindTracksRequest {
    pub tracks: Vec<TrackRequestItem>,
    #[serde(default)]
    pub sources: Option<Vec<Provider>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TrackQueryParams {
    /// Require a playable preview URL on every result.
    #[serde(default)]
    pub preview: bool,
    /// Attach spotify audio features to every result that has them.
    #[serde(default)]
    pub analysis: bool,
    #[serde(default)]
    pub palette: bool,
}

/// POST /find/tracks
pub async fn find_tracks(
    State(state): State<AppState>,
    Query(params): Query<TrackQueryParams>,
    Json(request): Json<FindTracksRequest>,
) -> ApiResult<Json<Vec<Option<Track>>>> {
    if request.tracks.is_empty() {
        return Err(ApiError::MissingParams);
    }

    state
        .monitoring
        .record_finder("tracks", request.tracks.len() as u64);

    let providers = request
        .sources
        .unwrap_or_else(|| finders::DEFAULT_TRACK_PROVIDERS.to_vec());

    let lookups = request.tracks.iter().map(|item| {
        let state = state.clone();
        let providers = providers.clone();
        let name = item.name.clone();
        let artist = item.artist.clone();
        let album = item.album.clone();
        let preview = params.preview;
        async move {
            match find_track(&state, &name, &artist, album.as_deref(), &providers, preview).await
            {
                Ok(track) => track,
                Err(e) => {
                    tracing::error!(track = %name, error = %e, "Track lookup failed");
                    None
                }
            }
        }
    });

    let mut results: Vec<Option<Track>> = join_all(lookups).await;

    if params.palette {
        for track in results.iter_mut().flatten() {
            match resolve_resource_palettes(&state, &mut track.resources).await {
                Ok(true) => {
                    if let Err(e) = state
                        .cache
                        .set_entity(EntityKind::Track, &track.hash, track)
                        .await
                    {
                        tracing::warn!(track = %track.hash, error = %e, "Cache refresh failed");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(track = %track.hash, error = %e, "Palette resolution failed")
                }
            }
        }
    }

    if params.analysis {
        results = fill_features(&state, results).await;
    }

    Ok(Json(results))
}

/// Attach audio features: fast cache first, then the durable store,
/// then one batched spotify lookup per 50 unknown ids.
async fn fill_features(state: &AppState, mut tracks: Vec<Option<Track>>) -> Vec<Option<Track>> {
    let mut missing: Vec<String> = Vec::new();

    for track in tracks.iter_mut().flatten() {
        let Some(id) = track.spotify_id.clone() else {
            continue;
        };

        if let Ok(Some(features)) = state.cache.get_features(&id).await {
            track.features = Some(features);
            continue;
        }

        match crate::db::tracks::get_features(&state.db, &id).await {
            Ok(Some(features)) => {
                let _ = state.cache.set_features(&id, &features).await;
                track.features = Some(features);
            }
            Ok(None) => missing.push(id),
            Err(e) => {
                tracing::warn!(spotify_id = %id, error = %e, "Feature lookup failed");
                missing.push(id);
            }
        }
    }

    if missing.is_empty() {
        return tracks;
    }

    let mut fetched: HashMap<String, TrackFeatures> = HashMap::new();
    // Spotify caps the audio-features endpoint at 50 ids.
    for chunk in missing.chunks(50) {
        let client = Arc::clone(&state.spotify);
        let ids = chunk.to_vec();
        let result: Result<_, SpotifyError> = state
            .queue
            .submit(Source::Spotify, move || async move {
                client.get_audio_features(&ids).await
            })
            .await;

        match result {
            Ok(response) => {
                for features in response.audio_features.into_iter().flatten() {
                    let converted = TrackFeatures {
                        danceability: features.danceability,
                        energy: features.energy,
                        loudness: features.loudness,
                        speechiness: features.speechiness,
                        acousticness: features.acousticness,
                        instrumentalness: features.instrumentalness,
                        liveness: features.liveness,
                        valence: features.valence,
                        tempo: features.tempo,
                    };
                    let _ = state.cache.set_features(&features.id, &converted).await;
                    if let Err(e) =
                        crate::db::tracks::upsert_features(&state.db, &features.id, &converted)
                            .await
                    {
                        tracing::warn!(spotify_id = %features.id, error = %e, "Feature store failed");
                    }
                    fetched.insert(features.id, converted);
                }
            }
            Err(e) => tracing::warn!(error = %e, "Audio features lookup failed"),
        }
    }

    for track in tracks.iter_mut().flatten() {
        if track.features.is_none() {
            if let Some(id) = &track.spotify_id {
                track.features = fetched.get(id).cloned();
            }
        }
    }

    tracks
}

/// Build track routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/find/tracks", post(find_tracks))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses_with_optional_album() {
        let request: FindTracksRequest = serde_json::from_str(
            r#"{"tracks": [
                {"name": "One More Time", "artist": "Daft Punk", "album": "Discovery"},
                {"name": "D.A.N.C.E.", "artist": "Justice"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(request.tracks.len(), 2);
        assert_eq!(request.tracks[0].album.as_deref(), Some("Discovery"));
        assert!(request.tracks[1].album.is_none());
    }

    #[test]
    fn query_params_default_to_off() {
        let params: TrackQueryParams = serde_json::from_str("{}").unwrap();
        assert!(!params.preview);
        assert!(!params.analysis);
        assert!(!params.palette);
    }
}
