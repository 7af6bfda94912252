//! Artist find endpoint

use crate::cache::EntityKind;
use crate::error::{ApiError, ApiResult};
use crate::finders::{self, find_artist};
use crate::models::{Artist, Provider};
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
pub struct FindArtistsRequest {
    pub artists: Vec<String>,
    #[serde(default)]
    pub sources: Option<Vec<Provider>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArtistQueryParams {
    #[serde(default)]
    pub popularity: bool,
    #[serde(default)]
    pub palette: bool,
}

/// POST /find/artists
///
/// Resolves each requested artist independently; an artist that fails
/// to resolve becomes null in the response instead of failing the
/// batch.
pub async fn find_artists(
    State(state): State<AppState>,
    Query(params): Query<ArtistQueryParams>,
    Json(request): Json<FindArtistsRequest>,
) -> ApiResult<Json<Vec<Option<Artist>>>> {
    if request.artists.is_empty() {
        return Err(ApiError::MissingParams);
    }

    state
        .monitoring
        .record_finder("artists", request.artists.len() as u64);

    let providers = request
        .sources
        .unwrap_or_else(|| finders::DEFAULT_ARTIST_PROVIDERS.to_vec());

    let lookups = request.artists.iter().map(|name| {
        let state = state.clone();
        let providers = providers.clone();
        let name = name.clone();
        async move {
            match find_artist(&state, &name, &providers).await {
                Ok(artist) => artist,
                Err(e) => {
                    tracing::error!(artist = %name, error = %e, "Artist lookup failed");
                    None
                }
            }
        }
    });

    let mut results: Vec<Option<Artist>> = join_all(lookups).await;

    if params.palette {
        for artist in results.iter_mut().flatten() {
            match resolve_resource_palettes(&state, &mut artist.resources).await {
                Ok(true) => {
                    if let Err(e) = state
                        .cache
                        .set_entity(EntityKind::Artist, &artist.hash, artist)
                        .await
                    {
                        tracing::warn!(artist = %artist.hash, error = %e, "Cache refresh failed");
                    }
                }
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(artist = %artist.hash, error = %e, "Palette resolution failed")
                }
            }
        }
    }

    if params.popularity {
        results = fill_popularity(&state, results).await;
    }

    Ok(Json(results))
}

/// Fill spotify popularity from the fast cache, batching the ids the
/// cache doesn't know through one queue-admitted lookup per 50.
async fn fill_popularity(
    state: &AppState,
    mut artists: Vec<Option<Artist>>,
) -> Vec<Option<Artist>> {
    let mut missing: Vec<String> = Vec::new();

    for artist in artists.iter_mut().flatten() {
        if let Some(id) = &artist.spotify_id {
            match state.cache.get_popularity(id).await {
                Ok(Some(popularity)) => artist.popularity = Some(popularity),
                _ => missing.push(id.clone()),
            }
        }
    }

    if missing.is_empty() {
        return artists;
    }

    let mut fetched: HashMap<String, u32> = HashMap::new();
    // Spotify caps the batched artists endpoint at 50 ids.
    for chunk in missing.chunks(50) {
        let client = Arc::clone(&state.spotify);
        let ids = chunk.to_vec();
        let result: Result<_, SpotifyError> = state
            .queue
            .submit(Source::Spotify, move || async move {
                client.get_artists(&ids).await
            })
            .await;

        match result {
            Ok(response) => {
                for artist in response.artists {
                    if let Some(popularity) = artist.popularity {
                        let _ = state.cache.set_popularity(&artist.id, popularity).await;
                        fetched.insert(artist.id, popularity);
                    }
                }
            }
            Err(e) => tracing::warn!(error = %e, "Popularity lookup failed"),
        }
    }

    for artist in artists.iter_mut().flatten() {
        if artist.popularity.is_none() {
            if let Some(id) = &artist.spotify_id {
                artist.popularity = fetched.get(id).copied();
            }
        }
    }

    artists
}

/// Build artist routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/find/artists", post(find_artists))
}
