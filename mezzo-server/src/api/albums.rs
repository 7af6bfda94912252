//! Album find endpoint

use crate::error::{ApiError, ApiResult};
use crate::finders::{self, find_album};
use crate::models::{Album, Provider};
use crate::AppState;
use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use futures::future::join_all;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AlbumRequestItem {
    pub name: String,
    pub artist: String,
}

#[derive(Debug, Deserialize)]
pub struct FindAlbumsRequest {
    pub albums: Vec<AlbumRequestItem>,
    #[serde(default)]
    pub sources: Option<Vec<Provider>>,
}

/// POST /find/albums
pub async fn find_albums(
    State(state): State<AppState>,
    Json(request): Json<FindAlbumsRequest>,
) -> ApiResult<Json<Vec<Option<Album>>>> {
    if request.albums.is_empty() {
        return Err(ApiError::MissingParams);
    }

    state
        .monitoring
        .record_finder("albums", request.albums.len() as u64);

    let providers = request
        .sources
        .unwrap_or_else(|| finders::DEFAULT_ALBUM_PROVIDERS.to_vec());

    let lookups = request.albums.iter().map(|item| {
        let state = state.clone();
        let providers = providers.clone();
        let name = item.name.clone();
        let artist = item.artist.clone();
        async move {
            match find_album(&state, &name, &artist, &providers).await {
                Ok(album) => album,
                Err(e) => {
                    tracing::error!(album = %name, error = %e, "Album lookup failed");
                    None
                }
            }
        }
    });

    let results = join_all(lookups).await;

    Ok(Json(results))
}

/// Build album routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/find/albums", post(find_albums))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_parses() {
        let request: FindAlbumsRequest = serde_json::from_str(
            r#"{"albums": [{"name": "Discovery", "artist": "Daft Punk"}]}"#,
        )
        .unwrap();
        assert_eq!(request.albums[0].artist, "Daft Punk");
        assert!(request.sources.is_none());
    }
}
