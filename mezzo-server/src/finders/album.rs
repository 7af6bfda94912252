//! Album resolution

use crate::cache::EntityKind;
use crate::models::{Album, Provider};
use crate::monitoring::ResourceTier;
use crate::providers::{DeezerError, SpotifyError};
use crate::queue::Source;
use crate::AppState;
use mezzo_common::hashing::{hash_album, normalize};
use std::sync::Arc;
use tracing::warn;

/// Whether a stored album already satisfies every requested provider.
/// LastFM never contributes album fields, so it is always satisfied.
fn satisfies(album: &Album, providers: &[Provider]) -> bool {
    for provider in providers {
        match provider {
            Provider::Spotify => {
                if album.spotify_id.is_none() {
                    return false;
                }
            }
            Provider::Deezer => {
                if album.deezer_id.is_none() {
                    return false;
                }
            }
            Provider::LastFM => {}
        }
    }
    true
}

/// Resolve an album by name and artist.
pub async fn find_album(
    state: &AppState,
    name: &str,
    artist: &str,
    providers: &[Provider],
) -> mezzo_common::Result<Option<Album>> {
    let hashed = hash_album(name, artist);

    if let Some(album) = state
        .cache
        .get_entity::<Album>(EntityKind::Album, &hashed)
        .await?
    {
        if satisfies(&album, providers) {
            state
                .monitoring
                .record_resource("albums", ResourceTier::Cache);
            return Ok(Some(album));
        }
    }

    let stored = crate::db::albums::get(&state.db, &hashed).await?;
    if let Some(album) = &stored {
        if satisfies(album, providers) {
            state
                .cache
                .set_entity(EntityKind::Album, &hashed, album)
                .await?;
            state
                .monitoring
                .record_resource("albums", ResourceTier::Database);
            return Ok(Some(album.clone()));
        }
    }

    let mut album = stored
        .clone()
        .unwrap_or_else(|| Album::new(hashed.clone(), name.to_string(), artist.to_string()));
    let mut found_one = false;

    for provider in providers {
        match provider {
            Provider::Spotify if album.spotify_id.is_none() => {
                match fill_from_spotify(state, &mut album, artist).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        album = %album.name,
                        provider = "spotify",
                        error = %e,
                        "Problem while finding album"
                    ),
                }
            }
            Provider::Deezer if album.deezer_id.is_none() => {
                match fill_from_deezer(state, &mut album, artist).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        album = %album.name,
                        provider = "deezer",
                        error = %e,
                        "Problem while finding album"
                    ),
                }
            }
            _ => {}
        }
    }

    if !found_one {
        let tier = if stored.is_some() {
            ResourceTier::Database
        } else {
            ResourceTier::Miss
        };
        state.monitoring.record_resource("albums", tier);
        return Ok(stored);
    }

    album.updated_at = chrono::Utc::now();

    if let Err(e) = crate::db::albums::upsert(&state.db, &album).await {
        warn!(album = %album.hash, error = %e, "Could not upsert album");
    }
    state
        .cache
        .set_entity(EntityKind::Album, &hashed, &album)
        .await?;
    state
        .monitoring
        .record_resource("albums", ResourceTier::Upstream);

    Ok(Some(album))
}

async fn fill_from_spotify(
    state: &AppState,
    album: &mut Album,
    artist: &str,
) -> Result<(), SpotifyError> {
    if state
        .cache
        .is_not_found(&album.hash, Provider::Spotify.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(album = %album.name, "Skipping spotify, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.spotify);
    let name = album.name.clone();
    let artist_name = artist.to_string();
    let response = state
        .queue
        .submit(Source::Spotify, move || async move {
            client.search_album(&name, &artist_name).await
        })
        .await?;

    let items = response.albums.map(|page| page.items).unwrap_or_default();
    if items.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&album.hash, Provider::Spotify.as_str())
            .await;
        return Err(SpotifyError::NotFound(format!(
            "could not find album '{}' on spotify",
            album.name
        )));
    }

    let selected = items
        .iter()
        .find(|candidate| normalize(&candidate.name) == normalize(&album.name))
        .unwrap_or(&items[0]);

    album.name = selected.name.clone();
    album.spotify_id = Some(selected.id.clone());
    album.release_date = selected.release_date.clone();
    if !selected.artists.is_empty() {
        album.artists = selected.artists.iter().map(|a| a.name.clone()).collect();
    }
    album.spotify_covers = selected
        .images
        .iter()
        .map(|image| image.url.clone())
        .collect();

    Ok(())
}

async fn fill_from_deezer(
    state: &AppState,
    album: &mut Album,
    artist: &str,
) -> Result<(), DeezerError> {
    if state
        .cache
        .is_not_found(&album.hash, Provider::Deezer.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(album = %album.name, "Skipping deezer, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.deezer);
    let name = album.name.clone();
    let artist_name = artist.to_string();
    let search = state
        .queue
        .submit(Source::Deezer, move || async move {
            client.search_album(&name, &artist_name).await
        })
        .await?;

    if search.data.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&album.hash, Provider::Deezer.as_str())
            .await;
        return Err(DeezerError::NotFound(format!(
            "could not find album '{}' on deezer",
            album.name
        )));
    }

    let selected = search
        .data
        .iter()
        .find(|candidate| normalize(&candidate.title) == normalize(&album.name))
        .unwrap_or(&search.data[0]);

    album.deezer_id = Some(selected.id);
    if let Some(cover) = &selected.cover_big {
        album.deezer_cover = Some(cover.clone());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn satisfaction_checks_requested_ids() {
        let mut album = Album::new("h".to_string(), "Discovery".to_string(), "Daft Punk".to_string());
        assert!(!satisfies(&album, &[Provider::Spotify]));

        album.spotify_id = Some("spotify".to_string());
        assert!(satisfies(&album, &[Provider::Spotify]));
        assert!(!satisfies(&album, &[Provider::Spotify, Provider::Deezer]));

        album.deezer_id = Some(1);
        assert!(satisfies(&album, &[Provider::Spotify, Provider::Deezer]));
        // LastFM never gates albums.
        assert!(satisfies(&album, &[Provider::LastFM]));
    }
}
