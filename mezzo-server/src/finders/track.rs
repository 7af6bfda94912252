//! Track resolution
//!
//! Tracks merge from up to three providers. The optional `preview`
//! requirement gets a second pass: when no provider in the normal
//! sweep produced a preview URL, spotify and deezer are retried in
//! that order until one does.

use crate::cache::EntityKind;
use crate::models::{ImageData, ImageResource, Provider, Track};
use crate::monitoring::ResourceTier;
use crate::providers::{DeezerError, LastfmError, SpotifyError};
use crate::queue::Source;
use crate::AppState;
use mezzo_common::hashing::{hash, hash_track, normalize};
use std::sync::Arc;
use tracing::warn;

/// Whether a stored track already satisfies every requested provider
/// and the preview requirement.
fn satisfies(track: &Track, providers: &[Provider], preview: bool) -> bool {
    for provider in providers {
        match provider {
            Provider::Spotify => {
                if track.spotify_id.is_none() {
                    return false;
                }
            }
            Provider::Deezer => {
                if track.deezer_id.is_none() {
                    return false;
                }
            }
            Provider::LastFM => {
                if track.tags.is_empty() {
                    return false;
                }
            }
        }
    }
    if preview && track.preview_url.is_none() {
        return false;
    }
    true
}

/// Resolve a track by name, artist and optional album.
pub async fn find_track(
    state: &AppState,
    name: &str,
    artist: &str,
    album: Option<&str>,
    providers: &[Provider],
    preview: bool,
) -> mezzo_common::Result<Option<Track>> {
    let hashed = hash_track(name, artist, album.unwrap_or(""));

    if let Some(track) = state
        .cache
        .get_entity::<Track>(EntityKind::Track, &hashed)
        .await?
    {
        if satisfies(&track, providers, preview) {
            state
                .monitoring
                .record_resource("tracks", ResourceTier::Cache);
            return Ok(Some(track));
        }
    }

    let stored = crate::db::tracks::get(&state.db, &hashed).await?;
    if let Some(track) = &stored {
        if satisfies(track, providers, preview) {
            state
                .cache
                .set_entity(EntityKind::Track, &hashed, track)
                .await?;
            state
                .monitoring
                .record_resource("tracks", ResourceTier::Database);
            return Ok(Some(track.clone()));
        }
    }

    let mut track = stored.clone().unwrap_or_else(|| {
        Track::new(
            hashed.clone(),
            name.to_string(),
            artist.to_string(),
            album.map(|a| a.to_string()),
        )
    });
    let mut found_one = false;

    for provider in providers {
        match provider {
            Provider::Spotify if track.spotify_id.is_none() => {
                match fill_from_spotify(state, &mut track).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        track = %track.name,
                        provider = "spotify",
                        error = %e,
                        "Problem while finding track"
                    ),
                }
            }
            Provider::Deezer if track.deezer_id.is_none() => {
                match fill_from_deezer(state, &mut track).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        track = %track.name,
                        provider = "deezer",
                        error = %e,
                        "Problem while finding track"
                    ),
                }
            }
            Provider::LastFM if track.tags.is_empty() => {
                match fill_from_lastfm(state, &mut track).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        track = %track.name,
                        provider = "lastfm",
                        error = %e,
                        "Problem while finding track"
                    ),
                }
            }
            _ => {}
        }
    }

    if preview && track.preview_url.is_none() {
        if track.spotify_id.is_none() {
            if let Err(e) = fill_from_spotify(state, &mut track).await {
                warn!(track = %track.name, error = %e, "Preview pass: spotify failed");
            }
        }
        if track.preview_url.is_none() {
            if let Err(e) = fill_from_deezer(state, &mut track).await {
                warn!(track = %track.name, error = %e, "Preview pass: deezer failed");
            }
        }
        if track.preview_url.is_some() {
            found_one = true;
        }
    }

    if !found_one {
        let tier = if stored.is_some() {
            ResourceTier::Database
        } else {
            ResourceTier::Miss
        };
        state.monitoring.record_resource("tracks", tier);
        return Ok(stored);
    }

    if track.preferred_resource.is_none() {
        track.preferred_resource = track
            .resources
            .iter()
            .find(|r| r.source == Provider::Spotify)
            .or_else(|| track.resources.first())
            .map(|r| r.hash.clone());
    }
    track.updated_at = chrono::Utc::now();

    if let Err(e) = crate::db::tracks::upsert(&state.db, &track).await {
        warn!(track = %track.hash, error = %e, "Could not upsert track");
    }
    state
        .cache
        .set_entity(EntityKind::Track, &hashed, &track)
        .await?;
    state
        .monitoring
        .record_resource("tracks", ResourceTier::Upstream);

    Ok(Some(track))
}

async fn fill_from_spotify(state: &AppState, track: &mut Track) -> Result<(), SpotifyError> {
    if state
        .cache
        .is_not_found(&track.hash, Provider::Spotify.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(track = %track.name, "Skipping spotify, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.spotify);
    let name = track.name.clone();
    let artist = track.artists.first().cloned().unwrap_or_default();
    let album = track.album.clone();
    let response = state
        .queue
        .submit(Source::Spotify, move || async move {
            client.search_track(&name, &artist, album.as_deref()).await
        })
        .await?;

    let items = response.tracks.map(|page| page.items).unwrap_or_default();
    if items.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&track.hash, Provider::Spotify.as_str())
            .await;
        return Err(SpotifyError::NotFound(format!(
            "could not find track '{}' on spotify",
            track.name
        )));
    }

    let selected = items
        .iter()
        .find(|candidate| normalize(&candidate.name) == normalize(&track.name))
        .unwrap_or(&items[0]);

    track.name = selected.name.clone();
    track.spotify_id = Some(selected.id.clone());
    if !selected.artists.is_empty() {
        track.artists = selected.artists.iter().map(|a| a.name.clone()).collect();
    }
    if let Some(duration) = selected.duration_ms {
        track.duration_ms = Some(duration);
    }
    if let Some(preview) = &selected.preview_url {
        track.preview_url = Some(preview.clone());
    }
    if selected.explicit.is_some() {
        track.explicit = selected.explicit;
    }

    if let Some(album) = &selected.album {
        track.album = Some(album.name.clone());

        if !album.images.is_empty() {
            let resource_hash = hash(
                &album
                    .images
                    .iter()
                    .map(|image| image.url.as_str())
                    .collect::<Vec<_>>()
                    .join(""),
            );
            track.resources.push(ImageResource {
                hash: resource_hash,
                source: Provider::Spotify,
                images: album
                    .images
                    .iter()
                    .map(|image| ImageData {
                        hash: hash(&image.url),
                        url: image.url.clone(),
                        width: image.width,
                        height: image.height,
                    })
                    .collect(),
                palette: None,
            });
        }
    }

    Ok(())
}

async fn fill_from_deezer(state: &AppState, track: &mut Track) -> Result<(), DeezerError> {
    if state
        .cache
        .is_not_found(&track.hash, Provider::Deezer.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(track = %track.name, "Skipping deezer, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.deezer);
    let name = track.name.clone();
    let artist = track.artists.first().cloned().unwrap_or_default();
    let album = track.album.clone();
    let search = state
        .queue
        .submit(Source::Deezer, move || async move {
            client.search_track(&name, &artist, album.as_deref()).await
        })
        .await?;

    if search.data.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&track.hash, Provider::Deezer.as_str())
            .await;
        return Err(DeezerError::NotFound(format!(
            "could not find track '{}' on deezer",
            track.name
        )));
    }

    let selected = search
        .data
        .iter()
        .find(|candidate| normalize(&candidate.title) == normalize(&track.name))
        .unwrap_or(&search.data[0]);

    track.deezer_id = Some(selected.id);
    if let Some(preview) = &selected.preview {
        track.preview_url = Some(preview.clone());
    }
    track.explicit = match track.explicit {
        Some(true) => Some(true),
        _ => selected.explicit_lyrics,
    };
    if track.duration_ms.is_none() {
        track.duration_ms = selected.duration.map(|seconds| seconds * 1000);
    }

    if let Some(album) = &selected.album {
        if track.album.is_none() {
            track.album = Some(album.title.clone());
        }
        if let Some(cover) = &album.cover_big {
            track.resources.push(ImageResource {
                hash: hash(cover),
                source: Provider::Deezer,
                images: vec![ImageData {
                    hash: hash(cover),
                    url: cover.clone(),
                    width: Some(500),
                    height: Some(500),
                }],
                palette: None,
            });
        }
    }

    Ok(())
}

async fn fill_from_lastfm(state: &AppState, track: &mut Track) -> Result<(), LastfmError> {
    if state
        .cache
        .is_not_found(&track.hash, Provider::LastFM.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(track = %track.name, "Skipping lastfm, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.lastfm);
    let name = track.name.clone();
    let artist = track.artists.first().cloned().unwrap_or_default();
    let result = state
        .queue
        .submit(Source::LastFM, move || async move {
            client.track_get_info(&name, &artist).await
        })
        .await;

    let info = match result {
        Ok(info) => info,
        Err(e @ LastfmError::NotFound(_)) => {
            let _ = state
                .cache
                .mark_not_found(&track.hash, Provider::LastFM.as_str())
                .await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    track.name = info.name;
    if let Some(artist) = info.artist {
        if track.artists.is_empty() {
            track.artists.push(artist);
        } else {
            track.artists[0] = artist;
        }
    }
    if info.tags.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&track.hash, Provider::LastFM.as_str())
            .await;
    }
    track.tags.extend(info.tags);

    if let Some(url) = info.album_image_url {
        track.resources.push(ImageResource {
            hash: hash(&url),
            source: Provider::LastFM,
            images: vec![ImageData {
                hash: hash(&url),
                url,
                width: None,
                height: None,
            }],
            palette: None,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with(
        spotify_id: Option<&str>,
        deezer_id: Option<i64>,
        tags: &[&str],
        preview: Option<&str>,
    ) -> Track {
        let mut track = Track::new(
            "h".to_string(),
            "Test".to_string(),
            "Artist".to_string(),
            None,
        );
        track.spotify_id = spotify_id.map(|s| s.to_string());
        track.deezer_id = deezer_id;
        track.tags = tags.iter().map(|s| s.to_string()).collect();
        track.preview_url = preview.map(|s| s.to_string());
        track
    }

    #[test]
    fn provider_ids_gate_satisfaction() {
        let track = track_with(Some("id"), None, &[], None);
        assert!(satisfies(&track, &[Provider::Spotify], false));
        assert!(!satisfies(&track, &[Provider::Deezer], false));
        assert!(!satisfies(&track, &[Provider::LastFM], false));
    }

    #[test]
    fn preview_requirement_gates_independently() {
        let without = track_with(Some("id"), Some(1), &["tag"], None);
        assert!(satisfies(
            &without,
            &[Provider::Spotify, Provider::Deezer],
            false
        ));
        assert!(!satisfies(
            &without,
            &[Provider::Spotify, Provider::Deezer],
            true
        ));

        let with = track_with(Some("id"), Some(1), &["tag"], Some("https://cdn/p.mp3"));
        assert!(satisfies(&with, &[Provider::Spotify, Provider::Deezer], true));
    }
}
