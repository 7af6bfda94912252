//! Artist resolution

use crate::cache::EntityKind;
use crate::models::{Artist, ImageData, ImageResource, Provider};
use crate::monitoring::ResourceTier;
use crate::providers::{LastfmError, SpotifyError};
use crate::queue::Source;
use crate::AppState;
use mezzo_common::hashing::{hash, hash_artist, normalize};
use std::sync::Arc;
use tracing::warn;

/// Whether a stored artist already satisfies every requested provider.
fn satisfies(artist: &Artist, providers: &[Provider]) -> bool {
    for provider in providers {
        match provider {
            Provider::Spotify => {
                if artist.spotify_id.is_none() {
                    return false;
                }
            }
            Provider::Deezer => {
                if artist.deezer_id.is_none() {
                    return false;
                }
            }
            Provider::LastFM => {
                let has_resource = artist
                    .resources
                    .iter()
                    .any(|r| r.source == Provider::LastFM);
                if !has_resource || artist.tags.is_empty() || artist.similar.is_empty() {
                    return false;
                }
            }
        }
    }
    true
}

/// Resolve an artist by name.
pub async fn find_artist(
    state: &AppState,
    name: &str,
    providers: &[Provider],
) -> mezzo_common::Result<Option<Artist>> {
    let hashed = hash_artist(name);

    if let Some(artist) = state
        .cache
        .get_entity::<Artist>(EntityKind::Artist, &hashed)
        .await?
    {
        if satisfies(&artist, providers) {
            state
                .monitoring
                .record_resource("artists", ResourceTier::Cache);
            return Ok(Some(artist));
        }
    }

    let stored = crate::db::artists::get(&state.db, &hashed).await?;
    if let Some(artist) = &stored {
        if satisfies(artist, providers) {
            state
                .cache
                .set_entity(EntityKind::Artist, &hashed, artist)
                .await?;
            state
                .monitoring
                .record_resource("artists", ResourceTier::Database);
            return Ok(Some(artist.clone()));
        }
    }

    let mut artist = stored
        .clone()
        .unwrap_or_else(|| Artist::new(hashed.clone(), name.to_string()));
    let mut found_one = false;

    for provider in providers {
        match provider {
            Provider::Spotify if artist.spotify_id.is_none() => {
                match fill_from_spotify(state, &mut artist).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        artist = %artist.name,
                        provider = "spotify",
                        error = %e,
                        "Problem while finding artist"
                    ),
                }
            }
            Provider::LastFM if artist.tags.is_empty() && artist.similar.is_empty() => {
                match fill_from_lastfm(state, &mut artist).await {
                    Ok(()) => found_one = true,
                    Err(e) => warn!(
                        artist = %artist.name,
                        provider = "lastfm",
                        error = %e,
                        "Problem while finding artist"
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
        state.monitoring.record_resource("artists", tier);
        return Ok(stored);
    }

    if artist.preferred_resource.is_none() {
        artist.preferred_resource = artist
            .resources
            .iter()
            .find(|r| r.source == Provider::Spotify)
            .or_else(|| artist.resources.first())
            .map(|r| r.hash.clone());
    }
    artist.updated_at = chrono::Utc::now();

    if let Err(e) = crate::db::artists::upsert(&state.db, &artist).await {
        warn!(artist = %artist.hash, error = %e, "Could not upsert artist");
    }
    state
        .cache
        .set_entity(EntityKind::Artist, &hashed, &artist)
        .await?;
    state
        .monitoring
        .record_resource("artists", ResourceTier::Upstream);

    Ok(Some(artist))
}

async fn fill_from_spotify(state: &AppState, artist: &mut Artist) -> Result<(), SpotifyError> {
    if state
        .cache
        .is_not_found(&artist.hash, Provider::Spotify.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(artist = %artist.name, "Skipping spotify, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.spotify);
    let name = artist.name.clone();
    let response = state
        .queue
        .submit(Source::Spotify, move || async move {
            client.search_artist(&name).await
        })
        .await?;

    let items = response.artists.map(|page| page.items).unwrap_or_default();
    if items.is_empty() {
        let _ = state
            .cache
            .mark_not_found(&artist.hash, Provider::Spotify.as_str())
            .await;
        return Err(SpotifyError::NotFound(format!(
            "could not find artist '{}' on spotify",
            artist.name
        )));
    }

    let selected = items
        .iter()
        .find(|candidate| normalize(&candidate.name) == normalize(&artist.name))
        .unwrap_or(&items[0]);

    artist.name = selected.name.clone();
    artist.spotify_id = Some(selected.id.clone());
    artist.genres.extend(selected.genres.iter().cloned());

    if !selected.images.is_empty() {
        let resource_hash = hash(
            &selected
                .images
                .iter()
                .map(|image| image.url.as_str())
                .collect::<Vec<_>>()
                .join(""),
        );
        artist.resources.push(ImageResource {
            hash: resource_hash,
            source: Provider::Spotify,
            images: selected
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

    if let Some(popularity) = selected.popularity {
        let _ = state.cache.set_popularity(&selected.id, popularity).await;
    }

    Ok(())
}

async fn fill_from_lastfm(state: &AppState, artist: &mut Artist) -> Result<(), LastfmError> {
    if state
        .cache
        .is_not_found(&artist.hash, Provider::LastFM.as_str())
        .await
        .unwrap_or(false)
    {
        warn!(artist = %artist.name, "Skipping lastfm, resource was not found previously");
        return Ok(());
    }

    let client = Arc::clone(&state.lastfm);
    let name = artist.name.clone();
    let result = state
        .queue
        .submit(Source::LastFM, move || async move {
            client.artist_get_info(&name).await
        })
        .await;

    let info = match result {
        Ok(info) => info,
        Err(e @ LastfmError::NotFound(_)) => {
            let _ = state
                .cache
                .mark_not_found(&artist.hash, Provider::LastFM.as_str())
                .await;
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    artist.tags.extend(info.tags);
    artist.similar.extend(info.similar);

    if artist.tags.is_empty() && artist.similar.is_empty() {
        // Nothing useful came back; remember that so the next lookup
        // does not hit lastfm again before the marker expires.
        let _ = state
            .cache
            .mark_not_found(&artist.hash, Provider::LastFM.as_str())
            .await;
    }

    if let Some(url) = info.image_url {
        let resource_hash = hash(&url);
        artist.resources.push(ImageResource {
            hash: resource_hash.clone(),
            source: Provider::LastFM,
            images: vec![ImageData {
                hash: hash(&url),
                url,
                width: None,
                height: None,
            }],
            palette: None,
        });
        artist.preferred_resource = Some(resource_hash);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn artist_with(
        spotify_id: Option<&str>,
        tags: &[&str],
        similar: &[&str],
        lastfm_resource: bool,
    ) -> Artist {
        let mut artist = Artist::new("h".to_string(), "Test".to_string());
        artist.spotify_id = spotify_id.map(|s| s.to_string());
        artist.tags = tags.iter().map(|s| s.to_string()).collect();
        artist.similar = similar.iter().map(|s| s.to_string()).collect();
        if lastfm_resource {
            artist.resources.push(ImageResource {
                hash: "r".to_string(),
                source: Provider::LastFM,
                images: Vec::new(),
                palette: None,
            });
        }
        artist
    }

    #[test]
    fn spotify_satisfied_by_id() {
        let artist = artist_with(Some("id"), &[], &[], false);
        assert!(satisfies(&artist, &[Provider::Spotify]));
        assert!(!satisfies(&artist, &[Provider::LastFM]));
    }

    #[test]
    fn lastfm_needs_resource_tags_and_similar() {
        let complete = artist_with(None, &["electronic"], &["Justice"], true);
        assert!(satisfies(&complete, &[Provider::LastFM]));

        let no_image = artist_with(None, &["electronic"], &["Justice"], false);
        assert!(!satisfies(&no_image, &[Provider::LastFM]));

        let no_similar = artist_with(None, &["electronic"], &[], true);
        assert!(!satisfies(&no_similar, &[Provider::LastFM]));
    }

    #[test]
    fn combined_providers_require_all() {
        let artist = artist_with(Some("id"), &["tag"], &["other"], true);
        assert!(satisfies(&artist, &[Provider::Spotify, Provider::LastFM]));

        let spotify_only = artist_with(Some("id"), &[], &[], false);
        assert!(!satisfies(&spotify_only, &[Provider::Spotify, Provider::LastFM]));
    }
}
