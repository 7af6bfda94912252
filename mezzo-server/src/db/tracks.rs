//! Track and audio-feature queries

use super::{decode_list, encode_list, parse_timestamp, resources_for, upsert_resources, LinkTable};
use crate::models::{Track, TrackFeatures};
use mezzo_common::Result;
use sqlx::SqlitePool;

type TrackRow = (
    String,         // hash
    String,         // name
    String,         // artists
    Option<String>, // album
    Option<String>, // spotify_id
    Option<i64>,    // deezer_id
    String,         // tags
    Option<i64>,    // duration_ms
    Option<String>, // preview_url
    Option<bool>,   // explicit
    Option<String>, // preferred_resource
    String,         // created_at
    String,         // updated_at
);

/// Load a track with its image resources. Features are filled in
/// separately, on request only.
pub async fn get(pool: &SqlitePool, hash: &str) -> Result<Option<Track>> {
    let row: Option<TrackRow> = sqlx::query_as(
        "SELECT hash, name, artists, album, spotify_id, deezer_id, tags, duration_ms,
                preview_url, explicit, preferred_resource, created_at, updated_at
         FROM tracks WHERE hash = ?",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    let Some((
        hash,
        name,
        artists,
        album,
        spotify_id,
        deezer_id,
        tags,
        duration_ms,
        preview_url,
        explicit,
        preferred_resource,
        created_at,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    let resources = resources_for(pool, LinkTable::Track, &hash).await?;

    Ok(Some(Track {
        hash,
        name,
        artists: decode_list(&artists)?,
        album,
        spotify_id,
        deezer_id,
        tags: decode_list(&tags)?,
        duration_ms,
        preview_url,
        explicit,
        preferred_resource,
        resources,
        features: None,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}

/// Insert or update a track and its image resources.
pub async fn upsert(pool: &SqlitePool, track: &Track) -> Result<()> {
    sqlx::query(
        "INSERT INTO tracks (hash, name, artists, album, spotify_id, deezer_id, tags,
                             duration_ms, preview_url, explicit, preferred_resource,
                             created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(hash) DO UPDATE SET
            name = excluded.name,
            artists = excluded.artists,
            album = excluded.album,
            spotify_id = excluded.spotify_id,
            deezer_id = excluded.deezer_id,
            tags = excluded.tags,
            duration_ms = excluded.duration_ms,
            preview_url = excluded.preview_url,
            explicit = excluded.explicit,
            preferred_resource = excluded.preferred_resource,
            updated_at = excluded.updated_at",
    )
    .bind(&track.hash)
    .bind(&track.name)
    .bind(encode_list(&track.artists)?)
    .bind(&track.album)
    .bind(&track.spotify_id)
    .bind(track.deezer_id)
    .bind(encode_list(&track.tags)?)
    .bind(track.duration_ms)
    .bind(&track.preview_url)
    .bind(track.explicit)
    .bind(&track.preferred_resource)
    .bind(track.created_at.to_rfc3339())
    .bind(track.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    upsert_resources(pool, LinkTable::Track, &track.hash, &track.resources).await
}

type FeaturesRow = (f64, f64, f64, f64, f64, f64, f64, f64, f64);

/// Load stored audio features for a spotify track id.
pub async fn get_features(pool: &SqlitePool, spotify_id: &str) -> Result<Option<TrackFeatures>> {
    let row: Option<FeaturesRow> = sqlx::query_as(
        "SELECT danceability, energy, loudness, speechiness, acousticness,
                instrumentalness, liveness, valence, tempo
         FROM track_features WHERE spotify_id = ?",
    )
    .bind(spotify_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(
        |(
            danceability,
            energy,
            loudness,
            speechiness,
            acousticness,
            instrumentalness,
            liveness,
            valence,
            tempo,
        )| TrackFeatures {
            danceability,
            energy,
            loudness,
            speechiness,
            acousticness,
            instrumentalness,
            liveness,
            valence,
            tempo,
        },
    ))
}

/// Store audio features for a spotify track id. Features never change
/// for a given id, so conflicts are ignored.
pub async fn upsert_features(
    pool: &SqlitePool,
    spotify_id: &str,
    features: &TrackFeatures,
) -> Result<()> {
    sqlx::query(
        "INSERT OR IGNORE INTO track_features
            (spotify_id, danceability, energy, loudness, speechiness, acousticness,
             instrumentalness, liveness, valence, tempo)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(spotify_id)
    .bind(features.danceability)
    .bind(features.energy)
    .bind(features.loudness)
    .bind(features.speechiness)
    .bind(features.acousticness)
    .bind(features.instrumentalness)
    .bind(features.liveness)
    .bind(features.valence)
    .bind(features.tempo)
    .execute(pool)
    .await?;

    Ok(())
}
