//! Artist queries

use super::{decode_list, encode_list, parse_timestamp, resources_for, upsert_resources, LinkTable};
use crate::models::Artist;
use mezzo_common::Result;
use sqlx::SqlitePool;

type ArtistRow = (
    String,         // hash
    String,         // name
    Option<String>, // spotify_id
    Option<i64>,    // deezer_id
    String,         // genres
    String,         // tags
    String,         // similar
    Option<String>, // preferred_resource
    String,         // created_at
    String,         // updated_at
);

/// Load an artist with its image resources.
pub async fn get(pool: &SqlitePool, hash: &str) -> Result<Option<Artist>> {
    let row: Option<ArtistRow> = sqlx::query_as(
        "SELECT hash, name, spotify_id, deezer_id, genres, tags, similar,
                preferred_resource, created_at, updated_at
         FROM artists WHERE hash = ?",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    let Some((
        hash,
        name,
        spotify_id,
        deezer_id,
        genres,
        tags,
        similar,
        preferred_resource,
        created_at,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    let resources = resources_for(pool, LinkTable::Artist, &hash).await?;

    Ok(Some(Artist {
        hash,
        name,
        spotify_id,
        deezer_id,
        genres: decode_list(&genres)?,
        tags: decode_list(&tags)?,
        similar: decode_list(&similar)?,
        preferred_resource,
        resources,
        popularity: None,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}

/// Insert or update an artist and its image resources.
pub async fn upsert(pool: &SqlitePool, artist: &Artist) -> Result<()> {
    sqlx::query(
        "INSERT INTO artists (hash, name, spotify_id, deezer_id, genres, tags, similar,
                              preferred_resource, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(hash) DO UPDATE SET
            name = excluded.name,
            spotify_id = excluded.spotify_id,
            deezer_id = excluded.deezer_id,
            genres = excluded.genres,
            tags = excluded.tags,
            similar = excluded.similar,
            preferred_resource = excluded.preferred_resource,
            updated_at = excluded.updated_at",
    )
    .bind(&artist.hash)
    .bind(&artist.name)
    .bind(&artist.spotify_id)
    .bind(artist.deezer_id)
    .bind(encode_list(&artist.genres)?)
    .bind(encode_list(&artist.tags)?)
    .bind(encode_list(&artist.similar)?)
    .bind(&artist.preferred_resource)
    .bind(artist.created_at.to_rfc3339())
    .bind(artist.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    upsert_resources(pool, LinkTable::Artist, &artist.hash, &artist.resources).await
}
