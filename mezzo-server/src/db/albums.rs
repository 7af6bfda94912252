//! Album queries
//!
//! Albums carry their covers inline, so there is no resource join.

use super::{decode_list, encode_list, parse_timestamp};
use crate::models::Album;
use mezzo_common::Result;
use sqlx::SqlitePool;

type AlbumRow = (
    String,         // hash
    String,         // name
    String,         // artists
    Option<String>, // release_date
    Option<String>, // spotify_id
    Option<i64>,    // deezer_id
    String,         // spotify_covers
    Option<String>, // deezer_cover
    String,         // created_at
    String,         // updated_at
);

pub async fn get(pool: &SqlitePool, hash: &str) -> Result<Option<Album>> {
    let row: Option<AlbumRow> = sqlx::query_as(
        "SELECT hash, name, artists, release_date, spotify_id, deezer_id,
                spotify_covers, deezer_cover, created_at, updated_at
         FROM albums WHERE hash = ?",
    )
    .bind(hash)
    .fetch_optional(pool)
    .await?;

    let Some((
        hash,
        name,
        artists,
        release_date,
        spotify_id,
        deezer_id,
        spotify_covers,
        deezer_cover,
        created_at,
        updated_at,
    )) = row
    else {
        return Ok(None);
    };

    Ok(Some(Album {
        hash,
        name,
        artists: decode_list(&artists)?,
        release_date,
        spotify_id,
        deezer_id,
        spotify_covers: decode_list(&spotify_covers)?,
        deezer_cover,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    }))
}

pub async fn upsert(pool: &SqlitePool, album: &Album) -> Result<()> {
    sqlx::query(
        "INSERT INTO albums (hash, name, artists, release_date, spotify_id, deezer_id,
                             spotify_covers, deezer_cover, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(hash) DO UPDATE SET
            name = excluded.name,
            artists = excluded.artists,
            release_date = excluded.release_date,
            spotify_id = excluded.spotify_id,
            deezer_id = excluded.deezer_id,
            spotify_covers = excluded.spotify_covers,
            deezer_cover = excluded.deezer_cover,
            updated_at = excluded.updated_at",
    )
    .bind(&album.hash)
    .bind(&album.name)
    .bind(encode_list(&album.artists)?)
    .bind(&album.release_date)
    .bind(&album.spotify_id)
    .bind(album.deezer_id)
    .bind(encode_list(&album.spotify_covers)?)
    .bind(&album.deezer_cover)
    .bind(album.created_at.to_rfc3339())
    .bind(album.updated_at.to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
