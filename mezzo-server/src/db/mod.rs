//! Durable store for resolved metadata
//!
//! SQLite via sqlx. Tables are created at pool init; list-valued
//! columns (genres, tags, similar, covers) are stored as JSON text,
//! timestamps as RFC 3339 text.

pub mod albums;
pub mod artists;
mod resources;
pub mod tracks;

pub(crate) use resources::{resources_for, set_resource_palette, upsert_resources, LinkTable};

use chrono::{DateTime, Utc};
use mezzo_common::{Error, Result};
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize the database connection pool, creating the file and the
/// schema when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // mode=rwc: read, write, create
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// Create all tables if they don't exist.
async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artists (
            hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            spotify_id TEXT,
            deezer_id INTEGER,
            genres TEXT NOT NULL DEFAULT '[]',
            tags TEXT NOT NULL DEFAULT '[]',
            similar TEXT NOT NULL DEFAULT '[]',
            preferred_resource TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS albums (
            hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            artists TEXT NOT NULL DEFAULT '[]',
            release_date TEXT,
            spotify_id TEXT,
            deezer_id INTEGER,
            spotify_covers TEXT NOT NULL DEFAULT '[]',
            deezer_cover TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracks (
            hash TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            artists TEXT NOT NULL DEFAULT '[]',
            album TEXT,
            spotify_id TEXT,
            deezer_id INTEGER,
            tags TEXT NOT NULL DEFAULT '[]',
            duration_ms INTEGER,
            preview_url TEXT,
            explicit INTEGER,
            preferred_resource TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_features (
            spotify_id TEXT PRIMARY KEY,
            danceability REAL NOT NULL,
            energy REAL NOT NULL,
            loudness REAL NOT NULL,
            speechiness REAL NOT NULL,
            acousticness REAL NOT NULL,
            instrumentalness REAL NOT NULL,
            liveness REAL NOT NULL,
            valence REAL NOT NULL,
            tempo REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS image_resources (
            hash TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            palette TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS images (
            hash TEXT PRIMARY KEY,
            resource_hash TEXT NOT NULL REFERENCES image_resources(hash),
            url TEXT NOT NULL,
            width INTEGER,
            height INTEGER
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS artist_image_resources (
            artist_hash TEXT NOT NULL,
            resource_hash TEXT NOT NULL,
            PRIMARY KEY (artist_hash, resource_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS track_image_resources (
            track_hash TEXT NOT NULL,
            resource_hash TEXT NOT NULL,
            PRIMARY KEY (track_hash, resource_hash)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Database tables initialized");

    Ok(())
}

pub(crate) fn encode_list(list: &[String]) -> Result<String> {
    Ok(serde_json::to_string(list)?)
}

pub(crate) fn decode_list(text: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(text)?)
}

pub(crate) fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in database: {}", e)))
}
