//! Image resource storage shared by artists and tracks
//!
//! Resources and images are immutable once written (INSERT OR IGNORE);
//! only the lazily-extracted palette is updated in place.

use crate::models::{ImageData, ImageResource, Palette};
use mezzo_common::{Error, Result};
use sqlx::SqlitePool;
use std::str::FromStr;

/// Which owner table a resource link belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LinkTable {
    Artist,
    Track,
}

impl LinkTable {
    fn table(&self) -> &'static str {
        match self {
            LinkTable::Artist => "artist_image_resources",
            LinkTable::Track => "track_image_resources",
        }
    }

    fn owner_column(&self) -> &'static str {
        match self {
            LinkTable::Artist => "artist_hash",
            LinkTable::Track => "track_hash",
        }
    }
}

/// Load all image resources linked to an owner, images included.
pub(crate) async fn resources_for(
    pool: &SqlitePool,
    link: LinkTable,
    owner_hash: &str,
) -> Result<Vec<ImageResource>> {
    let sql = format!(
        "SELECT r.hash, r.source, r.palette
         FROM image_resources r
         JOIN {} l ON l.resource_hash = r.hash
         WHERE l.{} = ?",
        link.table(),
        link.owner_column()
    );

    let rows: Vec<(String, String, Option<String>)> = sqlx::query_as(&sql)
        .bind(owner_hash)
        .fetch_all(pool)
        .await?;

    let mut resources = Vec::with_capacity(rows.len());
    for (hash, source, palette) in rows {
        let source = FromStr::from_str(&source)
            .map_err(|e: String| Error::Internal(format!("Invalid resource source: {}", e)))?;
        let palette: Option<Palette> = match palette {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        };

        let images: Vec<(String, String, Option<u32>, Option<u32>)> = sqlx::query_as(
            "SELECT hash, url, width, height FROM images WHERE resource_hash = ?",
        )
        .bind(&hash)
        .fetch_all(pool)
        .await?;

        resources.push(ImageResource {
            hash,
            source,
            images: images
                .into_iter()
                .map(|(hash, url, width, height)| ImageData {
                    hash,
                    url,
                    width,
                    height,
                })
                .collect(),
            palette,
        });
    }

    Ok(resources)
}

/// Store resources, their images and their owner links. Existing rows
/// are left untouched.
pub(crate) async fn upsert_resources(
    pool: &SqlitePool,
    link: LinkTable,
    owner_hash: &str,
    resources: &[ImageResource],
) -> Result<()> {
    for resource in resources {
        sqlx::query("INSERT OR IGNORE INTO image_resources (hash, source, palette) VALUES (?, ?, ?)")
            .bind(&resource.hash)
            .bind(resource.source.as_str())
            .bind(match &resource.palette {
                Some(palette) => Some(serde_json::to_string(palette)?),
                None => None,
            })
            .execute(pool)
            .await?;

        for image in &resource.images {
            sqlx::query(
                "INSERT OR IGNORE INTO images (hash, resource_hash, url, width, height)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&image.hash)
            .bind(&resource.hash)
            .bind(&image.url)
            .bind(image.width)
            .bind(image.height)
            .execute(pool)
            .await?;
        }

        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}, resource_hash) VALUES (?, ?)",
            link.table(),
            link.owner_column()
        );
        sqlx::query(&sql)
            .bind(owner_hash)
            .bind(&resource.hash)
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Persist an extracted palette on its resource row.
pub(crate) async fn set_resource_palette(
    pool: &SqlitePool,
    resource_hash: &str,
    palette: &Palette,
) -> Result<()> {
    sqlx::query("UPDATE image_resources SET palette = ? WHERE hash = ?")
        .bind(serde_json::to_string(palette)?)
        .bind(resource_hash)
        .execute(pool)
        .await?;

    Ok(())
}
