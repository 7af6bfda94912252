//! Cover-art palette extraction
//!
//! Produces six representative colors from an image: pixels are split
//! into vibrant/muted by saturation and dark/normal/light by
//! lightness, and each bucket averages to one color. Extraction runs
//! under the queue's `palette` source so this CPU-bound work is
//! throttled independently of network calls.

use crate::models::{ImageData, ImageResource, Palette};
use crate::queue::{QueueError, Source};
use crate::AppState;
use thiserror::Error;

/// Images are shrunk to this edge before bucketing; palette quality
/// does not improve past it.
const SAMPLE_EDGE: u32 = 64;

const SATURATION_SPLIT: f32 = 0.35;
const DARK_SPLIT: f32 = 0.35;
const LIGHT_SPLIT: f32 = 0.65;

/// Palette extraction errors
#[derive(Debug, Error)]
pub enum PaletteError {
    #[error("Image fetch failed: {0}")]
    Fetch(String),

    #[error("Image decode failed: {0}")]
    Decode(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),
}

/// Fetch an image and extract its palette.
pub async fn extract_palette(
    http: &reqwest::Client,
    url: &str,
) -> Result<Palette, PaletteError> {
    let response = http
        .get(url)
        .send()
        .await
        .map_err(|e| PaletteError::Fetch(e.to_string()))?
        .error_for_status()
        .map_err(|e| PaletteError::Fetch(e.to_string()))?;

    let bytes = response
        .bytes()
        .await
        .map_err(|e| PaletteError::Fetch(e.to_string()))?;

    let decoded = image::load_from_memory(&bytes)
        .map_err(|e| PaletteError::Decode(e.to_string()))?;

    Ok(palette_from_image(&decoded))
}

/// Bucket pixels and average each bucket into one hex color.
pub fn palette_from_image(img: &image::DynamicImage) -> Palette {
    let small = img.thumbnail(SAMPLE_EDGE, SAMPLE_EDGE).to_rgb8();

    // [vibrant, dark_vibrant, light_vibrant, muted, dark_muted, light_muted]
    let mut sums = [[0u64; 3]; 6];
    let mut counts = [0u64; 6];

    for pixel in small.pixels() {
        let [r, g, b] = pixel.0;
        let (saturation, lightness) = saturation_lightness(r, g, b);

        let base = if saturation >= SATURATION_SPLIT { 0 } else { 3 };
        let shade = if lightness < DARK_SPLIT {
            1
        } else if lightness > LIGHT_SPLIT {
            2
        } else {
            0
        };
        let bucket = base + shade;

        sums[bucket][0] += r as u64;
        sums[bucket][1] += g as u64;
        sums[bucket][2] += b as u64;
        counts[bucket] += 1;
    }

    let color = |bucket: usize| -> Option<String> {
        if counts[bucket] == 0 {
            return None;
        }
        let n = counts[bucket];
        Some(format!(
            "#{:02x}{:02x}{:02x}",
            (sums[bucket][0] / n) as u8,
            (sums[bucket][1] / n) as u8,
            (sums[bucket][2] / n) as u8
        ))
    };

    Palette {
        vibrant: color(0),
        dark_vibrant: color(1),
        light_vibrant: color(2),
        muted: color(3),
        dark_muted: color(4),
        light_muted: color(5),
    }
}

/// HSL saturation and lightness of an 8-bit RGB pixel.
fn saturation_lightness(r: u8, g: u8, b: u8) -> (f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let lightness = (max + min) / 2.0;

    let saturation = if max == min {
        0.0
    } else {
        let delta = max - min;
        delta / (1.0 - (2.0 * lightness - 1.0).abs())
    };

    (saturation, lightness)
}

/// Smallest image of a resource by pixel area; palette extraction
/// wants the cheapest copy of the artwork.
fn smallest_image(images: &[ImageData]) -> Option<&ImageData> {
    images.iter().min_by_key(|image| {
        match (image.width, image.height) {
            (Some(w), Some(h)) => (w as u64) * (h as u64),
            // Unsized images sort last.
            _ => u64::MAX,
        }
    })
}

/// Extract and persist palettes for every resource that lacks one.
/// Returns whether anything changed, so callers know to refresh the
/// cached entity.
pub async fn resolve_resource_palettes(
    state: &AppState,
    resources: &mut [ImageResource],
) -> mezzo_common::Result<bool> {
    let mut changed = false;

    for resource in resources.iter_mut() {
        if resource.palette.is_some() || resource.images.is_empty() {
            continue;
        }
        let Some(image) = smallest_image(&resource.images) else {
            continue;
        };

        let http = state.http.clone();
        let url = image.url.clone();
        let extracted: std::result::Result<Palette, PaletteError> = state
            .queue
            .submit(Source::Palette, move || async move {
                extract_palette(&http, &url).await
            })
            .await;

        match extracted {
            Ok(palette) => {
                crate::db::set_resource_palette(&state.db, &resource.hash, &palette).await?;
                resource.palette = Some(palette);
                changed = true;
            }
            Err(e) => {
                tracing::warn!(
                    resource = %resource.hash,
                    error = %e,
                    "Palette extraction failed"
                );
            }
        }
    }

    Ok(changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    #[test]
    fn solid_image_fills_one_bucket() {
        // Saturated mid-lightness red lands in the vibrant bucket.
        let img = RgbImage::from_pixel(16, 16, Rgb([200, 30, 30]));
        let palette = palette_from_image(&DynamicImage::ImageRgb8(img));

        assert_eq!(palette.vibrant.as_deref(), Some("#c81e1e"));
        assert!(palette.muted.is_none());
        assert!(palette.light_muted.is_none());
    }

    #[test]
    fn grayscale_image_is_muted() {
        let img = RgbImage::from_pixel(16, 16, Rgb([128, 128, 128]));
        let palette = palette_from_image(&DynamicImage::ImageRgb8(img));

        assert!(palette.vibrant.is_none());
        assert_eq!(palette.muted.as_deref(), Some("#808080"));
    }

    #[test]
    fn dark_and_light_shades_split() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([10, 10, 10]));
        img.put_pixel(1, 0, Rgb([240, 240, 240]));
        let palette = palette_from_image(&DynamicImage::ImageRgb8(img));

        assert!(palette.dark_muted.is_some());
        assert!(palette.light_muted.is_some());
        assert!(palette.muted.is_none());
    }

    #[test]
    fn smallest_image_prefers_sized_entries() {
        let images = vec![
            ImageData {
                hash: "a".into(),
                url: "https://img/large".into(),
                width: Some(640),
                height: Some(640),
            },
            ImageData {
                hash: "b".into(),
                url: "https://img/small".into(),
                width: Some(64),
                height: Some(64),
            },
            ImageData {
                hash: "c".into(),
                url: "https://img/unsized".into(),
                width: None,
                height: None,
            },
        ];
        assert_eq!(smallest_image(&images).unwrap().url, "https://img/small");
    }

    #[test]
    fn saturation_lightness_bounds() {
        assert_eq!(saturation_lightness(0, 0, 0), (0.0, 0.0));
        assert_eq!(saturation_lightness(255, 255, 255), (0.0, 1.0));
        let (s, l) = saturation_lightness(255, 0, 0);
        assert!(s > 0.99);
        assert!((l - 0.5).abs() < 0.01);
    }
}
