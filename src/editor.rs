//! Crop / brightness / contrast / scale compositor behind `POST /api/edit`.
//!
//! Export follows the browser editor exactly: with a crop rectangle the output
//! is the rectangle's size and `scale` is ignored (the live preview scales the
//! cropped view, the export does not); without one the whole image is
//! resampled to `scale` percent of its natural size.

use image::RgbaImage;
use serde::Deserialize;
use thiserror::Error;

use crate::{image_processing, routes::validate_http_url, storage::LocalFileStorage};

/// Largest accepted output edge, in pixels.
pub const MAX_OUTPUT_EDGE: u32 = 16_384;

/// Largest accepted output area, in pixels.
pub const MAX_OUTPUT_PIXELS: u64 = 40_000_000;

/// Crop offsets must lie within this distance of the source origin.
pub const MAX_CROP_OFFSET: f64 = MAX_OUTPUT_EDGE as f64 * 4.0;

/// Largest source image fetched from a remote URL.
pub const MAX_SOURCE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum EditError {
    #[error("Invalid edit settings: {0}")]
    InvalidSettings(String),
    #[error("Invalid image source: {0}")]
    InvalidSource(String),
    #[error("Image not found: {0}")]
    SourceNotFound(String),
    #[error("Failed to fetch source image: {0}")]
    Fetch(String),
    #[error("Failed to decode source image: {0}")]
    Decode(String),
    #[error("Failed to encode edited image: {0}")]
    Encode(String),
}

/// Crop rectangle in source pixels. Fractions are truncated.
#[derive(Clone, Copy, Debug, PartialEq, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct EditSettings {
    pub crop: Option<CropRect>,
    pub brightness: u32,
    pub contrast: u32,
    pub scale: u32,
}

impl Default for EditSettings {
    fn default() -> Self {
        Self {
            crop: None,
            brightness: 100,
            contrast: 100,
            scale: 100,
        }
    }
}

impl EditSettings {
    pub fn validate(&self) -> Result<(), EditError> {
        if self.brightness > 200 {
            return Err(EditError::InvalidSettings(
                "brightness must be between 0 and 200".to_string(),
            ));
        }
        if self.contrast > 200 {
            return Err(EditError::InvalidSettings(
                "contrast must be between 0 and 200".to_string(),
            ));
        }
        if !(10..=200).contains(&self.scale) {
            return Err(EditError::InvalidSettings(
                "scale must be between 10 and 200".to_string(),
            ));
        }
        if let Some(crop) = &self.crop {
            let values = [crop.x, crop.y, crop.width, crop.height];
            if values.iter().any(|value| !value.is_finite()) {
                return Err(EditError::InvalidSettings(
                    "crop values must be finite numbers".to_string(),
                ));
            }
            if crop.width < 1.0 || crop.height < 1.0 {
                return Err(EditError::InvalidSettings(
                    "crop rectangle is empty".to_string(),
                ));
            }
            if crop.width > MAX_OUTPUT_EDGE as f64 || crop.height > MAX_OUTPUT_EDGE as f64 {
                return Err(EditError::InvalidSettings(format!(
                    "crop rectangle exceeds {MAX_OUTPUT_EDGE} pixels"
                )));
            }
            if crop.width.trunc() * crop.height.trunc() > MAX_OUTPUT_PIXELS as f64 {
                return Err(EditError::InvalidSettings(format!(
                    "crop rectangle exceeds {MAX_OUTPUT_PIXELS} pixels in area"
                )));
            }
            if crop.x.abs() > MAX_CROP_OFFSET || crop.y.abs() > MAX_CROP_OFFSET {
                return Err(EditError::InvalidSettings(format!(
                    "crop offset must be within {MAX_CROP_OFFSET} pixels of the origin"
                )));
            }
        }
        Ok(())
    }

    pub fn filter_css(&self) -> String {
        format!("brightness({}%) contrast({}%)", self.brightness, self.contrast)
    }
}

pub fn export(source: &RgbaImage, settings: &EditSettings) -> Result<RgbaImage, EditError> {
    settings.validate()?;
    let (width, height) = source.dimensions();

    let mut canvas = match settings.crop {
        Some(crop) => {
            let crop_width = crop.width.trunc() as u32;
            let crop_height = crop.height.trunc() as u32;
            let pixels = image_processing::crop_pixels(
                source.as_raw(),
                width,
                height,
                crop.x.trunc() as i64,
                crop.y.trunc() as i64,
                crop_width,
                crop_height,
            );
            RgbaImage::from_raw(crop_width, crop_height, pixels)
                .ok_or_else(|| EditError::Encode("invalid crop buffer".to_string()))?
        }
        None => {
            let (out_width, out_height) =
                image_processing::scaled_dimensions(width, height, settings.scale);
            if out_width > MAX_OUTPUT_EDGE
                || out_height > MAX_OUTPUT_EDGE
                || out_width as u64 * out_height as u64 > MAX_OUTPUT_PIXELS
            {
                return Err(EditError::InvalidSettings(format!(
                    "scaled image exceeds {MAX_OUTPUT_EDGE} pixels per edge or {MAX_OUTPUT_PIXELS} in area"
                )));
            }
            image_processing::resize(source, out_width, out_height)
        }
    };

    image_processing::apply_filters(&mut canvas, settings.brightness, settings.contrast);
    Ok(canvas)
}

/// Decodes `bytes`, applies `settings` and returns the PNG encoding.
pub fn export_png(bytes: &[u8], settings: &EditSettings) -> Result<Vec<u8>, EditError> {
    settings.validate()?;
    let source =
        image_processing::decode_image(bytes).map_err(|err| EditError::Decode(err.to_string()))?;
    let canvas = export(&source, settings)?;
    tracing::debug!(
        filter = %settings.filter_css(),
        width = canvas.width(),
        height = canvas.height(),
        "image exported"
    );
    image_processing::encode_png(&canvas).map_err(|err| EditError::Encode(err.to_string()))
}

/// Resolves an editor source: an http(s) URL, a path under the public
/// directory, a data URI, or a bare base64 payload. Remote bodies larger than
/// `max_bytes` are rejected.
pub async fn load_source(
    source: &str,
    files: &LocalFileStorage,
    http: &reqwest::Client,
    max_bytes: usize,
) -> Result<Vec<u8>, EditError> {
    let source = source.trim();
    if source.is_empty() {
        return Err(EditError::InvalidSource("image is required".to_string()));
    }

    if source.starts_with("http://") || source.starts_with("https://") {
        let url = validate_http_url(source)
            .map_err(|err| EditError::InvalidSource(err.to_string()))?;
        return fetch_limited(http, url, max_bytes).await;
    }

    // Base64 JPEG payloads also begin with '/', so only treat the value as a
    // path when it names an existing public file.
    if let Some(key) = LocalFileStorage::key_from_public_url(source) {
        if let Ok(Some(bytes)) = files.get(key).await {
            return Ok(bytes);
        }
        if !source.starts_with("/9j/") {
            return Err(EditError::SourceNotFound(source.to_string()));
        }
    }

    image_processing::decode_base64_image(source)
        .map_err(|err| EditError::InvalidSource(err.to_string()))
}

async fn fetch_limited(
    http: &reqwest::Client,
    url: url::Url,
    max_bytes: usize,
) -> Result<Vec<u8>, EditError> {
    let too_large = || EditError::InvalidSource(format!("source image exceeds {max_bytes} bytes"));

    let mut response = http
        .get(url)
        .send()
        .await
        .map_err(|err| EditError::Fetch(err.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(EditError::Fetch(format!("HTTP {status}")));
    }
    if response
        .content_length()
        .is_some_and(|len| len > max_bytes as u64)
    {
        return Err(too_large());
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|err| EditError::Fetch(err.to_string()))?
    {
        if body.len() + chunk.len() > max_bytes {
            return Err(too_large());
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
