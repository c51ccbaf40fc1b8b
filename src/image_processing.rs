use anyhow::{Result, anyhow};
use base64::Engine;
use image::{ImageFormat, RgbaImage, imageops::FilterType};

const BYTES_PER_PIXEL: usize = 4;

pub const JPEG_DATA_URI_PREFIX: &str = "data:image/jpeg;base64,";

/// Removes a leading `data:image/<subtype>;base64,` marker, if any.
pub fn strip_data_uri_prefix(value: &str) -> &str {
    let Some(rest) = value.strip_prefix("data:image/") else {
        return value;
    };
    let Some((subtype, payload)) = rest.split_once(";base64,") else {
        return value;
    };
    let valid_subtype = !subtype.is_empty()
        && subtype
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid_subtype { payload } else { value }
}

/// Decodes a data URI or a bare base64 payload. Embedded whitespace (line
/// wrapping) is ignored.
pub fn decode_base64_image(value: &str) -> Result<Vec<u8>> {
    let payload: String = strip_data_uri_prefix(value.trim())
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if payload.is_empty() {
        return Err(anyhow!("empty image payload"));
    }
    base64::engine::general_purpose::STANDARD
        .decode(payload.as_bytes())
        .map_err(|err| anyhow!("invalid base64 image payload: {err}"))
}

pub fn jpeg_data_uri(base64_payload: &str) -> String {
    format!("{JPEG_DATA_URI_PREFIX}{base64_payload}")
}

pub fn detect_mime_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("image/png");
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("image/jpeg");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("image/gif");
    }
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        return Some("image/webp");
    }
    if bytes.starts_with(b"BM") {
        return Some("image/bmp");
    }
    None
}

pub fn mime_to_format(mime_type: &str) -> Result<ImageFormat> {
    match mime_type {
        "image/png" => Ok(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Ok(ImageFormat::Jpeg),
        "image/gif" => Ok(ImageFormat::Gif),
        "image/webp" => Ok(ImageFormat::WebP),
        "image/bmp" => Ok(ImageFormat::Bmp),
        _ => Err(anyhow!("unsupported mime type: {mime_type}")),
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<RgbaImage> {
    let mime_type = detect_mime_type(bytes).ok_or_else(|| anyhow!("unrecognised image format"))?;
    let format = mime_to_format(mime_type)?;
    let image = image::load_from_memory_with_format(bytes, format)
        .map_err(|err| anyhow!("decode image failed: {err}"))?;
    Ok(image.to_rgba8())
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let mut output = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut output), ImageFormat::Png)
        .map_err(|err| anyhow!("encode png failed: {err}"))?;
    Ok(output)
}

/// Copies the `width`×`height` region at (`x`, `y`) into a new buffer. Pixels
/// of the region that fall outside the source stay fully transparent.
pub fn crop_pixels(
    pixels: &[u8],
    width: u32,
    height: u32,
    x: i64,
    y: i64,
    new_width: u32,
    new_height: u32,
) -> Vec<u8> {
    let expected_len = (width as usize)
        .saturating_mul(height as usize)
        .saturating_mul(BYTES_PER_PIXEL);
    if pixels.len() != expected_len {
        return Vec::new();
    }

    let mut output = vec![0u8; new_width as usize * new_height as usize * BYTES_PER_PIXEL];

    let first_col = x.max(0);
    let last_col = x.saturating_add(new_width as i64).min(width as i64);
    if first_col >= last_col {
        return output;
    }
    let row_bytes = (last_col - first_col) as usize * BYTES_PER_PIXEL;

    for dy in 0..new_height as i64 {
        let src_y = y.saturating_add(dy);
        if src_y < 0 || src_y >= height as i64 {
            continue;
        }
        let src_index = (src_y as usize * width as usize + first_col as usize) * BYTES_PER_PIXEL;
        let dst_index =
            (dy as usize * new_width as usize + (first_col - x) as usize) * BYTES_PER_PIXEL;
        output[dst_index..dst_index + row_bytes]
            .copy_from_slice(&pixels[src_index..src_index + row_bytes]);
    }

    output
}

/// Output size for a percentage scale. Fractional pixels are dropped, the
/// way a canvas truncates its width/height attributes.
pub fn scaled_dimensions(width: u32, height: u32, scale_percent: u32) -> (u32, u32) {
    let scale = |value: u32| {
        let scaled = (value as u64 * scale_percent as u64) / 100;
        scaled.clamp(1, u32::MAX as u64) as u32
    };
    (scale(width), scale(height))
}

pub fn resize(image: &RgbaImage, width: u32, height: u32) -> RgbaImage {
    if image.dimensions() == (width, height) {
        return image.clone();
    }
    image::imageops::resize(image, width, height, FilterType::Triangle)
}

/// Applies `brightness(B%) contrast(C%)` in that order to every colour channel.
/// Alpha is left alone.
pub fn apply_filters(image: &mut RgbaImage, brightness: u32, contrast: u32) {
    if brightness == 100 && contrast == 100 {
        return;
    }
    let table = filter_table(brightness, contrast);
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut().take(3) {
            *channel = table[*channel as usize];
        }
    }
}

fn filter_table(brightness: u32, contrast: u32) -> [u8; 256] {
    let brightness = brightness as f32 / 100.0;
    let contrast = contrast as f32 / 100.0;
    let mut table = [0u8; 256];
    for (value, slot) in table.iter_mut().enumerate() {
        let mut v = value as f32 / 255.0;
        v = (v * brightness).clamp(0.0, 1.0);
        v = ((v - 0.5) * contrast + 0.5).clamp(0.0, 1.0);
        *slot = (v * 255.0).round() as u8;
    }
    table
}
