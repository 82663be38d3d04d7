use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use base64::Engine;

/// Decoded image pixels, straight (non-premultiplied) RGBA8. The raster
/// backend premultiplies on upload, the PDF backend splits color and alpha.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl DecodedImage {
    pub(crate) fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            rgba: vec![255; (width as usize) * (height as usize) * 4],
        }
    }
}

/// Image source cache shared across a batch. Both hits and misses are
/// cached, so a logo referenced by five hundred cards decodes once and a
/// broken path stats once.
pub(crate) struct AssetStore {
    cache: Mutex<HashMap<String, Option<Arc<DecodedImage>>>>,
}

impl AssetStore {
    pub(crate) fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn fetch(&self, source: &str) -> Option<Arc<DecodedImage>> {
        if let Ok(cache) = self.cache.lock() {
            if let Some(entry) = cache.get(source) {
                return entry.clone();
            }
        }
        let decoded = load_image(source).map(Arc::new);
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(source.to_string(), decoded.clone());
        }
        decoded
    }
}

/// Resolves `source` as a data URI or filesystem path and decodes it.
pub(crate) fn load_image(source: &str) -> Option<DecodedImage> {
    if let Some((mime, data)) = parse_data_uri(source) {
        return decode_image(&data, Some(&mime));
    }

    let path = Path::new(source);
    let bytes = std::fs::read(path).ok()?;
    decode_image(&bytes, None)
}

fn decode_image(data: &[u8], mime: Option<&str>) -> Option<DecodedImage> {
    let guessed_format = if let Some(mime) = mime {
        if mime.contains("png") {
            Some(image::ImageFormat::Png)
        } else if mime.contains("jpeg") || mime.contains("jpg") {
            Some(image::ImageFormat::Jpeg)
        } else {
            None
        }
    } else {
        image::guess_format(data).ok()
    };

    let decoded = if let Some(fmt) = guessed_format {
        image::load_from_memory_with_format(data, fmt).ok()?
    } else {
        image::load_from_memory(data).ok()?
    };
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return None;
    }
    Some(DecodedImage {
        width,
        height,
        rgba: rgba.into_raw(),
    })
}

/// Rounds the image corners by masking alpha: a quarter circle of
/// `radius_px` source pixels at each corner, with one pixel of edge
/// smoothing. Pixels on the straight edges keep full coverage.
pub(crate) fn round_corners(image: &DecodedImage, radius_px: f32) -> DecodedImage {
    let radius = radius_px
        .min(image.width as f32 / 2.0)
        .min(image.height as f32 / 2.0);
    if !radius.is_finite() || radius < 0.5 {
        return image.clone();
    }
    let mut rgba = image.rgba.clone();
    let w = image.width as f32;
    let h = image.height as f32;
    for y in 0..image.height {
        for x in 0..image.width {
            let px = x as f32 + 0.5;
            let py = y as f32 + 0.5;
            // Distance from the pixel center to the rounded-rect core.
            let dx = px - px.clamp(radius, w - radius);
            let dy = py - py.clamp(radius, h - radius);
            if dx == 0.0 || dy == 0.0 {
                continue;
            }
            let dist = (dx * dx + dy * dy).sqrt();
            let coverage = (radius - dist + 0.5).clamp(0.0, 1.0);
            if coverage >= 1.0 {
                continue;
            }
            let offset = ((y * image.width + x) * 4 + 3) as usize;
            rgba[offset] = (rgba[offset] as f32 * coverage).round() as u8;
        }
    }
    DecodedImage {
        width: image.width,
        height: image.height,
        rgba,
    }
}

pub(crate) fn parse_data_uri(uri: &str) -> Option<(String, Vec<u8>)> {
    if !uri.starts_with("data:") {
        return None;
    }
    let (header, payload) = uri.split_once(',')?;
    let mime = header
        .trim_start_matches("data:")
        .split(';')
        .next()
        .filter(|v| !v.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();
    let data = if header.contains(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload)
            .ok()?
    } else {
        payload.as_bytes().to_vec()
    };
    Some((mime, data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use image::RgbaImage;

    fn png_data_uri(width: u32, height: u32, px: [u8; 4]) -> String {
        let mut src = RgbaImage::new(width, height);
        for pixel in src.pixels_mut() {
            *pixel = image::Rgba(px);
        }
        let mut bytes = Vec::new();
        src.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        )
    }

    #[test]
    fn parse_data_uri_base64_decodes_payload() {
        let uri = "data:text/plain;base64,SGVsbG8=";
        let (mime, data) = parse_data_uri(uri).unwrap();
        assert_eq!(mime, "text/plain");
        assert_eq!(data, b"Hello");
    }

    #[test]
    fn data_uri_image_decodes_to_rgba() {
        let uri = png_data_uri(2, 3, [255, 0, 0, 128]);
        let img = load_image(&uri).unwrap();
        assert_eq!((img.width, img.height), (2, 3));
        assert_eq!(&img.rgba[0..4], &[255, 0, 0, 128]);
    }

    #[test]
    fn round_corners_clears_corner_alpha_only() {
        let image = DecodedImage::blank(20, 20);
        let rounded = round_corners(&image, 6.0);
        // Top-left corner pixel is fully outside the quarter circle.
        assert_eq!(rounded.rgba[3], 0);
        let center = ((10 * 20 + 10) * 4 + 3) as usize;
        assert_eq!(rounded.rgba[center], 255);
        // Straight edge midpoints keep full coverage.
        let edge = (10 * 4 + 3) as usize;
        assert_eq!(rounded.rgba[edge], 255);
        assert_eq!(round_corners(&image, 0.0).rgba, image.rgba);
    }

    #[test]
    fn store_caches_hits_and_misses() {
        let store = AssetStore::new();
        let uri = png_data_uri(1, 1, [0, 0, 255, 255]);
        let first = store.fetch(&uri).unwrap();
        let second = store.fetch(&uri).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(store.fetch("/nonexistent/path/photo.png").is_none());
        assert!(store.fetch("/nonexistent/path/photo.png").is_none());
    }
}
